use braid_core::BranchId;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Resolved position of the active branch among its siblings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BranchPosition {
    pub current_index: usize,
    pub total: usize,
}

impl BranchPosition {
    pub fn has_prev(&self) -> bool {
        self.current_index > 0
    }

    pub fn has_next(&self) -> bool {
        self.current_index + 1 < self.total
    }
}

/// Resolve the navigable position, or `None` when there is nothing to
/// navigate (fewer than two options — the no-branch state, not an error).
///
/// A branch that is absent or not in the option list can legitimately happen
/// right after a branch switch, before metadata catches up; navigation stays
/// available by defaulting to the first option, and the anomaly is logged.
pub fn resolve_position(branch: Option<&BranchId>, options: &[BranchId]) -> Option<BranchPosition> {
    if options.len() < 2 {
        return None;
    }
    let current_index = match branch.and_then(|b| options.iter().position(|o| o == b)) {
        Some(index) => index,
        None => {
            warn!(branch = ?branch.map(BranchId::as_str), "active branch not in options; defaulting to first");
            0
        }
    };
    Some(BranchPosition {
        current_index,
        total: options.len(),
    })
}

/// The sibling branch id one step in `direction`, or `None` when the move is
/// out of range (a no-op, never an error).
pub fn navigate_branch(
    branch: Option<&BranchId>,
    options: &[BranchId],
    direction: Direction,
) -> Option<BranchId> {
    let position = resolve_position(branch, options)?;
    let target = match direction {
        Direction::Prev if position.has_prev() => position.current_index - 1,
        Direction::Next if position.has_next() => position.current_index + 1,
        _ => return None,
    };
    options.get(target).cloned()
}
