use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{BranchId, CheckpointId};

/// Per-message branch metadata supplied by the event store.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch_options: Vec<BranchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_checkpoint: Option<CheckpointId>,
}

impl MessageMetadata {
    pub fn with_branch(branch: BranchId, options: Vec<BranchId>) -> Self {
        Self {
            branch: Some(branch),
            branch_options: options,
            ..Default::default()
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: CheckpointId) -> Self {
        self.parent_checkpoint = Some(checkpoint);
        self
    }

    /// True when this metadata carries any branch information at all.
    pub fn has_branch_info(&self) -> bool {
        self.branch.is_some() || !self.branch_options.is_empty()
    }

    /// Normalize the upstream metadata shape.
    ///
    /// The store nests the resume checkpoint under `firstSeenState` and spells
    /// the options list `branchOptions`; both aliases are accepted here so
    /// downstream code only sees the canonical struct.
    pub fn from_value(v: &Value) -> Self {
        let obj = match v.as_object() {
            Some(obj) => obj,
            None => return Self::default(),
        };

        let branch = obj
            .get("branch")
            .and_then(Value::as_str)
            .map(BranchId::from_raw);

        let branch_options = obj
            .get("branch_options")
            .or_else(|| obj.get("branchOptions"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(BranchId::from_raw)
                    .collect()
            })
            .unwrap_or_default();

        let parent_checkpoint = obj
            .get("parent_checkpoint")
            .or_else(|| {
                obj.get("firstSeenState")
                    .or_else(|| obj.get("first_seen_state"))
                    .and_then(|s| s.get("parent_checkpoint"))
            })
            .and_then(Value::as_str)
            .map(CheckpointId::from_raw);

        Self {
            branch,
            branch_options,
            parent_checkpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_shape() {
        let meta = MessageMetadata::from_value(&json!({
            "branch": "b2",
            "branch_options": ["b1", "b2"],
            "parent_checkpoint": "ckpt_9",
        }));
        assert_eq!(meta.branch.as_ref().unwrap().as_str(), "b2");
        assert_eq!(meta.branch_options.len(), 2);
        assert_eq!(meta.parent_checkpoint.as_ref().unwrap().as_str(), "ckpt_9");
    }

    #[test]
    fn upstream_aliases() {
        let meta = MessageMetadata::from_value(&json!({
            "branch": "b1",
            "branchOptions": ["b1", "b2", "b3"],
            "firstSeenState": {"parent_checkpoint": "ckpt_1"},
        }));
        assert_eq!(meta.branch_options.len(), 3);
        assert_eq!(meta.parent_checkpoint.as_ref().unwrap().as_str(), "ckpt_1");
    }

    #[test]
    fn non_object_degrades_to_empty() {
        let meta = MessageMetadata::from_value(&json!(null));
        assert!(meta.branch.is_none());
        assert!(meta.branch_options.is_empty());
        assert!(meta.parent_checkpoint.is_none());
        assert!(!meta.has_branch_info());
    }

    #[test]
    fn has_branch_info() {
        assert!(MessageMetadata::with_branch(BranchId::from_raw("b1"), vec![]).has_branch_info());
        let options_only = MessageMetadata {
            branch_options: vec![BranchId::from_raw("b1")],
            ..Default::default()
        };
        assert!(options_only.has_branch_info());
        assert!(!MessageMetadata::default().has_branch_info());
    }

    #[test]
    fn serde_roundtrip() {
        let meta = MessageMetadata::with_branch(
            BranchId::from_raw("b1"),
            vec![BranchId::from_raw("b1"), BranchId::from_raw("b2")],
        )
        .with_checkpoint(CheckpointId::from_raw("ckpt_3"));
        let json = serde_json::to_string(&meta).unwrap();
        let parsed: MessageMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.branch.unwrap().as_str(), "b1");
        assert_eq!(parsed.branch_options.len(), 2);
    }
}
