use std::fmt;

use braid_core::{CheckpointId, MessageId, MessageMetadata};
use thiserror::Error;

use crate::group::Group;

/// The two history mutations a client can request on a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    /// Resubmit the group's user message with new content.
    Edit,
    /// Re-run generation from the group's first assistant emission.
    Regenerate,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Edit => "edit",
            Self::Regenerate => "regenerate",
        })
    }
}

#[derive(Debug, Error)]
pub enum MutationError {
    /// The anchor message has no resume checkpoint and is not the thread's
    /// first message. Recoverable: the caller should leave history untouched
    /// and surface the refusal.
    #[error("unable to {0}: no checkpoint available")]
    MissingCheckpoint(MutationKind),
    /// The group has no anchor message for this mutation at all, e.g.
    /// regenerating a group that never produced assistant output.
    #[error("unable to {0}: group has no anchor message")]
    MissingAnchor(MutationKind),
}

/// What submitting the plan will do to the thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationOutcome {
    /// History is preserved; a sibling branch is created at the checkpoint.
    ForkedBranch,
    /// Everything after the anchor is discarded.
    ReplacedHistory,
}

/// The resubmission the store should perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitPayload {
    /// New user input; `None` for regeneration.
    pub input: Option<String>,
    /// Resume point; `None` means restart the thread from scratch.
    pub checkpoint: Option<CheckpointId>,
}

#[derive(Clone, Debug)]
pub struct MutationPlan {
    pub kind: MutationKind,
    pub payload: SubmitPayload,
    /// True when the plan discards turns after this group. Callers must get
    /// explicit confirmation before submitting a destructive plan.
    pub is_destructive: bool,
    pub outcome: MutationOutcome,
}

/// Decide how a mutation on `group` must be submitted, without performing it.
///
/// Planning is pure: it reads the group and the anchor's metadata and either
/// yields a complete plan or refuses with a recoverable error. Nothing here
/// touches the store.
pub fn plan_mutation<M, F>(
    kind: MutationKind,
    group: &Group,
    new_content: Option<&str>,
    metadata_of: M,
    is_first_message: F,
) -> Result<MutationPlan, MutationError>
where
    M: Fn(&MessageId) -> Option<MessageMetadata>,
    F: Fn(&MessageId) -> bool,
{
    let anchor = match kind {
        MutationKind::Edit => group.user_message.as_ref().map(|m| m.id.clone()),
        MutationKind::Regenerate => group.first_assistant_message_id.clone(),
    }
    .ok_or(MutationError::MissingAnchor(kind))?;

    let input = match kind {
        MutationKind::Edit => Some(
            new_content
                .map(str::to_owned)
                .or_else(|| group.user_message.as_ref().map(|m| m.text_content()))
                .unwrap_or_default(),
        ),
        MutationKind::Regenerate => None,
    };

    let checkpoint = metadata_of(&anchor).and_then(|m| m.parent_checkpoint);
    if checkpoint.is_none() && !is_first_message(&anchor) {
        return Err(MutationError::MissingCheckpoint(kind));
    }

    let outcome = if checkpoint.is_some() && group.is_last {
        MutationOutcome::ForkedBranch
    } else {
        MutationOutcome::ReplacedHistory
    };

    Ok(MutationPlan {
        kind,
        payload: SubmitPayload { input, checkpoint },
        is_destructive: !group.is_last,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::group_messages;
    use crate::observer::NullObserver;
    use braid_core::{CheckpointId, ThreadMessage};
    use std::collections::HashSet;

    fn groups_of(messages: &[ThreadMessage]) -> Vec<Group> {
        group_messages(
            messages,
            |_| None,
            |m| m.tool_calls.clone(),
            &HashSet::new(),
            &NullObserver,
        )
    }

    fn meta_with(checkpoint: &str) -> MessageMetadata {
        MessageMetadata::default().with_checkpoint(CheckpointId::from_raw(checkpoint))
    }

    #[test]
    fn edit_last_group_forks() {
        let messages = vec![ThreadMessage::human("original"), ThreadMessage::ai("reply")];
        let groups = groups_of(&messages);

        let plan = plan_mutation(
            MutationKind::Edit,
            &groups[0],
            Some("revised"),
            |_| Some(meta_with("ckpt_1")),
            |_| false,
        )
        .unwrap();

        assert!(!plan.is_destructive);
        assert_eq!(plan.outcome, MutationOutcome::ForkedBranch);
        assert_eq!(plan.payload.input.as_deref(), Some("revised"));
        assert_eq!(plan.payload.checkpoint.as_ref().unwrap().as_str(), "ckpt_1");
    }

    #[test]
    fn edit_earlier_group_is_destructive() {
        let messages = vec![
            ThreadMessage::human("one"),
            ThreadMessage::ai("1"),
            ThreadMessage::human("two"),
            ThreadMessage::ai("2"),
        ];
        let groups = groups_of(&messages);
        assert!(!groups[0].is_last);

        let plan = plan_mutation(
            MutationKind::Edit,
            &groups[0],
            Some("changed"),
            |_| Some(meta_with("ckpt_1")),
            |_| false,
        )
        .unwrap();

        assert!(plan.is_destructive);
        assert_eq!(plan.outcome, MutationOutcome::ReplacedHistory);
    }

    #[test]
    fn regenerate_anchors_on_first_assistant_emission() {
        let messages = vec![ThreadMessage::human("q"), ThreadMessage::ai("a")];
        let groups = groups_of(&messages);
        let anchor = groups[0].first_assistant_message_id.clone().unwrap();

        let plan = plan_mutation(
            MutationKind::Regenerate,
            &groups[0],
            None,
            |id| (*id == anchor).then(|| meta_with("ckpt_after_human")),
            |_| false,
        )
        .unwrap();

        assert!(plan.payload.input.is_none());
        assert_eq!(
            plan.payload.checkpoint.as_ref().unwrap().as_str(),
            "ckpt_after_human"
        );
    }

    #[test]
    fn missing_checkpoint_refuses() {
        let messages = vec![ThreadMessage::human("q"), ThreadMessage::ai("a")];
        let groups = groups_of(&messages);

        let err = plan_mutation(MutationKind::Edit, &groups[0], None, |_| None, |_| false)
            .unwrap_err();
        assert!(matches!(err, MutationError::MissingCheckpoint(MutationKind::Edit)));
        assert_eq!(err.to_string(), "unable to edit: no checkpoint available");
    }

    #[test]
    fn first_message_without_checkpoint_restarts_thread() {
        let messages = vec![ThreadMessage::human("q"), ThreadMessage::ai("a")];
        let groups = groups_of(&messages);
        let first_id = messages[0].id.clone();

        let plan = plan_mutation(
            MutationKind::Edit,
            &groups[0],
            Some("fresh start"),
            |_| None,
            |id| *id == first_id,
        )
        .unwrap();

        assert!(plan.payload.checkpoint.is_none());
        // No checkpoint means no fork target; history is replaced even on the
        // last group.
        assert_eq!(plan.outcome, MutationOutcome::ReplacedHistory);
        assert!(!plan.is_destructive);
    }

    #[test]
    fn regenerate_without_assistant_output_refuses() {
        let messages = vec![ThreadMessage::human("unanswered")];
        let groups = groups_of(&messages);

        let err = plan_mutation(
            MutationKind::Regenerate,
            &groups[0],
            None,
            |_| Some(meta_with("ckpt_1")),
            |_| false,
        )
        .unwrap_err();
        assert!(matches!(err, MutationError::MissingAnchor(MutationKind::Regenerate)));
    }

    #[test]
    fn edit_without_new_content_reuses_existing_text() {
        let messages = vec![ThreadMessage::human("keep me"), ThreadMessage::ai("a")];
        let groups = groups_of(&messages);

        let plan = plan_mutation(
            MutationKind::Edit,
            &groups[0],
            None,
            |_| Some(meta_with("ckpt_1")),
            |_| false,
        )
        .unwrap();
        assert_eq!(plan.payload.input.as_deref(), Some("keep me"));
    }
}
