use std::collections::HashSet;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, error};

use braid_core::{BranchId, GroupId, MessageId};
use braid_store::{EventStore, SubmitOptions};

use crate::branch::{navigate_branch, Direction};
use crate::error::EngineError;
use crate::group::{group_messages, Group};
use crate::mutation::{plan_mutation, MutationKind, MutationOutcome, MutationPlan};
use crate::observer::TracingObserver;

/// Front door for a single conversation thread: grouping snapshots, branch
/// navigation, and the edit/regenerate mutations, all driven against one
/// [`EventStore`].
pub struct ThreadController<S> {
    store: S,
    hidden: Mutex<HashSet<MessageId>>,
}

impl<S: EventStore> ThreadController<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            hidden: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Recompute groups from the store's current snapshot.
    pub fn groups(&self) -> Vec<Group> {
        let messages = self.store.list_messages();
        let hidden = self.hidden.lock().clone();
        group_messages(
            &messages,
            |m| self.store.metadata_of(&m.id),
            |m| {
                let side_channel = self.store.tool_calls_of(&m.id);
                if side_channel.is_empty() {
                    m.tool_calls.clone()
                } else {
                    side_channel
                }
            },
            &hidden,
            &TracingObserver,
        )
    }

    /// Exclude a message from grouping without touching the store.
    pub fn hide_message(&self, id: MessageId) {
        self.hidden.lock().insert(id);
    }

    pub fn unhide_message(&self, id: &MessageId) {
        self.hidden.lock().remove(id);
    }

    /// Send a fresh user turn at the thread tip.
    pub async fn send(&self, input: impl Into<String>) -> Result<(), EngineError> {
        self.store
            .submit(Some(input.into()), SubmitOptions::default())
            .await?;
        Ok(())
    }

    /// Edit a group's user message and resubmit from its checkpoint.
    ///
    /// A destructive plan (the group is not the last) is only carried out when
    /// `confirmed` is set; an unconfirmed destructive call is a caller bug and
    /// fails with [`EngineError::UnconfirmedDestructive`].
    pub async fn edit(
        &self,
        group_id: &GroupId,
        new_content: &str,
        confirmed: bool,
    ) -> Result<MutationOutcome, EngineError> {
        self.mutate(MutationKind::Edit, group_id, Some(new_content), confirmed)
            .await
    }

    /// Re-run generation for a group from just after its user message.
    pub async fn regenerate(
        &self,
        group_id: &GroupId,
        confirmed: bool,
    ) -> Result<MutationOutcome, EngineError> {
        self.mutate(MutationKind::Regenerate, group_id, None, confirmed)
            .await
    }

    async fn mutate(
        &self,
        kind: MutationKind,
        group_id: &GroupId,
        new_content: Option<&str>,
        confirmed: bool,
    ) -> Result<MutationOutcome, EngineError> {
        let messages = self.store.list_messages();
        let groups = self.groups();
        let group = groups
            .iter()
            .find(|g| &g.id == group_id)
            .ok_or_else(|| EngineError::GroupNotFound(group_id.clone()))?;

        let first_id = messages.first().map(|m| m.id.clone());
        let plan = plan_mutation(
            kind,
            group,
            new_content,
            |id| self.store.metadata_of(id),
            |id| first_id.as_ref() == Some(id),
        )?;

        if plan.is_destructive && !confirmed {
            error!(%kind, group = %group_id, "destructive mutation submitted without confirmation");
            return Err(EngineError::UnconfirmedDestructive);
        }

        debug!(%kind, group = %group_id, outcome = ?plan.outcome, "submitting mutation");
        self.submit_plan(plan).await
    }

    async fn submit_plan(&self, plan: MutationPlan) -> Result<MutationOutcome, EngineError> {
        let options = SubmitOptions {
            checkpoint: plan.payload.checkpoint.clone(),
            // Restarting from scratch has no checkpoint to anchor on; the
            // visible list is optimistically cleared instead.
            optimistic_values: plan
                .payload
                .checkpoint
                .is_none()
                .then(|| json!({ "messages": [] })),
        };
        self.store.submit(plan.payload.input, options).await?;
        Ok(plan.outcome)
    }

    /// Step to a sibling branch of `group_id`. Out-of-range moves and groups
    /// without siblings are no-ops; `Ok(None)` reports that nothing changed.
    pub async fn select_branch(
        &self,
        group_id: &GroupId,
        direction: Direction,
    ) -> Result<Option<BranchId>, EngineError> {
        let groups = self.groups();
        let group = groups
            .iter()
            .find(|g| &g.id == group_id)
            .ok_or_else(|| EngineError::GroupNotFound(group_id.clone()))?;

        let Some(target) = navigate_branch(group.branch.as_ref(), &group.branch_options, direction)
        else {
            return Ok(None);
        };
        self.store.set_branch(&target).await?;
        debug!(branch = %target, "switched branch");
        Ok(Some(target))
    }

    /// Cancel the in-flight generation, if any.
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.store.stop().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::{ThreadMessage, ToolCallId, ToolInvocation};
    use braid_store::InMemoryThread;

    fn controller_with_turns(turns: &[(&str, &str)]) -> ThreadController<InMemoryThread> {
        let store = InMemoryThread::new();
        for (human, ai) in turns {
            store.push_human(*human);
            store.push_ai(ThreadMessage::ai(*ai));
        }
        ThreadController::new(store)
    }

    #[tokio::test]
    async fn groups_reflect_the_store_snapshot() {
        let ctl = controller_with_turns(&[("one", "1"), ("two", "2")]);
        let groups = ctl.groups();
        assert_eq!(groups.len(), 2);
        assert!(groups[1].is_last);
        assert_eq!(groups[0].user_message.as_ref().unwrap().text_content(), "one");
    }

    #[tokio::test]
    async fn edit_last_group_forks_and_preserves_history() {
        let ctl = controller_with_turns(&[("one", "1"), ("two", "2")]);
        let last = ctl.groups().pop().unwrap();

        let outcome = ctl.edit(&last.id, "two, revised", false).await.unwrap();
        assert_eq!(outcome, MutationOutcome::ForkedBranch);
        assert_eq!(ctl.store().branch_count(), 2);

        let groups = ctl.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[1].user_message.as_ref().unwrap().text_content(),
            "two, revised"
        );
        // The fork point advertises both siblings.
        assert_eq!(groups[1].branch_options.len(), 2);
    }

    #[tokio::test]
    async fn destructive_edit_requires_confirmation() {
        let ctl = controller_with_turns(&[("one", "1"), ("two", "2")]);
        let first = ctl.groups().remove(0);

        let err = ctl.edit(&first.id, "rewritten", false).await.unwrap_err();
        assert!(matches!(err, EngineError::UnconfirmedDestructive));
        // Nothing changed.
        assert_eq!(ctl.groups().len(), 2);

        let outcome = ctl.edit(&first.id, "rewritten", true).await.unwrap();
        assert_eq!(outcome, MutationOutcome::ReplacedHistory);
        let groups = ctl.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].user_message.as_ref().unwrap().text_content(),
            "rewritten"
        );
    }

    #[tokio::test]
    async fn regenerate_last_group_forks_after_the_human_turn() {
        let ctl = controller_with_turns(&[("question", "first answer")]);
        let group = ctl.groups().pop().unwrap();

        let outcome = ctl.regenerate(&group.id, false).await.unwrap();
        assert_eq!(outcome, MutationOutcome::ForkedBranch);

        // The human message survives on the new branch, awaiting a new answer.
        let groups = ctl.groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0].user_message.as_ref().unwrap().text_content(),
            "question"
        );
        assert!(groups[0].assistant_message.is_none());
        assert!(ctl.store().is_generating());
    }

    #[tokio::test]
    async fn regenerate_without_assistant_output_is_a_recoverable_refusal() {
        let store = InMemoryThread::new();
        store.push_human("unanswered");
        let ctl = ThreadController::new(store);
        let group = ctl.groups().pop().unwrap();

        let err = ctl.regenerate(&group.id, false).await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(ctl.groups().len(), 1);
    }

    #[tokio::test]
    async fn stale_group_id_is_reported() {
        let ctl = controller_with_turns(&[("q", "a")]);
        let err = ctl
            .edit(&GroupId::from_raw("grp_gone"), "x", false)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::GroupNotFound(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn branch_navigation_round_trip() {
        let ctl = controller_with_turns(&[("q", "answer on main")]);
        let group = ctl.groups().pop().unwrap();
        ctl.edit(&group.id, "q v2", false).await.unwrap();
        ctl.store().push_ai(ThreadMessage::ai("answer on fork"));

        // On the fork: one sibling to the left, none to the right.
        let group = ctl.groups().pop().unwrap();
        assert_eq!(group.branch_options.len(), 2);
        assert!(ctl
            .select_branch(&group.id, Direction::Next)
            .await
            .unwrap()
            .is_none());

        let target = ctl
            .select_branch(&group.id, Direction::Prev)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.as_str(), "main");
        let groups = ctl.groups();
        assert_eq!(
            groups[0].assistant_message.as_ref().unwrap().text_content(),
            "answer on main"
        );

        // And back again.
        let group = ctl.groups().pop().unwrap();
        let forked = ctl
            .select_branch(&group.id, Direction::Next)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(forked.as_str(), "main");
        assert_eq!(
            ctl.groups()[0]
                .user_message
                .as_ref()
                .unwrap()
                .text_content(),
            "q v2"
        );
    }

    #[tokio::test]
    async fn branchless_group_never_navigates() {
        let ctl = controller_with_turns(&[("q", "a")]);
        let group = ctl.groups().pop().unwrap();
        assert!(ctl
            .select_branch(&group.id, Direction::Next)
            .await
            .unwrap()
            .is_none());
        assert!(ctl
            .select_branch(&group.id, Direction::Prev)
            .await
            .unwrap()
            .is_none());
    }

    /// Test double for a store that predates checkpointing: metadata carries
    /// no `parent_checkpoint` at all. Records the last submission.
    struct LegacyStore {
        messages: Vec<ThreadMessage>,
        submitted: Mutex<Option<(Option<String>, SubmitOptions)>>,
    }

    #[async_trait::async_trait]
    impl EventStore for LegacyStore {
        fn list_messages(&self) -> Vec<ThreadMessage> {
            self.messages.clone()
        }

        fn metadata_of(&self, _id: &braid_core::MessageId) -> Option<braid_core::MessageMetadata> {
            None
        }

        fn tool_calls_of(&self, _id: &braid_core::MessageId) -> Vec<ToolInvocation> {
            Vec::new()
        }

        async fn submit(
            &self,
            input: Option<String>,
            options: SubmitOptions,
        ) -> Result<(), braid_store::StoreError> {
            *self.submitted.lock() = Some((input, options));
            Ok(())
        }

        async fn set_branch(&self, _branch: &BranchId) -> Result<(), braid_store::StoreError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), braid_store::StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn edit_first_message_without_checkpoint_restarts() {
        let store = LegacyStore {
            messages: vec![ThreadMessage::human("legacy"), ThreadMessage::ai("reply")],
            submitted: Mutex::new(None),
        };
        let ctl = ThreadController::new(store);
        let group = ctl.groups().pop().unwrap();

        let outcome = ctl.edit(&group.id, "restarted", false).await.unwrap();
        // No checkpoint to fork at: the thread restarts from scratch.
        assert_eq!(outcome, MutationOutcome::ReplacedHistory);

        let (input, options) = ctl.store().submitted.lock().take().unwrap();
        assert_eq!(input.as_deref(), Some("restarted"));
        assert!(options.checkpoint.is_none());
        assert_eq!(options.optimistic_values.unwrap()["messages"], json!([]));
    }

    #[tokio::test]
    async fn edit_later_message_without_checkpoint_refuses() {
        let store = LegacyStore {
            messages: vec![
                ThreadMessage::human("one"),
                ThreadMessage::ai("1"),
                ThreadMessage::human("two"),
                ThreadMessage::ai("2"),
            ],
            submitted: Mutex::new(None),
        };
        let ctl = ThreadController::new(store);
        let last = ctl.groups().pop().unwrap();

        let err = ctl.edit(&last.id, "no anchor", true).await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(ctl.store().submitted.lock().is_none());
    }

    #[tokio::test]
    async fn hidden_messages_drop_out_of_grouping() {
        let ctl = controller_with_turns(&[("visible", "a"), ("to hide", "b")]);
        let groups = ctl.groups();
        let hide_id = groups[1].user_message.as_ref().unwrap().id.clone();

        ctl.hide_message(hide_id.clone());
        let groups = ctl.groups();
        assert!(groups
            .iter()
            .all(|g| g.user_message.as_ref().map(|m| &m.id) != Some(&hide_id)));

        ctl.unhide_message(&hide_id);
        assert_eq!(ctl.groups().len(), 2);
    }

    #[tokio::test]
    async fn tool_loop_survives_a_regeneration() {
        let store = InMemoryThread::new();
        store.push_human("look this up");
        store.push_ai(ThreadMessage::ai_with_tools(
            "",
            vec![ToolInvocation::new(
                ToolCallId::from_raw("call_1"),
                "search",
                json!({"q": "braids"}),
            )],
        ));
        store.complete_tool_call("call_1", "result text").unwrap();
        store.push_ai(ThreadMessage::ai("here is what I found"));
        let ctl = ThreadController::new(store);

        let group = ctl.groups().pop().unwrap();
        assert_eq!(group.tool_calls.len(), 1);
        assert_eq!(group.tool_calls[0].result.as_deref(), Some("result text"));

        ctl.regenerate(&group.id, false).await.unwrap();
        let groups = ctl.groups();
        assert_eq!(groups.len(), 1);
        // The old tool loop is gone from the fork; the human turn remains.
        assert!(groups[0].tool_calls.is_empty());
    }

    #[tokio::test]
    async fn send_and_stop_drive_generation_state() {
        let ctl = ThreadController::new(InMemoryThread::new());
        ctl.send("hello").await.unwrap();
        assert!(ctl.store().is_generating());
        ctl.stop().await.unwrap();
        assert!(!ctl.store().is_generating());
        assert_eq!(ctl.groups().len(), 1);
    }
}
