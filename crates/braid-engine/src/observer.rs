use braid_core::{MessageId, ToolCallId};

/// Why a message was excluded from the grouping pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Hidden,
    SystemRole,
    ToolRole,
}

/// Structured trace events reported by the grouping pass.
///
/// The algorithm itself has no output side effects; anything worth knowing
/// about goes through this seam instead.
#[derive(Clone, Copy, Debug)]
pub enum GroupingEvent<'a> {
    MessageSkipped {
        id: &'a MessageId,
        reason: SkipReason,
    },
    /// An `ai` message arrived before any `human` message; a userless group
    /// was opened for it.
    OrphanAssistant { id: &'a MessageId },
    /// A repeated tool-call id brought a result or left `pending`, replacing
    /// the earlier observation.
    ToolCallSuperseded { id: &'a ToolCallId },
    /// A repeated tool-call id added nothing and was dropped.
    ToolCallRepeated { id: &'a ToolCallId },
}

pub trait GroupingObserver {
    fn on_event(&self, event: GroupingEvent<'_>);
}

/// Observer for hot paths that want no reporting at all.
pub struct NullObserver;

impl GroupingObserver for NullObserver {
    fn on_event(&self, _event: GroupingEvent<'_>) {}
}

/// Default observer: forwards events to `tracing` at debug level.
pub struct TracingObserver;

impl GroupingObserver for TracingObserver {
    fn on_event(&self, event: GroupingEvent<'_>) {
        match event {
            GroupingEvent::MessageSkipped { id, reason } => {
                tracing::debug!(message_id = %id, ?reason, "message skipped by grouping");
            }
            GroupingEvent::OrphanAssistant { id } => {
                tracing::debug!(message_id = %id, "assistant message before any human; opening userless group");
            }
            GroupingEvent::ToolCallSuperseded { id } => {
                tracing::debug!(tool_call_id = %id, "tool call superseded by later observation");
            }
            GroupingEvent::ToolCallRepeated { id } => {
                tracing::debug!(tool_call_id = %id, "repeated tool call added nothing; dropped");
            }
        }
    }
}
