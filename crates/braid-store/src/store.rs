use async_trait::async_trait;
use serde_json::Value;

use braid_core::{BranchId, CheckpointId, MessageId, MessageMetadata, ThreadMessage, ToolInvocation};

use crate::error::StoreError;

/// Options accompanying a submission.
#[derive(Clone, Debug, Default)]
pub struct SubmitOptions {
    /// Resume generation from this checkpoint instead of the thread tip.
    pub checkpoint: Option<CheckpointId>,
    /// Values the caller wants reflected immediately, before the store
    /// round-trips (optimistic UI).
    pub optimistic_values: Option<Value>,
}

impl SubmitOptions {
    pub fn at_checkpoint(checkpoint: CheckpointId) -> Self {
        Self {
            checkpoint: Some(checkpoint),
            ..Default::default()
        }
    }
}

/// The event-store seam the engine consumes.
///
/// Reads are synchronous snapshots; mutations are cooperative suspension
/// points. The store owns cancellation: a new submission logically supersedes
/// any in-flight generation on the same thread.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Ordered message list of the active branch. Append-only within a
    /// session; replaced wholesale on branch switch.
    fn list_messages(&self) -> Vec<ThreadMessage>;

    /// Branch metadata for one message, if the store knows it.
    fn metadata_of(&self, id: &MessageId) -> Option<MessageMetadata>;

    /// Side-channel tool invocations for one message.
    fn tool_calls_of(&self, id: &MessageId) -> Vec<ToolInvocation>;

    /// Trigger generation, optionally resuming from a checkpoint.
    async fn submit(&self, input: Option<String>, options: SubmitOptions) -> Result<(), StoreError>;

    /// Switch the active branch view.
    async fn set_branch(&self, branch: &BranchId) -> Result<(), StoreError>;

    /// Cancel an in-flight generation.
    async fn stop(&self) -> Result<(), StoreError>;
}
