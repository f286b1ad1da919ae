pub mod ids;
pub mod message;
pub mod metadata;
pub mod toolcall;

pub use ids::{BranchId, CheckpointId, GroupId, MessageId, ToolCallId};
pub use message::{ContentBlock, FileRef, MessageContent, Role, ThreadMessage};
pub use metadata::MessageMetadata;
pub use toolcall::{ToolCallState, ToolInvocation};
