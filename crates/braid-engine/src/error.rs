use braid_core::GroupId;
use braid_store::StoreError;
use thiserror::Error;

use crate::mutation::MutationError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The referenced group is not in the current grouping. Groups are
    /// recomputed on every update tick, so a stale id is an expected race,
    /// not a bug.
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    /// A destructive mutation was requested without confirmation. This is a
    /// caller bug: the plan said turns would be discarded and the caller
    /// submitted anyway.
    #[error("destructive mutation requires explicit confirmation")]
    UnconfirmedDestructive,
}

impl EngineError {
    /// Recoverable errors leave the thread untouched; the caller can retry
    /// or surface the refusal and move on.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Mutation(_) | Self::GroupNotFound(_) => true,
            Self::Store(e) => e.is_retryable(),
            Self::UnconfirmedDestructive => false,
        }
    }
}
