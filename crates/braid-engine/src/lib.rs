pub mod branch;
pub mod controller;
pub mod error;
pub mod group;
pub mod mutation;
pub mod observer;

pub use branch::{navigate_branch, resolve_position, BranchPosition, Direction};
pub use controller::ThreadController;
pub use error::EngineError;
pub use group::{group_messages, Group};
pub use mutation::{
    plan_mutation, MutationError, MutationKind, MutationOutcome, MutationPlan, SubmitPayload,
};
pub use observer::{GroupingEvent, GroupingObserver, NullObserver, SkipReason, TracingObserver};
