pub mod error;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use memory::InMemoryThread;
pub use store::{EventStore, SubmitOptions};
