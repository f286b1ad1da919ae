#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Conflicts come from racing submissions and resolve themselves on the
    /// next snapshot; everything else needs caller intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
