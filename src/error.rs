use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimelineError {
    /// Transport failure or a non-success status from the commerce backend.
    #[error("Backend not reachable ({endpoint}): {reason}")]
    BackendUnreachable { endpoint: String, reason: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Timeline orchestrator has stopped")]
    Stopped,
    #[error("Run aborted: {stage} did not complete")]
    Aborted { stage: String },
}

impl TimelineError {
    pub fn unreachable(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::BackendUnreachable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TimelineError>;
