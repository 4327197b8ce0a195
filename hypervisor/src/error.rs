use thiserror::Error;

#[derive(Error, Debug)]
pub enum HypervisorError {
    #[error("failed to connect to {uri}: {message}")]
    Connect { uri: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{op} failed: {message}")]
    Call { op: &'static str, message: String },

    #[error("connection closed")]
    Closed,
}

impl HypervisorError {
    pub(crate) fn call(op: &'static str, message: impl ToString) -> Self {
        HypervisorError::Call {
            op,
            message: message.to_string(),
        }
    }
}
