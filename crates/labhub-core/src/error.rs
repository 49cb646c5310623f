use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabhubError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid group key: {0}")]
    InvalidGroup(String),
}

impl LabhubError {
    /// Short error code string sent to clients in WS RES frames.
    pub fn code(&self) -> &'static str {
        match self {
            LabhubError::Config(_) => "CONFIG_ERROR",
            LabhubError::AuthFailed(_) => "AUTH_FAILED",
            LabhubError::MethodNotFound { .. } => "METHOD_NOT_FOUND",
            LabhubError::InvalidGroup(_) => "INVALID_GROUP",
        }
    }
}

pub type Result<T> = std::result::Result<T, LabhubError>;
