use thiserror::Error;

/// Errors raised while reaching the notification hub.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured API address could not be turned into a hub address.
    #[error("Invalid hub endpoint: {0}")]
    InvalidEndpoint(String),

    /// The negotiate round-trip was refused or returned something unusable.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// The socket could not be opened or broke while reading.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An HTTP request made with reqwest failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failure of one notification side effect (toast, sound, desktop popup).
///
/// These never leave the surface; they exist so implementations can report
/// what went wrong to their own logs and tests.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The platform refused the action (autoplay policy, permission revoked).
    #[error("Blocked: {0}")]
    Blocked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
