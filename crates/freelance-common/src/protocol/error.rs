use thiserror::Error;

#[derive(Error, Debug)]
pub enum FreelanceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport has been shut down")]
    TransportClosed,

    #[error("A request is already in flight")]
    RequestInFlight,

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FreelanceError {
    /// Whether the error means the transport will never deliver again.
    ///
    /// Loops use this to tell a permanent shutdown apart from a transient
    /// send or receive failure, which is logged and otherwise ignored.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, FreelanceError::TransportClosed)
    }
}

pub type Result<T> = std::result::Result<T, FreelanceError>;
