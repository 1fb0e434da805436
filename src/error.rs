//! Error types for Parikrama

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Parikrama error types
///
/// Only `Connection` is expected to escape the calibration and path engine.
/// Missing capabilities and unreliable position reads are reported as status
/// values (`SkipReason`, `DriveOutcome`) instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session with the robot broke (command could not be delivered)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Position query failed
    #[error("Position read failed: {0}")]
    PositionRead(String),

    /// Optional operation not implemented by the device
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    /// Device type not known to the device factory
    #[error("Unknown device type: {0}")]
    UnknownDevice(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// Whether the error means the robot session itself is gone.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }
}
