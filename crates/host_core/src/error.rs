// Tandem host core - Error types

use std::fmt;

/// Fatal startup errors. Any of these aborts the launch.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("no free TCP port in range {min}-{max}")]
    NoPortAvailable { min: u16, max: u16 },

    #[error("invalid port range {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },

    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),

    #[error("failed to spawn backend `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Classification of a failed `/quit` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuitErrorKind {
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    Status(u16),
    Other,
}

impl QuitErrorKind {
    /// Refused and reset mean the backend is gone or closing its socket.
    pub fn is_expected(self) -> bool {
        matches!(self, Self::ConnectionRefused | Self::ConnectionReset)
    }
}

impl fmt::Display for QuitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionRefused => f.write_str("connection refused"),
            Self::ConnectionReset => f.write_str("connection reset"),
            Self::Timeout => f.write_str("timed out"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Other => f.write_str("request failed"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("backend quit request {kind}: {message}")]
pub struct QuitError {
    pub kind: QuitErrorKind,
    pub message: String,
}

/// Raised for IPC command names the bridge does not know.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown IPC command: {0}")]
pub struct UnknownCommand(pub String);
