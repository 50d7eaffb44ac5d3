//! Error taxonomy shared by every adapter and chat client.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, PlatformError>;

#[derive(Error, Debug)]
pub enum PlatformError {
    /// Upstream API answered with a non-zero status code.
    #[error("upstream error {code}: {message}")]
    Upstream { code: i64, message: String },

    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Connection failed to open or dropped unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),

    /// Truncated or inconsistent chat framing. See `DecodeOutcome::error`.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// Compressed chat frame that failed to inflate or exceeded the size cap.
    #[error("decompression failure: {0}")]
    Decompression(String),

    /// Capability not offered by this platform.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    pub fn upstream(code: i64, message: impl Into<String>) -> Self {
        Self::Upstream {
            code,
            message: message.into(),
        }
    }

    pub fn room_not_found(room_id: impl Into<String>) -> Self {
        Self::RoomNotFound(room_id.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error means the capability is simply absent on the platform.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PlatformError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display() {
        let err = PlatformError::upstream(-400, "bad request");
        assert_eq!(err.to_string(), "upstream error -400: bad request");
    }

    #[test]
    fn test_is_unsupported() {
        assert!(PlatformError::unsupported("send message").is_unsupported());
        assert!(!PlatformError::transport("reset").is_unsupported());
    }
}
