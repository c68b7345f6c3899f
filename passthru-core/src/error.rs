//! Error types for passthru

use thiserror::Error;

/// Result type alias using PassthruError
pub type Result<T> = std::result::Result<T, PassthruError>;

/// Main error type for passthru operations
#[derive(Debug, Error)]
pub enum PassthruError {
    /// Encoder pulled or configured out of state order
    #[error("Encoder not initialized: {0}")]
    Uninitialized(String),

    /// Invalid codec settings or arguments
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Encoded frame with no payload bytes
    #[error("Encoded frame payload is empty")]
    EmptyPayload,

    /// The output sink rejected an encoded image
    #[error("Output sink error: {0}")]
    Sink(#[from] SinkError),

    /// Codec name not recognised
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    /// No encoder could be created for a format
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PassthruError>,
    },
}

/// Failure reported by an [`EncodedImageSink`](crate::host::EncodedImageSink)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink no longer accepts frames
    #[error("sink closed")]
    Closed,

    /// The sink failed to forward the frame
    #[error("send failed: {0}")]
    SendFailed(String),
}

impl PassthruError {
    /// Create an uninitialized-encoder error
    pub fn uninitialized(msg: impl Into<String>) -> Self {
        Self::Uninitialized(msg.into())
    }

    /// Create an invalid parameter error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the host pipeline should tear down and reinitialize the encoder
    pub fn requires_reinit(&self) -> bool {
        match self {
            Self::Uninitialized(_) | Self::InvalidParameter(_) => true,
            Self::WithContext { source, .. } => source.requires_reinit(),
            _ => false,
        }
    }

    /// Get a user-facing hint for resolving this error
    pub fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Uninitialized(_) => {
                Some("Call init() and register_output_sink() before pulling frames")
            }
            Self::InvalidParameter(_) => {
                Some("Codec settings need a non-zero width and height")
            }
            Self::EmptyPayload => Some("Encoded frames must carry at least one byte"),
            Self::UnknownCodec(_) => Some("Supported codecs: vp8, vp9, av1, h264, h265"),
            Self::Config(_) => {
                Some("Check ~/.config/passthru/config.toml or run 'passthru config init'")
            }
            Self::WithContext { source, .. } => source.user_hint(),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl From<toml::de::Error> for PassthruError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse config file: {}", err))
    }
}

impl From<toml::ser::Error> for PassthruError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(format!("Failed to serialize config: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_converts() {
        let err: PassthruError = SinkError::Closed.into();
        assert!(matches!(err, PassthruError::Sink(SinkError::Closed)));
        assert!(!err.requires_reinit());
    }

    #[test]
    fn test_reinit_through_context() {
        let err = PassthruError::uninitialized("no sink").with_context("pull");
        assert!(err.requires_reinit());
    }
}
