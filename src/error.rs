use thiserror::Error;

/// Main error type for the videoio library
#[derive(Error, Debug)]
pub enum VideoIoError {
    #[error("Failed to open {target}: {reason}")]
    OpenFailed { target: String, reason: String },

    #[error("Operation on a closed handle")]
    ClosedHandle,

    #[error("Frame decoding failed: {reason}")]
    DecodeFailed { reason: String },

    #[error("Frame encoding failed: {reason}")]
    EncodeFailed { reason: String },

    #[error("FOURCC must be exactly 4 characters, got {len}")]
    InvalidLength { len: usize },

    #[error("FOURCC character {ch:?} does not fit in a single byte")]
    InvalidCharacter { ch: char },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// A property name that matches no [`PropertyId`](crate::PropertyId)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown property '{0}'")]
pub struct UnknownProperty(pub String);

/// A backend name that matches no [`BackendPreference`](crate::BackendPreference)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown backend '{0}'")]
pub struct UnknownBackend(pub String);

/// Convenience type alias for Results using VideoIoError
pub type Result<T> = std::result::Result<T, VideoIoError>;

impl VideoIoError {
    pub(crate) fn open_failed<T: Into<String>, R: Into<String>>(target: T, reason: R) -> Self {
        Self::OpenFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn decode<R: Into<String>>(reason: R) -> Self {
        Self::DecodeFailed {
            reason: reason.into(),
        }
    }

    pub(crate) fn encode<R: Into<String>>(reason: R) -> Self {
        Self::EncodeFailed {
            reason: reason.into(),
        }
    }

    /// Check if this error only concerns a single frame
    ///
    /// The handle stays open after a frame-local error and the next frame
    /// can be read or written normally.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Self::DecodeFailed { .. } | Self::EncodeFailed { .. })
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::OpenFailed { target, reason } => {
                format!("Could not open '{}' ({}). Check that it exists and that its format or codec is supported.", target, reason)
            }
            Self::ClosedHandle => "The video handle was already closed.".to_string(),
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_local_errors() {
        assert!(VideoIoError::decode("bad jpeg").is_frame_local());
        assert!(VideoIoError::encode("size mismatch").is_frame_local());
        assert!(!VideoIoError::ClosedHandle.is_frame_local());
        assert!(!VideoIoError::open_failed("a.avi", "missing").is_frame_local());
    }

    #[test]
    fn test_error_display() {
        let err = VideoIoError::InvalidLength { len: 3 };
        assert!(err.to_string().contains("got 3"));

        let err = VideoIoError::open_failed("/nope.avi", "file not found");
        assert!(err.to_string().contains("/nope.avi"));
        assert!(err.user_message().contains("file not found"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: VideoIoError = io_err.into();
        assert!(matches!(err, VideoIoError::Io(_)));
    }
}
