use thiserror::Error;

/// Main error type for the Reel-Compositor library
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    #[error("Video processing error: {0}")]
    Video(#[from] VideoError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Source asset resolution errors
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to load asset '{source_ref}': {reason}")]
    LoadFailed { source_ref: String, reason: String },

    #[error("Failed to fetch remote asset '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Invalid asset reference: {details}")]
    InvalidReference { details: String },
}

/// Capture/encode errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No supported capture format among: {tried}")]
    UnsupportedFormat { tried: String },

    #[error("Capture produced no data")]
    EmptyRecording,

    #[error("Capture backend failed: {reason}")]
    Fatal { reason: String },
}

/// Audio-specific errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Invalid audio parameters: {details}")]
    InvalidParameters { details: String },
}

/// Video-specific errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to probe video file: {path}")]
    ProbeFailed { path: String },

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },

    #[error("Frame processing failed: {reason}")]
    FrameProcessingFailed { reason: String },

    #[error("Invalid video parameters: {details}")]
    InvalidParameters { details: String },
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

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

/// Coarse classification used by callers to tell bad input from bad runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AssetLoadFailure,
    UnsupportedCaptureFormat,
    EmptyRecording,
    CaptureFatal,
    Cancelled,
    Other,
}

impl CompositorError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Shorthand for a mid-run capture failure
    pub fn capture_fatal<S: Into<String>>(reason: S) -> Self {
        CaptureError::Fatal { reason: reason.into() }.into()
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Asset(_) => ErrorKind::AssetLoadFailure,
            Self::Capture(CaptureError::UnsupportedFormat { .. }) => {
                ErrorKind::UnsupportedCaptureFormat
            }
            Self::Capture(CaptureError::EmptyRecording) => ErrorKind::EmptyRecording,
            Self::Capture(CaptureError::Fatal { .. }) => ErrorKind::CaptureFatal,
            Self::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Other,
        }
    }

    /// Whether the failure was caused by the caller's inputs rather than the runtime
    pub fn is_input_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AssetLoadFailure | ErrorKind::UnsupportedCaptureFormat
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Asset(AssetError::LoadFailed { source_ref, .. }) => {
                format!("Could not load '{}'. Please check it exists and is a supported media file.", source_ref)
            }
            Self::Capture(CaptureError::UnsupportedFormat { .. }) => {
                "No supported output format is available. Please install FFmpeg with libx264/aac or libvpx/libopus.".to_string()
            }
            Self::Capture(CaptureError::EmptyRecording) => {
                "Rendering produced no video data. The source clips may not be playable.".to_string()
            }
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
    fn test_kind_distinguishes_input_from_runtime() {
        let load: CompositorError = AssetError::LoadFailed {
            source_ref: "clip.mp4".to_string(),
            reason: "missing".to_string(),
        }
        .into();
        assert_eq!(load.kind(), ErrorKind::AssetLoadFailure);
        assert!(load.is_input_error());

        let empty: CompositorError = CaptureError::EmptyRecording.into();
        assert_eq!(empty.kind(), ErrorKind::EmptyRecording);
        assert!(!empty.is_input_error());

        assert_eq!(
            CompositorError::capture_fatal("pipe closed").kind(),
            ErrorKind::CaptureFatal
        );
    }

    #[test]
    fn test_user_message_mentions_source() {
        let err: CompositorError = AssetError::LoadFailed {
            source_ref: "https://cdn.example.com/a.mp4".to_string(),
            reason: "404".to_string(),
        }
        .into();
        assert!(err.user_message().contains("https://cdn.example.com/a.mp4"));
    }
}
