use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by the session layer.
///
/// Every command resolves to a value or one of these; nothing crosses a
/// thread boundary as a panic.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The model bundle is missing or the engine could not load it
    #[error("Failed to load model from {path}: {reason}")]
    ModelLoadFailed { path: String, reason: String },

    /// A command that needs a model was issued before `load_model`
    #[error("Model is not loaded yet. Call loadModel() first")]
    NoModel,

    /// A continuous session is already running
    #[error("Recognizer is already in use")]
    AlreadyActive,

    /// A streaming session is already running
    #[error("Streaming already active")]
    AlreadyStreaming,

    /// `feed_chunk`/`stop_streaming` without a streaming session
    #[error("No active streaming session. Call startStreaming() first")]
    NoActiveStreamingSession,

    /// The engine rejected the model/sample rate/grammar combination
    #[error("Failed to create recognizer: {0}")]
    EngineInitFailed(String),

    /// The audio source for a continuous session failed to start or died
    #[error("Audio capture failed: {0}")]
    CaptureFailed(String),

    #[error("Failed to feed chunk: {0}")]
    FeedFailed(String),

    #[error("Transcription failed: {0}")]
    TranscribeFailed(String),

    #[error("Failed to stop streaming: {0}")]
    StopFailed(String),

    /// Decode-time failure reported by the engine while a session runs
    #[error("Engine error: {0}")]
    EngineRuntime(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Stable code sent to the host alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::ModelLoadFailed { .. } => "MODEL_LOAD_FAIL",
            SessionError::NoModel => "NO_MODEL",
            SessionError::AlreadyActive => "ALREADY_ACTIVE",
            SessionError::AlreadyStreaming => "ALREADY_STREAMING",
            SessionError::NoActiveStreamingSession => "NO_RECOGNIZER",
            SessionError::EngineInitFailed(_) => "ENGINE_INIT_FAIL",
            SessionError::CaptureFailed(_) => "CAPTURE_FAIL",
            SessionError::FeedFailed(_) => "FEED_CHUNK_FAIL",
            SessionError::TranscribeFailed(_) => "TRANSCRIBE_FAIL",
            SessionError::StopFailed(_) => "STOP_STREAMING_FAIL",
            SessionError::EngineRuntime(_) => "ENGINE_ERROR",
            SessionError::InvalidSettings(_) => "INVALID_SETTINGS",
        }
    }
}

/// Serializable form of [`SessionError`] returned by commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl From<SessionError> for CommandError {
    fn from(err: SessionError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CommandError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_carries_code_and_message() {
        let err: CommandError = SessionError::NoActiveStreamingSession.into();
        assert_eq!(err.code, "NO_RECOGNIZER");
        assert!(err.message.contains("startStreaming"));
    }

    #[test]
    fn test_model_load_failed_message_names_path() {
        let err = SessionError::ModelLoadFailed {
            path: "/models/missing".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(err.code(), "MODEL_LOAD_FAIL");
        assert_eq!(
            err.to_string(),
            "Failed to load model from /models/missing: not found"
        );
    }

    #[test]
    fn test_command_error_serializes_as_object() {
        let err: CommandError = SessionError::AlreadyStreaming.into();
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "ALREADY_STREAMING");
        assert_eq!(json["message"], "Streaming already active");
    }
}
