// Boundary to the native decoding engine.
//
// The session layer only sees these traits. Result records cross the
// boundary as JSON text and are interpreted by `crate::hypothesis`.

use std::path::Path;

use thiserror::Error;

use crate::grammar::Grammar;

#[cfg(feature = "vosk")]
pub mod vosk_engine;

#[cfg(feature = "vosk")]
pub use vosk_engine::VoskEngine;

/// Sample rate every recognizer is created with (16 kHz mono s16le).
pub const SAMPLE_RATE: f32 = 16000.0;

/// Failure reported by the engine, before it is mapped to a
/// [`crate::error::SessionError`] by the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model could not be loaded: {0}")]
    ModelLoad(String),
    #[error("recognizer could not be created: {0}")]
    RecognizerInit(String),
    #[error("decoding failed: {0}")]
    Decode(String),
}

/// Outcome of pushing audio into a recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingState {
    /// An utterance boundary was reached; `result()` holds the complete text.
    Finalized,
    /// Still inside an utterance; `partial_result()` holds the running text.
    Running,
}

/// Loads model bundles.
///
/// # Thread Safety
/// Implementations must be Send + Sync; one engine is shared by every
/// session of a [`crate::SpeechManager`].
pub trait SpeechEngine: Send + Sync {
    /// Returns the name of this engine (e.g. "vosk")
    fn name(&self) -> &str;

    /// Load the model bundle stored in the directory at `path`.
    fn load_model(&self, path: &Path) -> Result<Box<dyn SpeechModel>, EngineError>;
}

/// A loaded acoustic + language model.
pub trait SpeechModel: Send + Sync {
    /// Build a decoder bound to this model.
    fn create_recognizer(
        &self,
        sample_rate: f32,
        grammar: Option<&Grammar>,
    ) -> Result<Box<dyn Recognizer>, EngineError>;
}

/// A decoder instance. Dropping it releases the native handle.
pub trait Recognizer: Send {
    /// Push 16-bit PCM samples.
    fn accept_waveform(&mut self, samples: &[i16]) -> Result<DecodingState, EngineError>;

    /// Complete result record after [`DecodingState::Finalized`] (`{"text": ..}`).
    fn result(&mut self) -> Result<String, EngineError>;

    /// Running result record (`{"partial": ..}`).
    fn partial_result(&mut self) -> Result<String, EngineError>;

    /// Flush remaining audio and return the last result record (`{"text": ..}`).
    fn final_result(&mut self) -> Result<String, EngineError>;

    /// Drop any buffered audio and start a fresh utterance.
    fn reset(&mut self);
}
