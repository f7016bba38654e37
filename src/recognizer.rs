use tracing::{debug, error};

use crate::engine::{Recognizer, SpeechModel};
use crate::error::{Result, SessionError};
use crate::grammar::Grammar;

/// Builds recognizers bound to a loaded model.
///
/// Stateless; the only thing it produces is the handle it returns.
pub struct RecognizerFactory;

impl RecognizerFactory {
    /// Create a recognizer for `model` at `sample_rate`.
    ///
    /// # Arguments
    /// * `model` - Model the recognizer decodes with; must outlive the recognizer
    /// * `sample_rate` - Rate of the audio that will be pushed (16000.0)
    /// * `grammar` - Optional phrase list restricting the vocabulary
    ///
    /// # Errors
    /// `EngineInitFailed` if the grammar is empty or the engine rejects the
    /// combination.
    pub fn create(
        model: &dyn SpeechModel,
        sample_rate: f32,
        grammar: Option<&Grammar>,
    ) -> Result<Box<dyn Recognizer>> {
        if let Some(grammar) = grammar {
            if grammar.is_empty() {
                return Err(SessionError::EngineInitFailed(
                    "grammar has no phrases".to_string(),
                ));
            }
            debug!("Creating recognizer with grammar {}", grammar.to_engine_string());
        }

        model.create_recognizer(sample_rate, grammar).map_err(|e| {
            error!("Recognizer creation failed: {}", e);
            SessionError::EngineInitFailed(e.to_string())
        })
    }
}
