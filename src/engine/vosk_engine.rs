// Vosk engine adapter
//
// Uses the vosk crate (safe FFI bindings) with libvosk from ~/.vosk/lib.
// The crate hands back typed results; they are re-encoded here as the JSON
// records the rest of the crate consumes.

use std::path::Path;

use serde_json::json;
use tracing::{debug, info};

use super::{DecodingState, EngineError, Recognizer, SpeechEngine, SpeechModel};
use crate::grammar::Grammar;

/// [`SpeechEngine`] backed by libvosk.
pub struct VoskEngine;

impl VoskEngine {
    /// Create the engine.
    ///
    /// With `quiet` set, Kaldi's verbose logging is limited to errors.
    pub fn new(quiet: bool) -> Self {
        if quiet {
            vosk::set_log_level(vosk::LogLevel::Error);
        }
        Self
    }
}

impl SpeechEngine for VoskEngine {
    fn name(&self) -> &str {
        "vosk"
    }

    fn load_model(&self, path: &Path) -> Result<Box<dyn SpeechModel>, EngineError> {
        let path_str = path.to_string_lossy().to_string();
        match vosk::Model::new(path_str) {
            Some(model) => {
                info!("Vosk model loaded from {:?}", path);
                Ok(Box::new(VoskModel(model)))
            }
            None => Err(EngineError::ModelLoad(format!(
                "libvosk rejected model directory {:?}",
                path
            ))),
        }
    }
}

struct VoskModel(vosk::Model);

impl SpeechModel for VoskModel {
    fn create_recognizer(
        &self,
        sample_rate: f32,
        grammar: Option<&Grammar>,
    ) -> Result<Box<dyn Recognizer>, EngineError> {
        let recognizer = match grammar {
            Some(grammar) => {
                vosk::Recognizer::new_with_grammar(&self.0, sample_rate, grammar.tokens())
            }
            None => vosk::Recognizer::new(&self.0, sample_rate),
        };
        let mut recognizer = recognizer.ok_or_else(|| {
            EngineError::RecognizerInit(match grammar {
                Some(g) => format!(
                    "libvosk rejected sample rate {} with grammar {}",
                    sample_rate,
                    g.to_engine_string()
                ),
                None => format!("libvosk rejected sample rate {}", sample_rate),
            })
        })?;
        // Single best hypothesis keeps `result()` in the `{"text": ..}` shape
        recognizer.set_max_alternatives(0);
        debug!("Vosk recognizer created at {} Hz", sample_rate);
        Ok(Box::new(VoskRecognizer(recognizer)))
    }
}

struct VoskRecognizer(vosk::Recognizer);

fn complete_record(result: vosk::CompleteResult<'_>) -> String {
    let text = result.single().map(|single| single.text).unwrap_or("");
    json!({ "text": text }).to_string()
}

impl Recognizer for VoskRecognizer {
    fn accept_waveform(&mut self, samples: &[i16]) -> Result<DecodingState, EngineError> {
        match self.0.accept_waveform(samples) {
            Ok(vosk::DecodingState::Finalized) => Ok(DecodingState::Finalized),
            Ok(vosk::DecodingState::Running) => Ok(DecodingState::Running),
            Ok(_) => {
                Err(EngineError::Decode("libvosk reported a failed decode".to_string()))
            }
            Err(e) => Err(EngineError::Decode(e.to_string())),
        }
    }

    fn result(&mut self) -> Result<String, EngineError> {
        Ok(complete_record(self.0.result()))
    }

    fn partial_result(&mut self) -> Result<String, EngineError> {
        let partial = self.0.partial_result();
        Ok(json!({ "partial": partial.partial }).to_string())
    }

    fn final_result(&mut self) -> Result<String, EngineError> {
        Ok(complete_record(self.0.final_result()))
    }

    fn reset(&mut self) {
        self.0.reset();
    }
}
