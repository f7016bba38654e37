// Host-facing commands
//
// Async wrappers over SpeechManager. Every engine call is blocking, so each
// command runs on tokio's blocking pool and the caller's runtime stays free.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::error;

use crate::error::{CommandError, SessionError};
use crate::grammar::Grammar;
use crate::transcription::{SpeechManager, SpeechStatus};

/// Options of the `start` command.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    /// Phrases the recognizer may output, e.g. `["cool", "application", "[unk]"]`
    pub grammar: Option<Vec<String>>,
    /// Session lifetime in milliseconds
    pub timeout: Option<u64>,
}

/// Options of the `startStreaming` command.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingOptions {
    pub grammar: Option<Vec<String>>,
}

/// Run `f` against the manager on the blocking pool.
async fn run_blocking<T, F>(manager: Arc<SpeechManager>, f: F) -> Result<T, CommandError>
where
    T: Send + 'static,
    F: FnOnce(&SpeechManager) -> Result<T, SessionError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&manager))
        .await
        .map_err(|e| {
            error!("Command task failed: {}", e);
            CommandError {
                code: "INTERNAL".to_string(),
                message: format!("Command task failed: {}", e),
            }
        })?
        .map_err(CommandError::from)
}

/// Load the model at `path` (or the bundled model with that name).
pub async fn load_model(manager: Arc<SpeechManager>, path: String) -> Result<String, CommandError> {
    run_blocking(manager, move |m| m.load_model(&path)).await?;
    Ok("Model successfully loaded".to_string())
}

/// Start a continuous session on the capture source.
pub async fn start(
    manager: Arc<SpeechManager>,
    options: Option<StartOptions>,
) -> Result<String, CommandError> {
    let options = options.unwrap_or_default();
    let grammar = options.grammar.map(Grammar::new);
    let timeout = options.timeout.map(Duration::from_millis);

    run_blocking(manager, move |m| m.start(grammar, timeout)).await?;
    Ok("Recognizer successfully started".to_string())
}

/// Stop the continuous session. Never fails when no session runs.
pub async fn stop(manager: Arc<SpeechManager>) -> Result<(), CommandError> {
    run_blocking(manager, |m| {
        m.stop();
        Ok(())
    })
    .await
}

/// Release sessions and the model.
pub async fn unload(manager: Arc<SpeechManager>) -> Result<(), CommandError> {
    run_blocking(manager, |m| {
        m.unload();
        Ok(())
    })
    .await
}

/// Transcribe a PCM or WAV file; resolves to the final JSON record.
pub async fn transcribe_file(
    manager: Arc<SpeechManager>,
    path: String,
) -> Result<String, CommandError> {
    let path = PathBuf::from(path);
    run_blocking(manager, move |m| m.transcribe_file(&path)).await
}

/// Transcribe base64-encoded PCM.
pub async fn transcribe_data(
    manager: Arc<SpeechManager>,
    data: String,
) -> Result<String, CommandError> {
    run_blocking(manager, move |m| m.transcribe_data(&data)).await
}

/// Transcribe raw PCM bytes.
pub async fn transcribe_data_array(
    manager: Arc<SpeechManager>,
    data: Vec<u8>,
) -> Result<String, CommandError> {
    run_blocking(manager, move |m| m.transcribe_data_array(&data)).await
}

/// Start a streaming session.
pub async fn start_streaming(
    manager: Arc<SpeechManager>,
    options: Option<StreamingOptions>,
) -> Result<String, CommandError> {
    let grammar = options.unwrap_or_default().grammar.map(Grammar::new);
    run_blocking(manager, move |m| m.start_streaming(grammar)).await?;
    Ok("Streaming started".to_string())
}

/// Feed PCM bytes into the streaming session.
pub async fn feed_chunk(manager: Arc<SpeechManager>, data: Vec<u8>) -> Result<bool, CommandError> {
    run_blocking(manager, move |m| m.feed_chunk(&data)).await
}

/// End the streaming session; resolves to the final JSON record.
pub async fn stop_streaming(manager: Arc<SpeechManager>) -> Result<String, CommandError> {
    run_blocking(manager, |m| m.stop_streaming()).await
}

pub async fn status(manager: Arc<SpeechManager>) -> Result<SpeechStatus, CommandError> {
    run_blocking(manager, |m| Ok(m.status())).await
}
