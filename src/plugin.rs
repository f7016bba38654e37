// Tauri plugin transport
//
// Exposes the commands as `plugin:vosk|<command>` and forwards session
// events to the webview under their host names (onResult, onTimeout, ...).

use std::sync::Arc;

use tauri::plugin::{Builder, TauriPlugin};
use tauri::{AppHandle, Emitter, Manager, Runtime, State};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::commands::{self, StartOptions, StreamingOptions};
use crate::error::CommandError;
use crate::events::SessionEvent;
use crate::transcription::{SpeechManager, SpeechStatus};

type ManagerState<'a> = State<'a, Arc<SpeechManager>>;

#[tauri::command]
async fn load_model(manager: ManagerState<'_>, path: String) -> Result<String, CommandError> {
    commands::load_model(manager.inner().clone(), path).await
}

#[tauri::command]
async fn start(
    manager: ManagerState<'_>,
    options: Option<StartOptions>,
) -> Result<String, CommandError> {
    commands::start(manager.inner().clone(), options).await
}

#[tauri::command]
async fn stop(manager: ManagerState<'_>) -> Result<(), CommandError> {
    commands::stop(manager.inner().clone()).await
}

#[tauri::command]
async fn unload(manager: ManagerState<'_>) -> Result<(), CommandError> {
    commands::unload(manager.inner().clone()).await
}

#[tauri::command]
async fn transcribe_file(manager: ManagerState<'_>, path: String) -> Result<String, CommandError> {
    commands::transcribe_file(manager.inner().clone(), path).await
}

#[tauri::command]
async fn transcribe_data(manager: ManagerState<'_>, data: String) -> Result<String, CommandError> {
    commands::transcribe_data(manager.inner().clone(), data).await
}

#[tauri::command]
async fn transcribe_data_array(
    manager: ManagerState<'_>,
    data: Vec<u8>,
) -> Result<String, CommandError> {
    commands::transcribe_data_array(manager.inner().clone(), data).await
}

#[tauri::command]
async fn start_streaming(
    manager: ManagerState<'_>,
    options: Option<StreamingOptions>,
) -> Result<String, CommandError> {
    commands::start_streaming(manager.inner().clone(), options).await
}

#[tauri::command]
async fn feed_chunk(manager: ManagerState<'_>, data: Vec<u8>) -> Result<bool, CommandError> {
    commands::feed_chunk(manager.inner().clone(), data).await
}

#[tauri::command]
async fn stop_streaming(manager: ManagerState<'_>) -> Result<String, CommandError> {
    commands::stop_streaming(manager.inner().clone()).await
}

#[tauri::command]
async fn status(manager: ManagerState<'_>) -> Result<SpeechStatus, CommandError> {
    commands::status(manager.inner().clone()).await
}

/// Build the plugin around an existing manager.
///
/// The manager is put in managed state, so the host can also reach it
/// with `app.state::<Arc<SpeechManager>>()`.
pub fn init<R: Runtime>(manager: Arc<SpeechManager>) -> TauriPlugin<R> {
    Builder::new("vosk")
        .invoke_handler(tauri::generate_handler![
            load_model,
            start,
            stop,
            unload,
            transcribe_file,
            transcribe_data,
            transcribe_data_array,
            start_streaming,
            feed_chunk,
            stop_streaming,
            status
        ])
        .setup(move |app, _api| {
            forward_events(app.clone(), manager.subscribe());
            app.manage(manager);
            Ok(())
        })
        .build()
}

/// Build the plugin with the Vosk engine, reading settings and starting
/// file logging first.
///
/// # Errors
/// Returns an error if the settings are invalid.
#[cfg(feature = "vosk")]
pub fn init_with_vosk<R: Runtime>() -> Result<TauriPlugin<R>, crate::error::SessionError> {
    let settings = crate::settings::SettingsManager::new()?.get();
    if let Some(logs_dir) = crate::logging::logs_dir() {
        crate::logging::init(&logs_dir, &settings.log_filter);
    }
    let manager = Arc::new(SpeechManager::with_vosk(&settings));
    Ok(init(manager))
}

/// Emit every session event to the webview until the manager goes away.
fn forward_events<R: Runtime>(app: AppHandle<R>, mut events: broadcast::Receiver<SessionEvent>) {
    tauri::async_runtime::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!("Forwarding {}", event.name());
                    let payload = event.payload().map(str::to_owned);
                    if let Err(e) = app.emit(event.name(), payload) {
                        warn!("Failed to emit {}: {}", event.name(), e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event forwarder lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
