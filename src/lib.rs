//! Model, recognizer and session lifecycle for the Vosk speech engine.
//!
//! One [`SpeechManager`] owns the loaded model, at most one continuous
//! (capture-driven) session and at most one streaming (host-fed) session.
//! Results leave through the [`EventBridge`] as `onResult`,
//! `onPartialResult`, `onFinalResult`, `onError` and `onTimeout` events.
//!
//! The Vosk engine is behind the `vosk` feature and the Tauri transport
//! behind `tauri`; without them the crate builds against any
//! [`SpeechEngine`] implementation.

// Module declarations
pub mod audio;
pub mod commands;
pub mod engine;
pub mod error;
pub mod events;
pub mod grammar;
pub mod hypothesis;
pub mod logging;
pub mod model;
pub mod recognizer;
pub mod settings;
pub mod transcription;
pub mod wav;

#[cfg(feature = "tauri")]
pub mod plugin;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use engine::{DecodingState, EngineError, Recognizer, SpeechEngine, SpeechModel, SAMPLE_RATE};
pub use error::{CommandError, Result, SessionError};
pub use events::{EventBridge, SessionEvent};
pub use grammar::Grammar;
pub use model::{ModelInfo, ModelRegistry};
pub use recognizer::RecognizerFactory;
pub use settings::{Settings, SettingsManager};
pub use transcription::{SessionState, SpeechManager, SpeechStatus};

// A panic on another thread must not wedge the session slots; the data
// behind these locks stays consistent across a poisoned guard.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
