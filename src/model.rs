// ModelRegistry - single owner of the loaded model
//
// At most one model is held at a time. Loading replaces (and first
// releases) the current one; a failed load leaves the registry empty.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{SpeechEngine, SpeechModel};
use crate::error::{Result, SessionError};
use crate::{read_lock, write_lock};

/// Where the current model came from (returned to the host).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Directory the engine loaded
    pub path: PathBuf,
    /// True if `path` was found under the bundled models directory
    pub bundled: bool,
}

pub struct LoadedModel {
    model: Box<dyn SpeechModel>,
    info: ModelInfo,
}

/// Shared read access to the model slot.
///
/// While a lease is held the model can't be unloaded or replaced.
pub struct ModelLease<'a>(RwLockReadGuard<'a, Option<LoadedModel>>);

impl ModelLease<'_> {
    /// The loaded model, or [`SessionError::NoModel`].
    pub fn model(&self) -> Result<&dyn SpeechModel> {
        self.0
            .as_ref()
            .map(|loaded| loaded.model.as_ref())
            .ok_or(SessionError::NoModel)
    }

    pub fn is_loaded(&self) -> bool {
        self.0.is_some()
    }
}

/// Owns at most one loaded model.
///
/// The registry never reaches into sessions. Callers that own sessions pass
/// their teardown as the `before_release` hook of [`load_with`] and
/// [`unload_with`]; it runs inside the registry's exclusive section, before
/// the old model is dropped.
///
/// [`load_with`]: ModelRegistry::load_with
/// [`unload_with`]: ModelRegistry::unload_with
pub struct ModelRegistry {
    engine: Arc<dyn SpeechEngine>,
    /// Fallback location for bundled models
    models_dir: PathBuf,
    slot: RwLock<Option<LoadedModel>>,
}

impl ModelRegistry {
    pub fn new(engine: Arc<dyn SpeechEngine>, models_dir: PathBuf) -> Self {
        Self {
            engine,
            models_dir,
            slot: RwLock::new(None),
        }
    }

    /// Load the model at `path`, replacing any current model.
    pub fn load(&self, path: &str) -> Result<ModelInfo> {
        self.load_with(path, || {})
    }

    /// Like [`load`](Self::load), running `before_release` first.
    ///
    /// # Errors
    /// `ModelLoadFailed` if neither `path` nor `<models_dir>/<path>` is a
    /// directory, or the engine rejects the bundle. The registry is empty
    /// afterwards in both cases.
    pub fn load_with(&self, path: &str, before_release: impl FnOnce()) -> Result<ModelInfo> {
        let mut slot = write_lock(&self.slot);
        before_release();
        if let Some(old) = slot.take() {
            info!("Releasing model {:?} before loading {:?}", old.info.path, path);
            drop(old);
        }

        let info = self.resolve(path)?;
        let model = self
            .engine
            .load_model(&info.path)
            .map_err(|e| SessionError::ModelLoadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        info!(
            "Model loaded from {:?} (engine: {}, bundled: {})",
            info.path,
            self.engine.name(),
            info.bundled
        );
        *slot = Some(LoadedModel {
            model,
            info: info.clone(),
        });
        Ok(info)
    }

    /// Release the current model. Returns whether one was loaded.
    pub fn unload(&self) -> bool {
        self.unload_with(|| {})
    }

    /// Like [`unload`](Self::unload), running `before_release` first.
    pub fn unload_with(&self, before_release: impl FnOnce()) -> bool {
        let mut slot = write_lock(&self.slot);
        before_release();
        match slot.take() {
            Some(old) => {
                info!("Model {:?} unloaded", old.info.path);
                true
            }
            None => false,
        }
    }

    /// Shared access for the duration of a command.
    pub fn lease(&self) -> ModelLease<'_> {
        ModelLease(read_lock(&self.slot))
    }

    pub fn is_loaded(&self) -> bool {
        self.lease().is_loaded()
    }

    pub fn info(&self) -> Option<ModelInfo> {
        read_lock(&self.slot).as_ref().map(|loaded| loaded.info.clone())
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    fn resolve(&self, path: &str) -> Result<ModelInfo> {
        if path.trim().is_empty() {
            return Err(SessionError::ModelLoadFailed {
                path: path.to_string(),
                reason: "empty model path".to_string(),
            });
        }

        let direct = PathBuf::from(path);
        if direct.is_dir() {
            return Ok(ModelInfo {
                path: direct,
                bundled: false,
            });
        }

        warn!("Model directory does not exist at path {:?}, trying bundled models", path);
        let bundled = self.models_dir.join(path);
        if bundled.is_dir() {
            return Ok(ModelInfo {
                path: bundled,
                bundled: true,
            });
        }

        Err(SessionError::ModelLoadFailed {
            path: path.to_string(),
            reason: format!(
                "no model directory at the path or under {:?}",
                self.models_dir
            ),
        })
    }
}
