pub mod manager;

#[cfg(test)]
mod tests;

pub use manager::{Settings, SettingsManager, CAPTURE_FIFO_ENV, MODELS_DIR_ENV};
