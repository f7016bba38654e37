// Session layer: model-bound recognizers driven by capture, host chunks or files.

pub mod continuous;
pub mod driver;
pub mod manager;
pub mod one_shot;
pub mod streaming;

pub use continuous::{ContinuousSession, SessionState};
pub use driver::{AudioDriver, DriverSettings, SharedRecognizer};
pub use manager::{SpeechManager, SpeechStatus};
pub use one_shot::OneShotTranscriber;
pub use streaming::StreamingSession;
