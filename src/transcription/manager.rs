// SpeechManager - Orchestrates model, sessions and one-shot transcription
// Every host command lands here; events leave through the EventBridge.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::continuous::{ContinuousSession, SessionState};
use super::driver::DriverSettings;
use super::one_shot::OneShotTranscriber;
use super::streaming::StreamingSession;
use crate::audio::CaptureProvider;
use crate::engine::{SpeechEngine, SAMPLE_RATE};
use crate::error::{Result, SessionError};
use crate::events::{EventBridge, SessionEvent};
use crate::grammar::Grammar;
use crate::model::{ModelInfo, ModelRegistry};
use crate::recognizer::RecognizerFactory;
use crate::settings::Settings;

/// Snapshot returned by [`SpeechManager::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechStatus {
    pub model_loaded: bool,
    pub model: Option<ModelInfo>,
    pub session: SessionState,
    pub streaming: bool,
}

/// SpeechManager owns every engine resource of the process.
///
/// Responsibilities:
/// - Hold the single loaded model (ModelRegistry)
/// - Run at most one continuous and one streaming session
/// - Transcribe files and buffers with transient recognizers
/// - Tear sessions down before the model they depend on is released
///
/// Lock order is always registry, then session slot. Commands that use the
/// model hold a registry lease for their whole duration, so the model can't
/// be released underneath a recognizer.
pub struct SpeechManager {
    models: ModelRegistry,
    continuous: ContinuousSession,
    streaming: StreamingSession,
    transcriber: OneShotTranscriber,
    capture: Arc<dyn CaptureProvider>,
    events: EventBridge,
}

impl SpeechManager {
    /// Create a manager with no model loaded.
    ///
    /// # Arguments
    /// * `engine` - Decoding engine used for every model
    /// * `capture` - Audio input for continuous sessions
    /// * `settings` - Validated settings
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        capture: Arc<dyn CaptureProvider>,
        settings: &Settings,
    ) -> Self {
        let events = EventBridge::new();
        let driver = DriverSettings {
            chunk_samples: settings.capture_chunk_samples,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            read_retries: settings.read_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        };
        info!(
            "SpeechManager: engine {}, models dir {:?}",
            engine.name(),
            settings.models_dir
        );

        Self {
            models: ModelRegistry::new(engine, settings.models_dir.clone()),
            continuous: ContinuousSession::new(events.clone(), driver),
            streaming: StreamingSession::new(events.clone()),
            transcriber: OneShotTranscriber::new(settings.file_chunk_bytes),
            capture,
            events,
        }
    }

    /// Manager backed by Vosk, capturing from the configured FIFO.
    #[cfg(feature = "vosk")]
    pub fn with_vosk(settings: &Settings) -> Self {
        let engine = Arc::new(crate::engine::VoskEngine::new(settings.engine_quiet));
        let capture = Arc::new(crate::audio::FifoCapture::new(settings.capture_fifo.clone()));
        Self::new(engine, capture, settings)
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBridge {
        &self.events
    }

    /// Load a model, replacing the current one.
    ///
    /// Running sessions are torn down first; they can't outlive their model.
    ///
    /// # Errors
    /// `ModelLoadFailed`; no model is loaded afterwards.
    pub fn load_model(&self, path: &str) -> Result<ModelInfo> {
        info!("SpeechManager: loading model {:?}", path);
        self.models.load_with(path, || self.teardown_sessions())
    }

    /// Release sessions and the model. Idempotent.
    pub fn unload(&self) {
        if self.models.unload_with(|| self.teardown_sessions()) {
            info!("SpeechManager: unloaded");
        }
    }

    /// Start a continuous session on the capture source.
    ///
    /// # Arguments
    /// * `grammar` - Optional phrase list
    /// * `timeout` - Optional session lifetime
    ///
    /// # Errors
    /// `NoModel`, `AlreadyActive`, `EngineInitFailed` or `CaptureFailed`.
    pub fn start(&self, grammar: Option<Grammar>, timeout: Option<Duration>) -> Result<()> {
        let lease = self.models.lease();
        let model = lease.model()?;
        self.continuous.start(
            || RecognizerFactory::create(model, SAMPLE_RATE, grammar.as_ref()),
            self.capture.as_ref(),
            timeout,
        )
    }

    /// Stop the continuous session. Idempotent.
    pub fn stop(&self) {
        self.continuous.stop();
    }

    /// Transcribe a raw PCM or WAV file and return the final JSON record.
    ///
    /// # Errors
    /// `NoModel` or `TranscribeFailed`.
    pub fn transcribe_file(&self, path: &Path) -> Result<String> {
        let lease = self.models.lease();
        let model = lease.model()?;
        self.transcriber.transcribe_file(model, path)
    }

    /// Transcribe base64-encoded s16le PCM.
    ///
    /// # Errors
    /// `NoModel`, or `TranscribeFailed` (including invalid base64).
    pub fn transcribe_data(&self, base64: &str) -> Result<String> {
        let lease = self.models.lease();
        let model = lease.model()?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(base64.trim())
            .map_err(|e| SessionError::TranscribeFailed(format!("Invalid base64 audio: {}", e)))?;
        self.transcriber.transcribe_buffer(model, &bytes)
    }

    /// Transcribe s16le PCM bytes.
    ///
    /// # Errors
    /// `NoModel` or `TranscribeFailed`.
    pub fn transcribe_data_array(&self, bytes: &[u8]) -> Result<String> {
        let lease = self.models.lease();
        let model = lease.model()?;
        self.transcriber.transcribe_buffer(model, bytes)
    }

    /// Start a streaming session fed by [`feed_chunk`](Self::feed_chunk).
    ///
    /// # Errors
    /// `NoModel`, `AlreadyStreaming` or `EngineInitFailed`.
    pub fn start_streaming(&self, grammar: Option<Grammar>) -> Result<()> {
        let lease = self.models.lease();
        let model = lease.model()?;
        self.streaming
            .start(|| RecognizerFactory::create(model, SAMPLE_RATE, grammar.as_ref()))
    }

    /// Feed PCM bytes into the streaming session.
    ///
    /// # Errors
    /// `NoActiveStreamingSession` or `FeedFailed`.
    pub fn feed_chunk(&self, bytes: &[u8]) -> Result<bool> {
        let _lease = self.models.lease();
        self.streaming.feed_chunk(bytes)
    }

    /// End the streaming session and return its final JSON record.
    ///
    /// # Errors
    /// `NoActiveStreamingSession` or `StopFailed`; the session ends either way.
    pub fn stop_streaming(&self) -> Result<String> {
        let _lease = self.models.lease();
        self.streaming.stop()
    }

    pub fn status(&self) -> SpeechStatus {
        let model = self.models.info();
        SpeechStatus {
            model_loaded: model.is_some(),
            model,
            session: self.continuous.state(),
            streaming: self.streaming.is_streaming(),
        }
    }

    /// Runs inside the registry's exclusive section.
    fn teardown_sessions(&self) {
        if self.continuous.stop() {
            warn!("SpeechManager: continuous session stopped by model release");
        }
        if self.streaming.teardown() {
            warn!("SpeechManager: streaming session dropped by model release");
        }
    }
}

impl Drop for SpeechManager {
    fn drop(&mut self) {
        self.unload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        drain_events, next_event, pcm_bytes, CaptureStep, ScriptedCapture, ScriptedEngine,
        BOUNDARY, SPEECH,
    };
    use proptest::prelude::*;
    use std::sync::mpsc::Sender;

    const WAIT: Duration = Duration::from_secs(2);

    struct Fixture {
        manager: SpeechManager,
        engine: Arc<ScriptedEngine>,
        feed: Sender<CaptureStep>,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn model_path(&self) -> String {
            let path = self.dir.path().join("model-en");
            std::fs::create_dir_all(&path).unwrap();
            path.to_string_lossy().into_owned()
        }

        fn live(&self) -> (usize, usize) {
            (
                self.engine.counters.live_models(),
                self.engine.counters.live_recognizers(),
            )
        }
    }

    fn fixture() -> Fixture {
        let engine = ScriptedEngine::new();
        let (capture, feed) = ScriptedCapture::new();
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            models_dir: dir.path().join("bundled"),
            poll_interval_ms: 5,
            retry_delay_ms: 1,
            capture_chunk_samples: 64,
            ..Settings::default()
        };
        Fixture {
            manager: SpeechManager::new(engine.clone(), capture, &settings),
            engine,
            feed,
            dir,
        }
    }

    #[test]
    fn test_commands_without_model() {
        let f = fixture();
        assert!(matches!(f.manager.start(None, None), Err(SessionError::NoModel)));
        assert!(matches!(f.manager.start_streaming(None), Err(SessionError::NoModel)));
        assert!(matches!(f.manager.transcribe_data_array(&[0, 0]), Err(SessionError::NoModel)));
        assert!(matches!(f.manager.transcribe_data("AAA="), Err(SessionError::NoModel)));
        assert!(matches!(
            f.manager.transcribe_file(Path::new("/nonexistent.wav")),
            Err(SessionError::NoModel)
        ));
        // Streaming commands report the missing session, not the missing model
        assert!(matches!(
            f.manager.feed_chunk(&[0, 0]),
            Err(SessionError::NoActiveStreamingSession)
        ));
        f.manager.stop();
        f.manager.unload();
    }

    #[test]
    fn test_load_start_stop_stop() {
        let f = fixture();
        let mut rx = f.manager.subscribe();
        f.manager.load_model(&f.model_path()).unwrap();

        f.manager.start(None, None).unwrap();
        assert!(matches!(f.manager.start(None, None), Err(SessionError::AlreadyActive)));

        f.feed.send(CaptureStep::Samples(vec![SPEECH, BOUNDARY])).unwrap();
        assert_eq!(next_event(&mut rx, WAIT), Some(SessionEvent::Result("hello".into())));

        f.manager.stop();
        f.manager.stop();
        assert_eq!(f.manager.status().session, SessionState::Idle);
        assert_eq!(f.live(), (1, 0));
    }

    #[test]
    fn test_grammar_flows_to_recognizer() {
        let f = fixture();
        let mut rx = f.manager.subscribe();
        f.manager.load_model(&f.model_path()).unwrap();

        let grammar = Grammar::new(["cool", "application"]).with_unknown();
        f.manager.start(Some(grammar), None).unwrap();
        f.feed.send(CaptureStep::Samples(vec![SPEECH])).unwrap();
        assert_eq!(next_event(&mut rx, WAIT), Some(SessionEvent::PartialResult("cool".into())));
        f.manager.stop();
    }

    #[test]
    fn test_timeout_scenario() {
        let f = fixture();
        let mut rx = f.manager.subscribe();
        f.manager.load_model(&f.model_path()).unwrap();

        f.manager.start(None, Some(Duration::from_millis(30))).unwrap();
        assert_eq!(next_event(&mut rx, WAIT), Some(SessionEvent::Timeout));
        assert_eq!(f.manager.status().session, SessionState::Idle);
        assert_eq!(f.live(), (1, 0));
        assert_eq!(next_event(&mut rx, Duration::from_millis(50)), None);
    }

    #[test]
    fn test_streaming_scenario() {
        let f = fixture();
        let mut rx = f.manager.subscribe();
        f.manager.load_model(&f.model_path()).unwrap();

        f.manager.start_streaming(None).unwrap();
        assert!(f.manager.status().streaming);
        assert!(f.manager.feed_chunk(&pcm_bytes(&[SPEECH])).unwrap());
        assert!(f.manager.feed_chunk(&pcm_bytes(&[BOUNDARY])).unwrap());
        assert_eq!(
            drain_events(&mut rx),
            vec![
                SessionEvent::PartialResult("hello".into()),
                SessionEvent::Result("hello".into()),
            ]
        );

        let record = f.manager.stop_streaming().unwrap();
        assert!(record.contains("\"text\""));
        assert!(matches!(
            f.manager.stop_streaming(),
            Err(SessionError::NoActiveStreamingSession)
        ));
        assert_eq!(f.live(), (1, 0));

        // Same again with silence only
        f.manager.start_streaming(None).unwrap();
        for _ in 0..4 {
            assert!(f.manager.feed_chunk(&vec![0u8; 3200]).unwrap());
        }
        assert!(drain_events(&mut rx).is_empty());
        let record = f.manager.stop_streaming().unwrap();
        let json: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(json["text"], "");
        assert_eq!(f.live(), (1, 0));
    }

    #[test]
    fn test_silence_through_transcribe_data() {
        let f = fixture();
        let mut rx = f.manager.subscribe();
        f.manager.load_model(&f.model_path()).unwrap();

        let silence = base64::engine::general_purpose::STANDARD.encode(vec![0u8; 3200]);
        let record = f.manager.transcribe_data(&silence).unwrap();
        let json: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(json["text"], "");
        assert!(drain_events(&mut rx).is_empty());
        assert_eq!(f.live(), (1, 0));
    }

    #[test]
    fn test_invalid_base64_is_transcribe_failed() {
        let f = fixture();
        f.manager.load_model(&f.model_path()).unwrap();
        let err = f.manager.transcribe_data("not base64!!").unwrap_err();
        assert_eq!(err.code(), "TRANSCRIBE_FAIL");
    }

    #[test]
    fn test_unload_tears_down_both_sessions() {
        let f = fixture();
        f.manager.load_model(&f.model_path()).unwrap();
        f.manager.start(None, None).unwrap();
        f.manager.start_streaming(None).unwrap();
        assert_eq!(f.live(), (1, 2));

        f.manager.unload();
        assert_eq!(f.live(), (0, 0));
        let status = f.manager.status();
        assert!(!status.model_loaded);
        assert_eq!(status.session, SessionState::Idle);
        assert!(!status.streaming);
    }

    #[test]
    fn test_reload_replaces_model_and_sessions() {
        let f = fixture();
        let path = f.model_path();
        f.manager.load_model(&path).unwrap();
        f.manager.start(None, None).unwrap();

        f.manager.load_model(&path).unwrap();
        assert_eq!(f.live(), (1, 0));
        assert_eq!(f.manager.status().session, SessionState::Idle);

        assert!(f.manager.load_model("missing-model").is_err());
        assert_eq!(f.live(), (0, 0));
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let f = fixture();
        let json = serde_json::to_value(f.manager.status()).unwrap();
        assert_eq!(json["modelLoaded"], false);
        assert_eq!(json["session"], "idle");
        assert_eq!(json["streaming"], false);
    }

    #[test]
    fn test_drop_releases_everything() {
        let f = fixture();
        f.manager.load_model(&f.model_path()).unwrap();
        f.manager.start(None, None).unwrap();
        let Fixture { manager, engine, .. } = f;
        drop(manager);
        assert_eq!(engine.counters.live_models(), 0);
        assert_eq!(engine.counters.live_recognizers(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Load,
        LoadMissing,
        Unload,
        Start,
        Stop,
        StartStreaming,
        Feed,
        StopStreaming,
        Transcribe,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Load),
            Just(Op::LoadMissing),
            Just(Op::Unload),
            Just(Op::Start),
            Just(Op::Stop),
            Just(Op::StartStreaming),
            Just(Op::Feed),
            Just(Op::StopStreaming),
            Just(Op::Transcribe),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// No command order leaks a handle or leaves a recognizer without its model.
        #[test]
        fn prop_command_sequences_never_leak(ops in prop::collection::vec(op(), 1..24)) {
            let f = fixture();
            let path = f.model_path();

            for op in ops {
                let loaded = f.manager.status().model_loaded;
                let active = f.manager.status().session == SessionState::Active;
                match op {
                    Op::Load => prop_assert!(f.manager.load_model(&path).is_ok()),
                    Op::LoadMissing => {
                        prop_assert!(f.manager.load_model("no-such-model").is_err())
                    }
                    Op::Unload => f.manager.unload(),
                    Op::Start => {
                        let result = f.manager.start(None, None);
                        match (loaded, active) {
                            (false, _) => {
                                prop_assert!(matches!(result, Err(SessionError::NoModel)))
                            }
                            (true, true) => {
                                prop_assert!(matches!(result, Err(SessionError::AlreadyActive)))
                            }
                            (true, false) => prop_assert!(result.is_ok()),
                        }
                    }
                    Op::Stop => f.manager.stop(),
                    Op::StartStreaming => { let _ = f.manager.start_streaming(None); }
                    Op::Feed => { let _ = f.manager.feed_chunk(&pcm_bytes(&[SPEECH])); }
                    Op::StopStreaming => { let _ = f.manager.stop_streaming(); }
                    Op::Transcribe => {
                        let _ = f.manager.transcribe_data_array(&pcm_bytes(&[SPEECH]));
                    }
                }

                let (models, recognizers) = f.live();
                prop_assert!(models <= 1);
                if models == 0 {
                    prop_assert_eq!(recognizers, 0);
                }
                prop_assert!(recognizers <= 2);
            }

            f.manager.stop();
            f.manager.stop();
            f.manager.unload();
            f.manager.unload();
            prop_assert_eq!(f.live(), (0, 0));
            prop_assert_eq!(f.manager.status().session, SessionState::Idle);
        }
    }
}
