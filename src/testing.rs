// Scripted engine and capture used by unit tests.
//
// The recognizer understands three kinds of samples: zero is silence,
// `SPEECH` adds one word to the running utterance, `BOUNDARY` closes the
// utterance. `DECODE_FAIL` makes `accept_waveform` fail.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::broadcast;

use crate::audio::{AudioSource, Capture, CaptureProvider};
use crate::engine::{DecodingState, EngineError, Recognizer, SpeechEngine, SpeechModel};
use crate::events::SessionEvent;
use crate::grammar::Grammar;

pub(crate) const SPEECH: i16 = 1000;
pub(crate) const BOUNDARY: i16 = i16::MAX;
pub(crate) const DECODE_FAIL: i16 = i16::MIN;

/// Grammar token that makes recognizer creation fail.
pub(crate) const REJECTED_TOKEN: &str = "reject-me";

/// Live and total handle counts, shared by everything one engine creates.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub live_models: AtomicUsize,
    pub live_recognizers: AtomicUsize,
    pub models_loaded: AtomicUsize,
    pub recognizers_created: AtomicUsize,
}

impl Counters {
    pub fn live_models(&self) -> usize {
        self.live_models.load(Ordering::SeqCst)
    }

    pub fn models_loaded(&self) -> usize {
        self.models_loaded.load(Ordering::SeqCst)
    }

    pub fn live_recognizers(&self) -> usize {
        self.live_recognizers.load(Ordering::SeqCst)
    }

    pub fn recognizers_created(&self) -> usize {
        self.recognizers_created.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct ScriptedEngine {
    pub counters: Arc<Counters>,
    /// When set, `final_result` fails on every recognizer
    pub fail_final: Arc<AtomicBool>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl SpeechEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn load_model(&self, path: &Path) -> Result<Box<dyn SpeechModel>, EngineError> {
        if path.to_string_lossy().contains("corrupt") {
            return Err(EngineError::ModelLoad(format!("{:?} is corrupt", path)));
        }
        self.counters.live_models.fetch_add(1, Ordering::SeqCst);
        self.counters.models_loaded.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedModel {
            counters: self.counters.clone(),
            fail_final: self.fail_final.clone(),
        }))
    }
}

struct ScriptedModel {
    counters: Arc<Counters>,
    fail_final: Arc<AtomicBool>,
}

impl Drop for ScriptedModel {
    fn drop(&mut self) {
        self.counters.live_models.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SpeechModel for ScriptedModel {
    fn create_recognizer(
        &self,
        sample_rate: f32,
        grammar: Option<&Grammar>,
    ) -> Result<Box<dyn Recognizer>, EngineError> {
        if sample_rate != 16000.0 {
            return Err(EngineError::RecognizerInit(format!("bad rate {}", sample_rate)));
        }
        if let Some(grammar) = grammar {
            if grammar.tokens().iter().any(|t| t == REJECTED_TOKEN) {
                return Err(EngineError::RecognizerInit("grammar rejected".to_string()));
            }
        }
        self.counters.live_recognizers.fetch_add(1, Ordering::SeqCst);
        self.counters.recognizers_created.fetch_add(1, Ordering::SeqCst);
        let word = grammar
            .and_then(|g| g.tokens().first().cloned())
            .unwrap_or_else(|| "hello".to_string());
        Ok(Box::new(ScriptedRecognizer {
            counters: self.counters.clone(),
            fail_final: self.fail_final.clone(),
            word,
            current: Vec::new(),
            finished: String::new(),
        }))
    }
}

struct ScriptedRecognizer {
    counters: Arc<Counters>,
    fail_final: Arc<AtomicBool>,
    word: String,
    current: Vec<String>,
    finished: String,
}

impl Drop for ScriptedRecognizer {
    fn drop(&mut self) {
        self.counters.live_recognizers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Recognizer for ScriptedRecognizer {
    fn accept_waveform(&mut self, samples: &[i16]) -> Result<DecodingState, EngineError> {
        if samples.contains(&DECODE_FAIL) {
            return Err(EngineError::Decode("scripted decode failure".to_string()));
        }
        if samples.contains(&SPEECH) {
            self.current.push(self.word.clone());
        }
        if samples.contains(&BOUNDARY) {
            self.finished = self.current.join(" ");
            self.current.clear();
            return Ok(DecodingState::Finalized);
        }
        Ok(DecodingState::Running)
    }

    fn result(&mut self) -> Result<String, EngineError> {
        Ok(json!({ "text": std::mem::take(&mut self.finished) }).to_string())
    }

    fn partial_result(&mut self) -> Result<String, EngineError> {
        Ok(json!({ "partial": self.current.join(" ") }).to_string())
    }

    fn final_result(&mut self) -> Result<String, EngineError> {
        if self.fail_final.load(Ordering::SeqCst) {
            return Err(EngineError::Decode("scripted final failure".to_string()));
        }
        let text = self.current.join(" ");
        self.current.clear();
        Ok(json!({ "text": text }).to_string())
    }

    fn reset(&mut self) {
        self.current.clear();
        self.finished.clear();
    }
}

/// One step of scripted capture input.
pub(crate) enum CaptureStep {
    Samples(Vec<i16>),
    Fail(io::ErrorKind),
    Close,
}

/// Capture whose audio is pushed by the test through a channel.
pub(crate) struct ScriptedCapture {
    steps: Arc<Mutex<mpsc::Receiver<CaptureStep>>>,
    taken: Arc<AtomicUsize>,
    pub fail_start: AtomicBool,
    pub opened: AtomicUsize,
}

impl ScriptedCapture {
    pub fn new() -> (Arc<Self>, mpsc::Sender<CaptureStep>) {
        let (tx, rx) = mpsc::channel();
        let capture = Arc::new(Self {
            steps: Arc::new(Mutex::new(rx)),
            taken: Arc::new(AtomicUsize::new(0)),
            fail_start: AtomicBool::new(false),
            opened: AtomicUsize::new(0),
        });
        (capture, tx)
    }

    /// Steps read by sources so far.
    pub fn steps_taken(&self) -> usize {
        self.taken.load(Ordering::SeqCst)
    }
}

impl CaptureProvider for ScriptedCapture {
    fn open(&self) -> io::Result<Box<dyn AudioSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            steps: self.steps.clone(),
            taken: self.taken.clone(),
            fail_start: self.fail_start.load(Ordering::SeqCst),
        }))
    }
}

struct ScriptedSource {
    steps: Arc<Mutex<mpsc::Receiver<CaptureStep>>>,
    taken: Arc<AtomicUsize>,
    fail_start: bool,
}

impl AudioSource for ScriptedSource {
    fn start(&mut self) -> io::Result<()> {
        if self.fail_start {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "microphone busy"));
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16], wait: Duration) -> io::Result<Capture> {
        let step = {
            let rx = self.steps.lock().unwrap();
            rx.recv_timeout(wait)
        };
        if step.is_ok() {
            self.taken.fetch_add(1, Ordering::SeqCst);
        }
        match step {
            Ok(CaptureStep::Samples(samples)) => {
                let n = samples.len().min(buf.len());
                buf[..n].copy_from_slice(&samples[..n]);
                Ok(Capture::Samples(n))
            }
            Ok(CaptureStep::Fail(kind)) => Err(io::Error::new(kind, "scripted read failure")),
            Ok(CaptureStep::Close) => Ok(Capture::Closed),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(Capture::Idle),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                std::thread::sleep(wait);
                Ok(Capture::Idle)
            }
        }
    }
}

/// Wait up to `timeout` for the next event.
pub(crate) fn next_event(
    rx: &mut broadcast::Receiver<SessionEvent>,
    timeout: Duration,
) -> Option<SessionEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        match rx.try_recv() {
            Ok(event) => return Some(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(broadcast::error::TryRecvError::Closed) => return None,
            Err(broadcast::error::TryRecvError::Empty) => {
                if Instant::now() >= deadline {
                    return None;
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        }
    }
}

/// Drain everything published so far.
pub(crate) fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = next_event(rx, Duration::ZERO) {
        events.push(event);
    }
    events
}

/// Poll `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// s16le bytes for the given samples.
pub(crate) fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
