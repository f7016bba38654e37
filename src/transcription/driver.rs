// AudioDriver - background thread feeding captured audio into a recognizer
//
// One driver per continuous session. The loop wakes at least every poll
// interval to check for cancellation and the session deadline.

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioSource, Capture};
use crate::engine::{DecodingState, Recognizer};
use crate::error::SessionError;
use crate::events::{EventBridge, SessionEvent};
use crate::hypothesis::HypothesisKind;
use crate::lock;

/// Recognizer shared by the session (owner) and its driver (user).
pub type SharedRecognizer = Arc<Mutex<Box<dyn Recognizer>>>;

/// Tunables for the driver loop, taken from [`crate::Settings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    /// Samples read per iteration
    pub chunk_samples: usize,
    /// Longest a single read may wait
    pub poll_interval: Duration,
    /// Consecutive read failures tolerated before giving up
    pub read_retries: u32,
    pub retry_delay: Duration,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            chunk_samples: 3200,
            poll_interval: Duration::from_millis(50),
            read_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Why the driver loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// `stop()` was called
    Cancelled,
    /// The session deadline passed
    Expired,
    /// The source reported end of stream
    SourceClosed,
    /// Reads kept failing
    CaptureFailed,
}

/// Handle to a running driver thread.
pub struct AudioDriver {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl AudioDriver {
    /// Spawn the driver thread.
    ///
    /// # Arguments
    /// * `recognizer` - Decoder the audio is pushed into
    /// * `source` - Started audio source; owned by the thread
    /// * `timeout` - Optional session lifetime measured from now; one too
    ///   large to represent runs without a deadline
    /// * `on_expired` - Called on the driver thread once the deadline passes,
    ///   after the driver has released its recognizer handle
    ///
    /// # Errors
    /// Returns an error if the thread can't be spawned.
    pub fn spawn(
        settings: DriverSettings,
        recognizer: SharedRecognizer,
        source: Box<dyn AudioSource>,
        events: EventBridge,
        timeout: Option<Duration>,
        on_expired: Box<dyn FnOnce() + Send>,
    ) -> io::Result<Self> {
        let cancel = CancellationToken::new();
        let worker = DriverLoop {
            settings,
            recognizer,
            source,
            events,
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
            cancel: cancel.clone(),
        };

        let handle = thread::Builder::new()
            .name("vosk-audio-driver".to_string())
            .spawn(move || worker.run(on_expired))?;

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }

    /// Signal the loop to stop and wait for it.
    ///
    /// Called from the driver thread itself (timeout teardown) this only
    /// signals and detaches; a thread can't join itself.
    pub fn shutdown(mut self) {
        self.cancel.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            debug!("AudioDriver: shutdown from the driver thread, detaching");
            return;
        }
        if handle.join().is_err() {
            error!("AudioDriver: driver thread panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for AudioDriver {
    fn drop(&mut self) {
        // Never leave a loop running against a recognizer nobody owns
        self.cancel.cancel();
    }
}

struct DriverLoop {
    settings: DriverSettings,
    recognizer: SharedRecognizer,
    source: Box<dyn AudioSource>,
    events: EventBridge,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl DriverLoop {
    fn run(mut self, on_expired: Box<dyn FnOnce() + Send>) {
        info!("AudioDriver: started");
        let exit = self.pump();
        info!("AudioDriver: loop ended ({:?})", exit);

        match exit {
            Exit::Cancelled => self.publish_final(),
            Exit::SourceClosed => {
                self.publish_final();
                self.events.publish(SessionEvent::Error(
                    SessionError::CaptureFailed("audio source closed".to_string()).to_string(),
                ));
            }
            Exit::Expired => {
                let DriverLoop {
                    recognizer, source, ..
                } = self;
                drop(source);
                drop(recognizer);
                on_expired();
            }
            Exit::CaptureFailed => {}
        }
    }

    fn pump(&mut self) -> Exit {
        let mut buf = vec![0i16; self.settings.chunk_samples.max(1)];
        let mut failures = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Exit::Cancelled;
            }
            let wait = match self.deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Exit::Expired;
                    }
                    self.settings.poll_interval.min(deadline - now)
                }
                None => self.settings.poll_interval,
            };

            match self.source.read(&mut buf, wait) {
                Ok(Capture::Samples(n)) => {
                    failures = 0;
                    self.decode(&buf[..n]);
                }
                Ok(Capture::Idle) => {}
                Ok(Capture::Closed) => return Exit::SourceClosed,
                Err(e) => {
                    failures += 1;
                    if failures <= self.settings.read_retries {
                        warn!(
                            "AudioDriver: read failed ({}/{}), retrying: {}",
                            failures, self.settings.read_retries, e
                        );
                        if !self.pause(self.settings.retry_delay) {
                            return Exit::Cancelled;
                        }
                        continue;
                    }
                    error!("AudioDriver: giving up after {} failed reads: {}", failures, e);
                    self.events.publish(SessionEvent::Error(
                        SessionError::CaptureFailed(e.to_string()).to_string(),
                    ));
                    return Exit::CaptureFailed;
                }
            }
        }
    }

    /// Sleep for `delay` in poll-interval steps. Returns false if cancelled.
    fn pause(&self, delay: Duration) -> bool {
        let until = Instant::now().checked_add(delay);
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let step = match until {
                Some(until) => {
                    let now = Instant::now();
                    if now >= until {
                        return true;
                    }
                    self.settings.poll_interval.min(until - now)
                }
                None => self.settings.poll_interval,
            };
            thread::sleep(step);
        }
    }

    /// Push one chunk and publish whatever hypothesis it produced.
    fn decode(&self, samples: &[i16]) {
        let mut recognizer = lock(&self.recognizer);
        let record = match recognizer.accept_waveform(samples) {
            Ok(DecodingState::Finalized) => recognizer
                .result()
                .map(|raw| (HypothesisKind::Final, raw)),
            Ok(DecodingState::Running) => recognizer
                .partial_result()
                .map(|raw| (HypothesisKind::Partial, raw)),
            Err(e) => Err(e),
        };
        drop(recognizer);

        match record {
            Ok((HypothesisKind::Final, raw)) => {
                self.events.publish_record(HypothesisKind::Final, &raw, SessionEvent::Result);
            }
            Ok((HypothesisKind::Partial, raw)) => {
                self.events
                    .publish_record(HypothesisKind::Partial, &raw, SessionEvent::PartialResult);
            }
            Err(e) => {
                warn!("AudioDriver: decode failed: {}", e);
                self.events.publish(SessionEvent::Error(
                    SessionError::EngineRuntime(e.to_string()).to_string(),
                ));
            }
        }
    }

    fn publish_final(&self) {
        let raw = lock(&self.recognizer).final_result();
        match raw {
            Ok(raw) => {
                self.events
                    .publish_record(HypothesisKind::Final, &raw, SessionEvent::FinalResult);
            }
            Err(e) => {
                warn!("AudioDriver: final result failed: {}", e);
                self.events.publish(SessionEvent::Error(
                    SessionError::EngineRuntime(e.to_string()).to_string(),
                ));
            }
        }
    }
}
