// StreamingSession - recognition over PCM chunks pushed by the host
//
// No background thread: every chunk is decoded on the calling thread and
// its hypotheses are published before feed_chunk returns.

use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::audio::PcmAssembler;
use crate::engine::{DecodingState, EngineError, Recognizer};
use crate::error::{Result, SessionError};
use crate::events::{EventBridge, SessionEvent};
use crate::hypothesis::HypothesisKind;
use crate::lock;

struct StreamingRecognizer {
    recognizer: Box<dyn Recognizer>,
    /// Holds an odd trailing byte until the next chunk
    pcm: PcmAssembler,
    chunks: u64,
}

/// Owns at most one streaming recognizer.
pub struct StreamingSession {
    slot: Mutex<Option<StreamingRecognizer>>,
    events: EventBridge,
}

impl StreamingSession {
    pub fn new(events: EventBridge) -> Self {
        Self {
            slot: Mutex::new(None),
            events,
        }
    }

    /// Create the streaming recognizer.
    ///
    /// # Errors
    /// `AlreadyStreaming` (checked before `make_recognizer` runs) or whatever
    /// `make_recognizer` returns.
    pub fn start(
        &self,
        make_recognizer: impl FnOnce() -> Result<Box<dyn Recognizer>>,
    ) -> Result<()> {
        let mut slot = lock(&self.slot);
        if slot.is_some() {
            return Err(SessionError::AlreadyStreaming);
        }
        let recognizer = make_recognizer()?;
        *slot = Some(StreamingRecognizer {
            recognizer,
            pcm: PcmAssembler::new(),
            chunks: 0,
        });
        info!("StreamingSession: started");
        Ok(())
    }

    /// Decode one chunk of s16le PCM.
    ///
    /// At an utterance boundary the complete text is published as
    /// `onResult`; the running partial is published as `onPartialResult`
    /// either way. Empty hypotheses are not published.
    ///
    /// # Errors
    /// `NoActiveStreamingSession` if not streaming, `FeedFailed` if the
    /// engine fails. A failed chunk leaves the session streaming.
    pub fn feed_chunk(&self, bytes: &[u8]) -> Result<bool> {
        let mut slot = lock(&self.slot);
        let active = slot
            .as_mut()
            .ok_or(SessionError::NoActiveStreamingSession)?;

        let samples = active.pcm.push(bytes);
        active.chunks += 1;

        let chunk = active.chunks;
        let feed_failed = move |e: EngineError| {
            warn!("StreamingSession: chunk {} failed: {}", chunk, e);
            SessionError::FeedFailed(e.to_string())
        };

        let state = active
            .recognizer
            .accept_waveform(&samples)
            .map_err(feed_failed)?;
        if state == DecodingState::Finalized {
            let raw = active.recognizer.result().map_err(feed_failed)?;
            self.events
                .publish_record(HypothesisKind::Final, &raw, SessionEvent::Result);
        }
        let raw = active.recognizer.partial_result().map_err(feed_failed)?;
        self.events
            .publish_record(HypothesisKind::Partial, &raw, SessionEvent::PartialResult);

        Ok(true)
    }

    /// End the session and return the final result record.
    ///
    /// The recognizer is released whether or not the final result could be
    /// retrieved, and the session is Idle afterwards either way.
    ///
    /// # Errors
    /// `NoActiveStreamingSession` if not streaming, `StopFailed` if the
    /// engine fails to produce the final record.
    pub fn stop(&self) -> Result<String> {
        let mut slot = lock(&self.slot);
        let mut active = slot.take().ok_or(SessionError::NoActiveStreamingSession)?;

        if active.pcm.has_pending() {
            debug!("StreamingSession: dropping odd trailing byte");
        }
        let outcome = active.recognizer.final_result();
        drop(active);
        drop(slot);

        info!("StreamingSession: stopped");
        outcome.map_err(|e| SessionError::StopFailed(e.to_string()))
    }

    /// Release the recognizer without producing a result. Idempotent.
    pub fn teardown(&self) -> bool {
        let released = lock(&self.slot).take().is_some();
        if released {
            info!("StreamingSession: torn down");
        }
        released
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Number of chunks fed since the session started (0 when idle).
    pub fn chunks_fed(&self) -> u64 {
        lock(&self.slot).as_ref().map_or(0, |active| active.chunks)
    }
}
