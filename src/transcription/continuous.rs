// ContinuousSession - microphone-driven recognition with an optional time limit
//
// State machine: Idle -> Active -> Stopping -> Idle. The recognizer and its
// driver live and die together in the session slot; teardown is done by
// exactly one party (a caller's stop() or the driver on timeout) while the
// `stopping` flag is set, and everyone else waits on the condvar.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::driver::{AudioDriver, DriverSettings, SharedRecognizer};
use crate::audio::CaptureProvider;
use crate::engine::Recognizer;
use crate::error::{Result, SessionError};
use crate::events::{EventBridge, SessionEvent};
use crate::lock;

/// Lifecycle of the continuous session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Active,
    /// Teardown in progress
    Stopping,
}

struct ActiveSession {
    /// Distinguishes this session from later ones in timeout callbacks
    generation: u64,
    driver: AudioDriver,
    recognizer: SharedRecognizer,
}

impl ActiveSession {
    /// Driver first, so nothing is decoding when the recognizer goes.
    fn teardown(self) {
        self.driver.shutdown();
        drop(self.recognizer);
    }
}

#[derive(Default)]
struct SlotState {
    active: Option<ActiveSession>,
    stopping: bool,
    generation: u64,
}

#[derive(Default)]
struct SessionSlot {
    state: Mutex<SlotState>,
    idle: Condvar,
}

impl SessionSlot {
    /// Lock the state once no teardown is running.
    fn wait_idle(&self) -> MutexGuard<'_, SlotState> {
        let mut state = lock(&self.state);
        while state.stopping {
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state
    }

    /// Timeout path, runs on the driver thread.
    fn expire(&self, generation: u64, events: &EventBridge) {
        let mut state = lock(&self.state);
        if state.stopping || state.active.as_ref().map(|a| a.generation) != Some(generation) {
            debug!("ContinuousSession: timeout raced with stop, nothing to do");
            return;
        }
        let Some(active) = state.active.take() else {
            return;
        };
        state.stopping = true;
        drop(state);

        info!("ContinuousSession: time limit reached, tearing down");
        {
            let _guard = TeardownGuard { slot: self };
            active.teardown();
        }
        events.publish(SessionEvent::Timeout);
    }
}

/// Clears `stopping` and wakes waiters, even if teardown unwinds.
struct TeardownGuard<'a> {
    slot: &'a SessionSlot,
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        lock(&self.slot.state).stopping = false;
        self.slot.idle.notify_all();
    }
}

/// Owns at most one running recognizer + audio driver pair.
pub struct ContinuousSession {
    slot: Arc<SessionSlot>,
    events: EventBridge,
    settings: DriverSettings,
}

impl ContinuousSession {
    pub fn new(events: EventBridge, settings: DriverSettings) -> Self {
        Self {
            slot: Arc::new(SessionSlot::default()),
            events,
            settings,
        }
    }

    /// Start capturing and decoding.
    ///
    /// Waits for a teardown in progress, then checks the state before any
    /// resource is created.
    ///
    /// # Arguments
    /// * `make_recognizer` - Builds the session recognizer (only called from Idle)
    /// * `capture` - Opens the audio source
    /// * `timeout` - Optional lifetime; on expiry the session stops itself
    ///   and publishes [`SessionEvent::Timeout`]
    ///
    /// # Errors
    /// `AlreadyActive`, whatever `make_recognizer` returns, or `CaptureFailed`.
    /// On error the state is Idle and nothing is left allocated.
    pub fn start(
        &self,
        make_recognizer: impl FnOnce() -> Result<Box<dyn Recognizer>>,
        capture: &dyn CaptureProvider,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let mut state = self.slot.wait_idle();
        if state.active.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        let recognizer = make_recognizer()?;
        let mut source = capture
            .open()
            .map_err(|e| SessionError::CaptureFailed(e.to_string()))?;
        source
            .start()
            .map_err(|e| SessionError::CaptureFailed(e.to_string()))?;

        state.generation += 1;
        let generation = state.generation;
        let recognizer: SharedRecognizer = Arc::new(Mutex::new(recognizer));

        let slot: Weak<SessionSlot> = Arc::downgrade(&self.slot);
        let events = self.events.clone();
        let on_expired = Box::new(move || {
            if let Some(slot) = slot.upgrade() {
                slot.expire(generation, &events);
            }
        });

        let driver = AudioDriver::spawn(
            self.settings,
            recognizer.clone(),
            source,
            self.events.clone(),
            timeout,
            on_expired,
        )
        .map_err(|e| SessionError::CaptureFailed(format!("driver thread: {}", e)))?;

        state.active = Some(ActiveSession {
            generation,
            driver,
            recognizer,
        });
        info!(
            "ContinuousSession: started (session {}, timeout: {:?})",
            generation, timeout
        );
        Ok(())
    }

    /// Stop the session and release its recognizer.
    ///
    /// Idempotent. The final result is published as
    /// [`SessionEvent::FinalResult`] before this returns. Returns whether a
    /// session was running.
    pub fn stop(&self) -> bool {
        let mut state = self.slot.wait_idle();
        let Some(active) = state.active.take() else {
            return false;
        };
        state.stopping = true;
        drop(state);

        let _guard = TeardownGuard { slot: &self.slot };
        info!("ContinuousSession: stopping session {}", active.generation);
        active.teardown();
        true
    }

    pub fn state(&self) -> SessionState {
        let state = lock(&self.slot.state);
        if state.stopping {
            SessionState::Stopping
        } else if state.active.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }
}

impl Drop for ContinuousSession {
    fn drop(&mut self) {
        self.stop();
    }
}
