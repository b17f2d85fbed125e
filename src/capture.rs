//! Synchronous Capture Relay - run a one-shot job on the engine's dedicated
//! thread and hand the result back to a blocking caller.
//!
//! Some operations (reading a rendered frame) are only valid on the engine's
//! own execution thread, but the caller needs the result synchronously and
//! sits on a different thread. The relay posts the job, the job fills a
//! single-assignment result slot and signals completion, and the caller
//! waits on that signal with a bounded timeout. The engine thread is never
//! blocked waiting on the caller.

use crate::engine::Engine;
use crate::error::{BridgeError, BridgeResult};
use log::{debug, warn};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

enum SlotState {
    Pending,
    Done(BridgeResult<Vec<u8>>),
}

/// Single-assignment result slot with a completion signal.
///
/// Single-writer/single-reader: the job fills it at most once, the caller
/// waits on the condvar. No lock is held across the job itself.
pub struct CaptureSlot {
    state: Mutex<SlotState>,
    done: Condvar,
}

impl CaptureSlot {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SlotState::Pending),
            done: Condvar::new(),
        })
    }

    /// Fill the slot. A second fill is ignored with a warning; the first
    /// result stands.
    pub fn fill(&self, result: BridgeResult<Vec<u8>>) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, SlotState::Done(_)) {
            warn!("CaptureSlot: result already filled, ignoring second fill");
            return;
        }
        *state = SlotState::Done(result);
        self.done.notify_all();
    }

    /// Block until the slot is filled or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> BridgeResult<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if let SlotState::Done(result) = &*state {
                return result.clone();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BridgeError::CaptureTimeout);
            }
            let (guard, _timed_out) = self.done.wait_timeout(state, remaining).unwrap();
            state = guard;
        }
    }
}

/// Blocks a caller on a frame-capture job posted to the engine thread.
pub struct CaptureRelay {
    engine: Arc<dyn Engine>,
    timeout: Duration,
    name: String,
    /// Serializes concurrent captures: a second caller queues behind the
    /// first instead of racing on a slot.
    turn: Mutex<()>,
}

impl CaptureRelay {
    pub(crate) fn new(engine: Arc<dyn Engine>, timeout: Duration, name: String) -> Self {
        Self {
            engine,
            timeout,
            name,
            turn: Mutex::new(()),
        }
    }

    /// Capture the current frame, blocking until the engine thread has
    /// produced it.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::CaptureUnavailable`] - the job could not produce a
    ///   result (invalid dimensions, resource not ready).
    /// - [`BridgeError::CaptureTimeout`] - the job did not complete within
    ///   the configured bound.
    pub fn capture(&self) -> BridgeResult<Vec<u8>> {
        let _turn = self.turn.lock().unwrap();
        let slot = CaptureSlot::new();

        debug!("{}: posting capture job to engine thread", self.name);
        let engine = Arc::clone(&self.engine);
        let result_slot = Arc::clone(&slot);
        self.engine.run_on_engine_thread(Box::new(move || {
            result_slot.fill(engine.capture_frame());
        }));

        slot.wait(self.timeout)
    }
}
