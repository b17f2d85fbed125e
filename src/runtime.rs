//! Process-scoped engine initialization state.
//!
//! "Is the engine initialized" is modeled as an explicit state machine with
//! a single-flight guard, not ad-hoc boolean checks at call sites. The first
//! caller to need the engine triggers [`Engine::init`]; concurrent callers
//! observe the in-progress round and block on the completion signal rather
//! than re-initializing. At most one init is ever in flight.
//!
//! # Phase transitions
//!
//! ```text
//! NotStarted ──► InProgress ──► Ready
//!                          └──► Failed ──► InProgress   (retry on next attach)
//! ```

use crate::engine::{Engine, ENGINE_OK};
use crate::error::{BridgeError, BridgeResult};
use log::{debug, info, warn};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InitPhase {
    /// No initialization attempted yet.
    NotStarted,
    /// One `Engine::init` call is in flight. Concurrent callers wait.
    InProgress,
    /// Engine initialized; calls may be forwarded.
    Ready,
    /// Last init round failed. The next caller starts a fresh round.
    Failed { code: i32, message: String },
}

/// Single-flight initialization guard shared by every channel of a bridge.
pub struct EngineRuntime {
    phase: Mutex<InitPhase>,
    settled: Condvar,
}

impl EngineRuntime {
    /// Create a runtime in the `NotStarted` phase.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            phase: Mutex::new(InitPhase::NotStarted),
            settled: Condvar::new(),
        })
    }

    /// Whether the engine completed initialization.
    pub fn is_ready(&self) -> bool {
        *self.phase.lock().unwrap() == InitPhase::Ready
    }

    /// Ensure the engine is initialized, triggering at most one
    /// [`Engine::init`] per round.
    ///
    /// The caller that observes `NotStarted` (or a previous `Failed` round)
    /// starts the round; everyone else blocks until the engine's completion
    /// callback settles the phase. Initialization failure surfaces as
    /// [`BridgeError::EngineError`] to every caller of that round; a later
    /// call retries, engine contract permitting.
    pub fn ensure_init(self: &Arc<Self>, engine: &Arc<dyn Engine>) -> BridgeResult<()> {
        {
            let mut phase = self.phase.lock().unwrap();
            match &*phase {
                InitPhase::Ready => return Ok(()),
                InitPhase::InProgress => {
                    debug!("EngineRuntime: init already in flight, waiting");
                    return self.wait_settled(phase);
                }
                InitPhase::NotStarted => {}
                InitPhase::Failed { code, .. } => {
                    info!("EngineRuntime: retrying init after failure (code {code})");
                }
            }
            *phase = InitPhase::InProgress;
        }

        // Lock released: the completion callback may fire synchronously
        // from inside init() and needs the phase lock to settle.
        info!("EngineRuntime: starting engine initialization");
        let this = Arc::clone(self);
        engine.init(Box::new(move |code, payload| this.settle(code, payload)));

        let phase = self.phase.lock().unwrap();
        self.wait_settled(phase)
    }

    /// Block until the current round settles, then map the outcome.
    fn wait_settled(&self, mut phase: MutexGuard<'_, InitPhase>) -> BridgeResult<()> {
        loop {
            match &*phase {
                InitPhase::Ready => return Ok(()),
                InitPhase::Failed { code, message } => {
                    return Err(BridgeError::EngineError {
                        code: *code,
                        message: message.clone(),
                    });
                }
                InitPhase::InProgress | InitPhase::NotStarted => {
                    phase = self.settled.wait(phase).unwrap();
                }
            }
        }
    }

    /// Completion callback target: settle the in-flight round.
    fn settle(&self, code: i32, payload: Vec<u8>) {
        let mut phase = self.phase.lock().unwrap();
        if *phase != InitPhase::InProgress {
            warn!("EngineRuntime: init completion arrived with no round in flight (code {code})");
            return;
        }
        if code == ENGINE_OK {
            info!("EngineRuntime: engine initialized");
            *phase = InitPhase::Ready;
        } else {
            let message = if payload.is_empty() {
                "engine initialization failed".to_string()
            } else {
                String::from_utf8_lossy(&payload).into_owned()
            };
            warn!("EngineRuntime: engine initialization failed: {code}: {message}");
            *phase = InitPhase::Failed { code, message };
        }
        self.settled.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use test_log::test;

    #[test]
    fn runtime_starts_not_ready() {
        let runtime = EngineRuntime::new();
        assert!(!runtime.is_ready());
    }

    #[test]
    fn immediate_init_settles_ready() {
        let runtime = EngineRuntime::new();
        let engine: Arc<dyn Engine> = MockEngine::new();
        runtime.ensure_init(&engine).unwrap();
        assert!(runtime.is_ready());
    }

    #[test]
    fn concurrent_ensure_init_triggers_exactly_one_engine_init() {
        let runtime = EngineRuntime::new();
        let mock = MockEngine::new();
        mock.set_manual_init();
        let engine: Arc<dyn Engine> = mock.clone();

        let ok = Arc::new(AtomicUsize::new(0));
        let mut waiters = Vec::new();
        for _ in 0..4 {
            let runtime = Arc::clone(&runtime);
            let engine = Arc::clone(&engine);
            let ok = Arc::clone(&ok);
            waiters.push(thread::spawn(move || {
                if runtime.ensure_init(&engine).is_ok() {
                    ok.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        // Give every thread time to reach the wait or start the round.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(mock.init_calls(), 1, "attaches must coalesce into one init");

        mock.complete_init(ENGINE_OK, Vec::new());
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(ok.load(Ordering::SeqCst), 4);
        assert!(runtime.is_ready());
    }

    #[test]
    fn failed_init_surfaces_engine_error_and_permits_retry() {
        let runtime = EngineRuntime::new();
        let mock = MockEngine::new();
        mock.set_init_result(7, b"no permits".to_vec());
        let engine: Arc<dyn Engine> = mock.clone();

        let err = runtime.ensure_init(&engine).unwrap_err();
        assert_eq!(
            err,
            BridgeError::EngineError {
                code: 7,
                message: "no permits".to_string()
            }
        );
        assert!(!runtime.is_ready());

        mock.set_init_result(ENGINE_OK, Vec::new());
        runtime.ensure_init(&engine).unwrap();
        assert!(runtime.is_ready());
        assert_eq!(mock.init_calls(), 2);
    }
}
