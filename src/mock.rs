//! Scriptable in-process engine for tests and downstream consumers.
//!
//! `MockEngine` stands in for the native engine: it records every operation
//! in call order, answers calls from a scripted reply table, and runs queued
//! jobs on a real dedicated thread so capture-relay semantics are exercised
//! for real. Initialization can be switched to manual completion to test
//! single-flight coalescing of concurrent attaches.

use crate::engine::{
    ChannelId, CompletionFn, Engine, EngineJob, EngineStatus, EventFn, LifecycleEvent, ENGINE_OK,
};
use crate::error::{BridgeError, BridgeResult};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Operations recorded by the mock, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOp {
    Init,
    Bind(ChannelId),
    Call(ChannelId, String),
    Teardown(ChannelId),
    Lifecycle(LifecycleEvent),
}

struct MockState {
    manual_init: bool,
    init_result: (i32, Vec<u8>),
    pending_init: Option<CompletionFn>,
    replies: HashMap<String, Vec<u8>>,
    failures: HashMap<String, i32>,
    held_methods: HashSet<String>,
    held: Vec<CompletionFn>,
    bind_gate: Option<Receiver<()>>,
    events: HashMap<ChannelId, EventFn>,
    ops: Vec<MockOp>,
    frame: Option<Vec<u8>>,
    drop_jobs: bool,
}

/// A scriptable [`Engine`] with its own dedicated execution thread.
pub struct MockEngine {
    state: Mutex<MockState>,
    init_calls: AtomicUsize,
    jobs: Mutex<Option<Sender<EngineJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MockEngine {
    /// Create a mock with an immediate, successful init and no scripted
    /// replies.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<EngineJob>();
        let worker = thread::Builder::new()
            .name("mock-engine".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
                debug!("MockEngine: worker thread exiting");
            })
            .expect("failed to spawn mock engine thread");

        Arc::new(Self {
            state: Mutex::new(MockState {
                manual_init: false,
                init_result: (ENGINE_OK, Vec::new()),
                pending_init: None,
                replies: HashMap::new(),
                failures: HashMap::new(),
                held_methods: HashSet::new(),
                held: Vec::new(),
                bind_gate: None,
                events: HashMap::new(),
                ops: Vec::new(),
                frame: None,
                drop_jobs: false,
            }),
            init_calls: AtomicUsize::new(0),
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Defer init completion until [`complete_init`](MockEngine::complete_init).
    pub fn set_manual_init(&self) {
        self.state.lock().unwrap().manual_init = true;
    }

    /// Result reported by immediate (non-manual) init.
    pub fn set_init_result(&self, code: i32, payload: Vec<u8>) {
        self.state.lock().unwrap().init_result = (code, payload);
    }

    /// Complete a pending manual init. Panics if none is pending.
    pub fn complete_init(&self, code: i32, payload: Vec<u8>) {
        let done = self
            .state
            .lock()
            .unwrap()
            .pending_init
            .take()
            .expect("no init pending");
        done(code, payload);
    }

    /// Script a successful reply for `method`.
    pub fn set_reply(&self, method: &str, payload: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(method.to_string(), payload);
    }

    /// Script an engine-error completion for `method`.
    pub fn set_failure(&self, method: &str, code: i32) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(method.to_string(), code);
    }

    /// Block the next `bind` call (slow-engine simulation) until the
    /// returned sender fires or is dropped.
    pub fn gate_next_bind(&self) -> Sender<()> {
        let (tx, rx) = mpsc::channel();
        self.state.lock().unwrap().bind_gate = Some(rx);
        tx
    }

    /// Accept `method` but hold its completion until
    /// [`complete_held`](MockEngine::complete_held).
    pub fn hold_method(&self, method: &str) {
        self.state
            .lock()
            .unwrap()
            .held_methods
            .insert(method.to_string());
    }

    /// Fire the oldest held completion. Returns false if none is held.
    pub fn complete_held(&self, code: i32, payload: Vec<u8>) -> bool {
        let done = {
            let mut state = self.state.lock().unwrap();
            if state.held.is_empty() {
                return false;
            }
            state.held.remove(0)
        };
        done(code, payload);
        true
    }

    /// Frame bytes returned by [`Engine::capture_frame`]; `None` makes
    /// capture fail with [`BridgeError::CaptureUnavailable`].
    pub fn set_frame(&self, frame: Option<Vec<u8>>) {
        self.state.lock().unwrap().frame = frame;
    }

    /// Silently discard queued engine-thread jobs (stuck-engine simulation).
    pub fn set_drop_jobs(&self, drop_jobs: bool) {
        self.state.lock().unwrap().drop_jobs = drop_jobs;
    }

    /// Emit an event on a bound channel, as the engine would from one of its
    /// own threads. Returns false if the channel is not bound (event lost,
    /// matching real-engine teardown semantics).
    pub fn emit(&self, channel: ChannelId, name: &str, payload: &[u8]) -> bool {
        let events = {
            let state = self.state.lock().unwrap();
            state.events.get(&channel).cloned()
        };
        match events {
            Some(events) => {
                events(name, payload);
                true
            }
            None => {
                debug!("MockEngine: dropping event '{name}' for unbound channel {channel}");
                false
            }
        }
    }

    /// Number of `init` calls observed.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of the recorded operation log.
    pub fn ops(&self) -> Vec<MockOp> {
        self.state.lock().unwrap().ops.clone()
    }
}

impl Engine for MockEngine {
    fn init(&self, done: CompletionFn) {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let immediate = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(MockOp::Init);
            if state.manual_init {
                if state.pending_init.is_some() {
                    warn!("MockEngine: replacing an unanswered pending init");
                }
                state.pending_init = Some(done);
                None
            } else {
                Some((done, state.init_result.clone()))
            }
        };
        if let Some((done, (code, payload))) = immediate {
            done(code, payload);
        }
    }

    fn bind(&self, channel: ChannelId, events: EventFn, done: CompletionFn) -> EngineStatus {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(MockOp::Bind(channel));
            state.events.insert(channel, events);
            state.bind_gate.take()
        };
        if let Some(gate) = gate {
            // Waits off the state lock so the mock stays observable.
            let _ = gate.recv();
        }
        done(ENGINE_OK, b"view-ready".to_vec());
        EngineStatus::Accepted
    }

    fn call(
        &self,
        channel: ChannelId,
        method: &str,
        _payload: &[u8],
        done: CompletionFn,
    ) -> EngineStatus {
        // Each arm owns the callback it fires; completions run outside the
        // state lock.
        enum Action {
            Held,
            Fail(i32, CompletionFn),
            Reply(Vec<u8>, CompletionFn),
            Unknown,
        }
        let action = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(MockOp::Call(channel, method.to_string()));
            if state.held_methods.contains(method) {
                state.held.push(done);
                Action::Held
            } else if let Some(&code) = state.failures.get(method) {
                Action::Fail(code, done)
            } else if let Some(reply) = state.replies.get(method) {
                Action::Reply(reply.clone(), done)
            } else {
                Action::Unknown
            }
        };
        match action {
            Action::Held => EngineStatus::Accepted,
            Action::Fail(code, done) => {
                done(code, format!("mock failure for {method}").into_bytes());
                EngineStatus::Accepted
            }
            Action::Reply(payload, done) => {
                done(ENGINE_OK, payload);
                EngineStatus::Accepted
            }
            Action::Unknown => EngineStatus::NotSupported,
        }
    }

    fn teardown(&self, channel: ChannelId) {
        let mut state = self.state.lock().unwrap();
        state.ops.push(MockOp::Teardown(channel));
        state.events.remove(&channel);
    }

    fn run_on_engine_thread(&self, job: EngineJob) {
        if self.state.lock().unwrap().drop_jobs {
            debug!("MockEngine: dropping queued job");
            return;
        }
        let jobs = self.jobs.lock().unwrap();
        if let Some(tx) = jobs.as_ref() {
            if tx.send(job).is_err() {
                warn!("MockEngine: worker thread gone, job dropped");
            }
        }
    }

    fn capture_frame(&self) -> BridgeResult<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .frame
            .clone()
            .ok_or(BridgeError::CaptureUnavailable)
    }

    fn notify_lifecycle(&self, event: LifecycleEvent) {
        self.state.lock().unwrap().ops.push(MockOp::Lifecycle(event));
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        // Closing the job channel lets the worker drain and exit.
        self.jobs.lock().unwrap().take();
        if let Some(worker) = self.worker.lock().unwrap().take() {
            if worker.join().is_err() {
                warn!("MockEngine: worker thread panicked");
            }
        }
    }
}
