//! engine-bridge - a cross-thread dispatcher between a UI layer and a
//! native engine.
//!
//! The engine runs on its own thread(s) and talks to the UI over a narrow
//! message-passing boundary carrying opaque byte payloads. This crate
//! provides the concurrency core of that boundary:
//!
//! - **Call Gateway** ([`CallGateway`]): one request at a time from the UI,
//!   forwarded to the engine, exactly one response per request, resolved on
//!   whatever thread the engine completes on.
//! - **Event Coalescer** ([`EventCoalescer`]): accumulates engine-emitted
//!   events and flushes them as single ordered batches on a bounded
//!   delay/single-flight schedule - no loss, no reorder, no duplication,
//!   and at most one UI delivery per coalescing window.
//! - **Synchronous Capture Relay** ([`CaptureRelay`]): runs a one-shot job
//!   on the engine's dedicated thread and blocks the caller for the result,
//!   with a bounded wait.
//! - **Channel Lifecycle** ([`Bridge`], [`Channel`]): per-view bind/unbind
//!   plus idempotent, single-flight engine initialization
//!   ([`EngineRuntime`]).
//!
//! # Example
//!
//! ```
//! use engine_bridge::mock::MockEngine;
//! use engine_bridge::{BatchSink, Bridge, BridgeConfig, ChannelId};
//! use std::sync::{Arc, Mutex};
//!
//! struct Collect(Mutex<Vec<String>>);
//! impl BatchSink for Collect {
//!     fn deliver_batch(&self, batch: String) {
//!         self.0.lock().unwrap().push(batch);
//!     }
//! }
//!
//! let engine = MockEngine::new();
//! engine.set_reply("getMapCenter", br#"{"lat":52.3,"lon":4.9}"#.to_vec());
//!
//! let bridge = Bridge::new(engine.clone(), BridgeConfig::default()).unwrap();
//! let sink = Arc::new(Collect(Mutex::new(Vec::new())));
//! let channel = bridge
//!     .attach(ChannelId(1), sink, Box::new(|ready| assert!(ready.is_ok())))
//!     .unwrap();
//!
//! channel.send(
//!     "getMapCenter",
//!     b"",
//!     Box::new(|response| assert!(response.is_ok())),
//! );
//! bridge.detach(ChannelId(1)).unwrap();
//! ```

mod capture;
mod channel;
mod coalescer;
mod config;
mod engine;
mod error;
mod gateway;
pub mod mock;
mod runtime;

pub use capture::{CaptureRelay, CaptureSlot};
pub use channel::{Bridge, Channel};
pub use coalescer::{BatchSink, Event, EventCoalescer, FlushScheduler, SchedulerClosed};
pub use config::{
    BridgeConfig, DEFAULT_CAPTURE_TIMEOUT_MS, DEFAULT_COALESCE_WINDOW_MS,
    DEFAULT_FLUSH_QUEUE_DEPTH,
};
pub use engine::{
    ChannelId, CompletionFn, Engine, EngineJob, EngineStatus, EventFn, LifecycleEvent, ENGINE_OK,
};
pub use error::{BridgeError, BridgeResult};
pub use gateway::{CallGateway, ResponseCallback};
pub use runtime::EngineRuntime;
