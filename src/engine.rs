//! The engine-facing surface of the bridge.
//!
//! The engine is an opaque external collaborator running on its own
//! thread(s). The bridge drives it through the [`Engine`] trait and receives
//! results through two callback shapes: a one-shot completion per call, and
//! a many-shot event callback per bound channel. Both may be invoked from
//! any thread the engine chooses, concurrently with each other.

use crate::error::BridgeResult;
use std::sync::Arc;

/// Identifies one UI-to-engine pairing. Stable for the life of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion code meaning success.
pub const ENGINE_OK: i32 = 0;

/// One-shot completion callback: `(code, payload)`.
///
/// Code [`ENGINE_OK`] means success and `payload` is the result bytes; any
/// other code is an engine error and `payload` carries the human-readable
/// message.
pub type CompletionFn = Box<dyn FnOnce(i32, Vec<u8>) + Send>;

/// Event callback: `(name, payload)`. Invoked arbitrarily many times, from
/// any thread, until the channel is torn down.
pub type EventFn = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// A one-shot job for the engine's dedicated execution thread.
pub type EngineJob = Box<dyn FnOnce() + Send>;

/// Immediate status of an [`Engine::bind`] or [`Engine::call`] dispatch.
///
/// On any status other than `Accepted` the completion callback handed to the
/// engine is dropped without being invoked; the bridge resolves the caller
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Dispatch accepted; the completion callback fires exactly once later.
    Accepted,
    /// Method unknown to the engine.
    NotSupported,
    /// Immediate rejection with an engine error code.
    Failed(i32),
}

/// App lifecycle transitions the engine cares about.
///
/// Only the transitions with engine-visible effect are modeled; the
/// remaining platform callbacks are no-ops and have no representation here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Host surface created or re-created.
    Created,
    /// App moved to the foreground.
    Foreground,
    /// App moved to the background.
    Background,
    /// Host surface destroyed.
    Destroyed,
}

/// The external native engine.
///
/// Implementations wrap the real engine's FFI surface. All methods must be
/// callable from any thread.
pub trait Engine: Send + Sync {
    /// Process-wide initialization. `done` fires exactly once. The bridge
    /// guarantees single-flight: at most one `init` is in progress at a
    /// time (see [`EngineRuntime`](crate::EngineRuntime)).
    fn init(&self, done: CompletionFn);

    /// Bind a view channel. `events` receives unsolicited engine events for
    /// this channel until [`teardown`](Engine::teardown); `done` reports
    /// bind completion.
    fn bind(&self, channel: ChannelId, events: EventFn, done: CompletionFn) -> EngineStatus;

    /// Dispatch one method call on a bound channel.
    fn call(
        &self,
        channel: ChannelId,
        method: &str,
        payload: &[u8],
        done: CompletionFn,
    ) -> EngineStatus;

    /// Release the engine-side view resource for a channel. After this
    /// returns, the engine emits no further events for the channel.
    fn teardown(&self, channel: ChannelId);

    /// Queue a job onto the engine's dedicated execution thread.
    fn run_on_engine_thread(&self, job: EngineJob);

    /// Read the current rendered frame. Only valid when invoked on the
    /// engine's dedicated thread (via [`run_on_engine_thread`]).
    ///
    /// [`run_on_engine_thread`]: Engine::run_on_engine_thread
    fn capture_frame(&self) -> BridgeResult<Vec<u8>>;

    /// Forward an app lifecycle transition to the engine.
    fn notify_lifecycle(&self, event: LifecycleEvent);
}
