//! Channel lifecycle - binding views to the engine and tearing them down.
//!
//! A [`Channel`] is one bound UI-to-engine communication session, one per
//! active view. The [`Bridge`] owns every channel, the shared flush
//! scheduler standing in for the UI's execution context, and the
//! process-scoped init state. Attach guarantees the engine is initialized
//! first (single-flight, see [`EngineRuntime`]); detach unregisters the
//! event path before releasing the engine-side view resource, so no event
//! is ever delivered for a torn-down channel.

use crate::capture::CaptureRelay;
use crate::coalescer::{BatchSink, Event, EventCoalescer, FlushScheduler};
use crate::config::BridgeConfig;
use crate::engine::{ChannelId, CompletionFn, Engine, EngineStatus, EventFn, LifecycleEvent};
use crate::error::{BridgeError, BridgeResult};
use crate::gateway::{completion_result, CallGateway, ResponseCallback, ResponseSlot};
use crate::runtime::EngineRuntime;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Unbound,
    Bound,
    Closed,
}

/// One bound UI-to-engine pairing.
pub struct Channel {
    id: ChannelId,
    name: String,
    state: Mutex<ChannelState>,
    gateway: CallGateway,
    relay: CaptureRelay,
    coalescer: Arc<EventCoalescer>,
    engine: Arc<dyn Engine>,
}

impl Channel {
    /// Stable identifier of this channel.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Debug name used in log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Forward one request to the engine. See [`CallGateway::send`].
    ///
    /// Resolves [`BridgeError::ChannelClosed`] if the channel has been
    /// detached.
    pub fn send(&self, method: &str, payload: &[u8], resolve: ResponseCallback) {
        if *self.state.lock().unwrap() != ChannelState::Bound {
            resolve(Err(BridgeError::ChannelClosed));
            return;
        }
        self.gateway.send(method, payload, resolve);
    }

    /// Capture the current frame, blocking the caller. See
    /// [`CaptureRelay::capture`].
    pub fn capture(&self) -> BridgeResult<Vec<u8>> {
        if *self.state.lock().unwrap() != ChannelState::Bound {
            return Err(BridgeError::ChannelClosed);
        }
        self.relay.capture()
    }

    /// `Bound -> Closed`. Stops event delivery before releasing the
    /// engine-side view resource, in that order.
    fn close(&self) {
        {
            let mut state = self.state.lock().unwrap();
            match *state {
                ChannelState::Closed => return,
                ChannelState::Unbound => {
                    // Bind never completed; nothing is registered engine-side.
                    *state = ChannelState::Closed;
                    return;
                }
                ChannelState::Bound => *state = ChannelState::Closed,
            }
        }
        self.coalescer.close();
        self.engine.teardown(self.id);
        info!("{}: closed", self.name);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Root object: owns the engine handle, the init state, the flush
/// scheduler, and every live channel.
pub struct Bridge {
    engine: Arc<dyn Engine>,
    runtime: Arc<EngineRuntime>,
    scheduler: Arc<FlushScheduler>,
    channels: Mutex<HashMap<ChannelId, Arc<Channel>>>,
    config: BridgeConfig,
}

impl Bridge {
    /// Create a bridge for `engine`, spawning the flush scheduler thread.
    /// Engine initialization is deferred until the first attach.
    pub fn new(engine: Arc<dyn Engine>, config: BridgeConfig) -> anyhow::Result<Self> {
        let scheduler = Arc::new(FlushScheduler::spawn(config.flush_queue_depth)?);
        Ok(Self {
            engine,
            runtime: EngineRuntime::new(),
            scheduler,
            channels: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// Whether the engine completed initialization.
    pub fn is_engine_ready(&self) -> bool {
        self.runtime.is_ready()
    }

    /// Bind a view channel: `Unbound -> Bound`.
    ///
    /// Initializes the engine first if needed; concurrent attaches coalesce
    /// into a single init call and wait for its completion. `on_ready`
    /// receives the engine's bind completion payload exactly once. Attaching
    /// an id that is already bound returns the existing channel.
    pub fn attach(
        &self,
        id: ChannelId,
        sink: Arc<dyn BatchSink>,
        on_ready: ResponseCallback,
    ) -> BridgeResult<Arc<Channel>> {
        self.runtime.ensure_init(&self.engine)?;

        let name = format!("{}{}", self.config.channel_name_prefix, id);
        let coalescer = EventCoalescer::new(
            name.clone(),
            self.config.coalesce_window(),
            sink,
            Arc::downgrade(&self.scheduler),
        );
        let channel = Arc::new(Channel {
            id,
            name: name.clone(),
            state: Mutex::new(ChannelState::Unbound),
            gateway: CallGateway::new(
                Arc::clone(&self.engine),
                Arc::clone(&self.runtime),
                id,
                name.clone(),
            ),
            relay: CaptureRelay::new(
                Arc::clone(&self.engine),
                self.config.capture_timeout(),
                name.clone(),
            ),
            coalescer: Arc::clone(&coalescer),
            engine: Arc::clone(&self.engine),
        });

        let events: EventFn = {
            let coalescer = Arc::clone(&coalescer);
            Arc::new(move |event_name: &str, payload: &[u8]| {
                // The engine signals "no event" with an empty name.
                if event_name.is_empty() {
                    return;
                }
                coalescer.append(Event {
                    name: event_name.to_string(),
                    payload: payload.to_vec(),
                });
            })
        };

        // Reserve the id before binding so the blocking engine call runs
        // outside the channels lock and never stalls other attaches.
        let existing = {
            let mut channels = self.channels.lock().unwrap();
            match channels.get(&id) {
                Some(existing) => Some(Arc::clone(existing)),
                None => {
                    channels.insert(id, Arc::clone(&channel));
                    None
                }
            }
        };
        if let Some(existing) = existing {
            debug!("{}: already attached, reusing", existing.name);
            on_ready(Ok(Vec::new()));
            return Ok(existing);
        }

        let slot = ResponseSlot::new(on_ready);
        let done: CompletionFn = {
            let slot = Arc::clone(&slot);
            Box::new(move |code, payload| {
                slot.resolve(completion_result(code, payload, "view bind failed"));
            })
        };

        match self.engine.bind(id, events, done) {
            EngineStatus::Accepted => {}
            EngineStatus::NotSupported => {
                warn!("{name}: engine does not support view binding");
                self.channels.lock().unwrap().remove(&id);
                slot.resolve(Err(BridgeError::NotSupported));
                return Err(BridgeError::NotSupported);
            }
            EngineStatus::Failed(code) => {
                let err = BridgeError::EngineError {
                    code,
                    message: "view bind rejected by engine".to_string(),
                };
                self.channels.lock().unwrap().remove(&id);
                slot.resolve(Err(err.clone()));
                return Err(err);
            }
        }

        {
            let mut state = channel.state.lock().unwrap();
            match *state {
                ChannelState::Unbound => *state = ChannelState::Bound,
                // Detached while the bind was in flight; undo the
                // engine-side registration.
                ChannelState::Closed => {
                    drop(state);
                    self.engine.teardown(id);
                    return Err(BridgeError::ChannelClosed);
                }
                ChannelState::Bound => {}
            }
        }
        info!("{name}: bound");
        Ok(channel)
    }

    /// Unbind a view channel: `Bound -> Closed`. In-flight requests may
    /// resolve with an error or be discarded; no response is guaranteed
    /// after detach begins.
    pub fn detach(&self, id: ChannelId) -> BridgeResult<()> {
        let channel = self
            .channels
            .lock()
            .unwrap()
            .remove(&id)
            .ok_or(BridgeError::ChannelClosed)?;
        channel.close();
        Ok(())
    }

    /// Core-level dispatch, answered locally without contacting the engine.
    pub fn dispatch_core(&self, method: &str, _payload: &[u8]) -> BridgeResult<Vec<u8>> {
        match method {
            "getPlatformVersion" => Ok(platform_version().into_bytes()),
            _ => Err(BridgeError::NotSupported),
        }
    }

    /// Forward an app lifecycle transition.
    ///
    /// `Created` triggers the same idempotent init path as attach (and
    /// blocks until it settles). `Foreground`/`Background` are forwarded
    /// only once the engine is initialized. `Destroyed` is a no-op beyond
    /// channel teardown, which happens through [`detach`](Bridge::detach).
    pub fn notify_lifecycle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Created => {
                if let Err(e) = self.runtime.ensure_init(&self.engine) {
                    warn!("Bridge: init on surface creation failed: {e}");
                }
            }
            LifecycleEvent::Foreground | LifecycleEvent::Background => {
                if self.runtime.is_ready() {
                    self.engine.notify_lifecycle(event);
                } else {
                    debug!("Bridge: engine not ready, skipping {event:?}");
                }
            }
            LifecycleEvent::Destroyed => {}
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        // Close remaining channels before the scheduler thread winds down.
        let channels: Vec<_> = self.channels.lock().unwrap().drain().collect();
        for (_, channel) in channels {
            channel.close();
        }
    }
}

fn platform_version() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}
