//! Event Coalescer - batches high-frequency engine events into
//! low-frequency ordered deliveries.
//!
//! The engine may emit events at arbitrary rate from any of its threads;
//! the UI consumer can only efficiently absorb batched notifications. The
//! coalescer appends each event to a pending batch under a lock and
//! schedules at most one flush at a time, a fixed delay ahead (the
//! coalescing window). The flush drains by swapping the live batch for an
//! empty one and clearing the flush-pending flag in one critical section,
//! then serializes and delivers outside the lock so emitters are never
//! blocked behind UI delivery.
//!
//! Invariant: every event appended before a flush begins appears in that
//! flush's batch or an earlier one - FIFO, no loss, no duplication. The
//! single-flight flush bounds UI message rate to one delivery per window
//! regardless of emission rate.

mod scheduler;

pub use scheduler::{FlushScheduler, SchedulerClosed};

use log::{debug, error, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// One engine-emitted event. Payload bytes are opaque to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub payload: Vec<u8>,
}

/// Consumer of serialized batches - the UI side of the channel.
///
/// Called from the flush scheduler thread, at most once per coalescing
/// window per channel.
pub trait BatchSink: Send + Sync {
    fn deliver_batch(&self, batch: String);
}

/// Wire shape of one event inside a batch: a JSON array of these objects,
/// in emission order.
#[derive(Serialize)]
struct WireEvent<'a> {
    name: &'a str,
    payload: &'a str,
}

struct PendingBatch {
    events: Vec<Event>,
    /// True while a flush task is queued but has not yet drained.
    flush_pending: bool,
    /// Set on channel close; drops late events instead of delivering them.
    closed: bool,
}

/// Accumulates events and flushes them as single ordered batches.
pub struct EventCoalescer {
    name: String,
    window: Duration,
    batch: Mutex<PendingBatch>,
    sink: Arc<dyn BatchSink>,
    /// Weak so a queued flush task (which captures an `Arc<Self>`) can never
    /// hold the scheduler's last owning reference. If it did, the final
    /// scheduler drop would run on the flush thread and self-join.
    scheduler: Weak<FlushScheduler>,
}

impl EventCoalescer {
    #[must_use]
    pub fn new(
        name: String,
        window: Duration,
        sink: Arc<dyn BatchSink>,
        scheduler: Weak<FlushScheduler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            window,
            batch: Mutex::new(PendingBatch {
                events: Vec::new(),
                flush_pending: false,
                closed: false,
            }),
            sink,
            scheduler,
        })
    }

    /// Append one event. Non-blocking for the emitter: delivery happens
    /// later on the scheduler thread. Safe to call from any engine thread.
    pub fn append(self: &Arc<Self>, event: Event) {
        {
            let mut batch = self.batch.lock().unwrap();
            if batch.closed {
                debug!("{}: dropping event '{}' after close", self.name, event.name);
                return;
            }
            batch.events.push(event);
            if batch.flush_pending {
                // A flush is already queued; it will pick this event up.
                return;
            }
            batch.flush_pending = true;
        }

        let Some(scheduler) = self.scheduler.upgrade() else {
            // Scheduler gone (bridge shutting down). Clear the flag so the
            // events are not stranded behind a flush that will never run.
            warn!("{}: could not schedule flush: {}", self.name, SchedulerClosed);
            self.batch.lock().unwrap().flush_pending = false;
            return;
        };
        let this = Arc::clone(self);
        if let Err(e) = scheduler.schedule(self.window, Box::new(move || this.flush())) {
            warn!("{}: could not schedule flush: {e}", self.name);
            self.batch.lock().unwrap().flush_pending = false;
        }
    }

    /// Drain and deliver the pending batch. Runs on the scheduler thread.
    ///
    /// Drain and flag-clear share one critical section with `append`, so an
    /// event lands either in the drained batch or in the fresh one - never
    /// both, never neither.
    fn flush(&self) {
        let drained = {
            let mut batch = self.batch.lock().unwrap();
            batch.flush_pending = false;
            if batch.closed {
                batch.events.clear();
                return;
            }
            std::mem::take(&mut batch.events)
        };
        if drained.is_empty() {
            return;
        }
        if let Some(encoded) = self.encode(&drained) {
            self.sink.deliver_batch(encoded);
        }
    }

    /// Serialize a drained batch. A single undecodable event is dropped
    /// with a log line; it never aborts the rest of the batch.
    fn encode(&self, events: &[Event]) -> Option<String> {
        let mut wire = Vec::with_capacity(events.len());
        for event in events {
            match std::str::from_utf8(&event.payload) {
                Ok(payload) => wire.push(WireEvent {
                    name: &event.name,
                    payload,
                }),
                Err(e) => warn!(
                    "{}: dropping event '{}' with undecodable payload: {e}",
                    self.name, event.name
                ),
            }
        }
        if wire.is_empty() {
            return None;
        }
        match serde_json::to_string(&wire) {
            Ok(encoded) => Some(encoded),
            Err(e) => {
                error!("{}: failed to encode batch of {}: {e}", self.name, wire.len());
                None
            }
        }
    }

    /// Stop delivery. Pending and late events are dropped, not delivered.
    pub fn close(&self) {
        let mut batch = self.batch.lock().unwrap();
        batch.closed = true;
        if !batch.events.is_empty() {
            debug!(
                "{}: discarding {} undelivered events on close",
                self.name,
                batch.events.len()
            );
            batch.events.clear();
        }
    }
}
