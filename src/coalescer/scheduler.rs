//! Delayed-flush scheduler - the bridge's stand-in for the UI's execution
//! context.
//!
//! A dedicated background thread receives flush tasks tagged with a
//! deadline, sleeps until the deadline, and runs them. Every task is
//! scheduled with the same fixed delay, so queue order equals deadline order
//! and a plain FIFO channel suffices. Running all flushes on one thread also
//! serializes batch delivery, the same guarantee a single-threaded UI loop
//! gives.

use anyhow::{Context, Result};
use log::{debug, error, warn};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Error scheduling a flush: the scheduler thread has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerClosed;

impl std::fmt::Display for SchedulerClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "flush scheduler thread has shut down")
    }
}

impl std::error::Error for SchedulerClosed {}

struct Scheduled {
    deadline: Instant,
    task: Box<dyn FnOnce() + Send>,
}

/// Handle to the flush thread. Shared by every coalescer of a bridge.
pub struct FlushScheduler {
    tx: Option<SyncSender<Scheduled>>,
    thread: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    /// Spawn the scheduler thread with a bounded task queue.
    ///
    /// Senders block when the queue is full - backpressure, not loss. With
    /// single-flight flushing the queue holds at most one task per live
    /// channel, so `queue_depth` only binds under extreme channel counts.
    pub fn spawn(queue_depth: usize) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(queue_depth);
        let thread = thread::Builder::new()
            .name("bridge-flush".to_string())
            .spawn(move || run(rx))
            .context("failed to spawn flush scheduler thread")?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    /// Enqueue `task` to run after `delay` on the scheduler thread.
    pub fn schedule(
        &self,
        delay: Duration,
        task: Box<dyn FnOnce() + Send>,
    ) -> std::result::Result<(), SchedulerClosed> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(SchedulerClosed);
        };
        let scheduled = Scheduled {
            deadline: Instant::now() + delay,
            task,
        };
        tx.send(scheduled).map_err(|_| SchedulerClosed)
    }
}

fn run(rx: Receiver<Scheduled>) {
    debug!("FlushScheduler: thread started");
    while let Ok(item) = rx.recv() {
        let now = Instant::now();
        if item.deadline > now {
            thread::sleep(item.deadline - now);
        }
        (item.task)();
    }
    debug!("FlushScheduler: all handles dropped, exiting");
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        // Close the queue first so the thread drains and exits.
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            if let Err(e) = thread.join() {
                error!("FlushScheduler: thread panicked: {e:?}");
            }
        } else {
            warn!("FlushScheduler: dropped with no thread handle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use test_log::test;

    #[test]
    fn tasks_run_after_their_delay_in_order() {
        let scheduler = FlushScheduler::spawn(8).unwrap();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let started = Instant::now();

        for i in 0..3u32 {
            let order = Arc::clone(&order);
            scheduler
                .schedule(
                    Duration::from_millis(15),
                    Box::new(move || order.lock().unwrap().push(i)),
                )
                .unwrap();
        }

        thread::sleep(Duration::from_millis(120));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert!(started.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn drop_drains_pending_tasks() {
        let scheduler = FlushScheduler::spawn(8).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let ran = Arc::clone(&ran);
            scheduler
                .schedule(
                    Duration::from_millis(5),
                    Box::new(move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                    }),
                )
                .unwrap();
        }
        drop(scheduler);
        assert_eq!(ran.load(Ordering::SeqCst), 4);
    }
}
