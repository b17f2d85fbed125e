//! Configuration for the bridge.
//!
//! A flat struct deserializable from a configuration file (TOML, JSON,
//! YAML). Every field has a sensible default, so an empty config is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default coalescing window in milliseconds.
///
/// One UI delivery per window regardless of engine emission rate; this is
/// the backpressure bound protecting the UI thread.
pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 10;

/// Default bound on the blocking wait for a capture job.
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 5_000;

/// Default capacity of the flush scheduler's task queue.
pub const DEFAULT_FLUSH_QUEUE_DEPTH: usize = 64;

/// Tuning knobs for the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Delay between scheduling a flush and running it, in milliseconds.
    pub coalesce_window_ms: u64,
    /// Maximum time `capture()` blocks waiting for the engine thread, in
    /// milliseconds.
    pub capture_timeout_ms: u64,
    /// Capacity of the flush scheduler's task queue. Senders block when it
    /// is full (backpressure, not loss).
    pub flush_queue_depth: usize,
    /// Prefix for per-channel debug names used in log lines.
    pub channel_name_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
            capture_timeout_ms: DEFAULT_CAPTURE_TIMEOUT_MS,
            flush_queue_depth: DEFAULT_FLUSH_QUEUE_DEPTH,
            channel_name_prefix: "engine-bridge/channel-".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Coalescing window as a [`Duration`].
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    /// Capture wait bound as a [`Duration`].
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_deserializes_to_defaults() {
        let config: BridgeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.coalesce_window_ms, DEFAULT_COALESCE_WINDOW_MS);
        assert_eq!(config.capture_timeout_ms, DEFAULT_CAPTURE_TIMEOUT_MS);
        assert_eq!(config.flush_queue_depth, DEFAULT_FLUSH_QUEUE_DEPTH);
    }

    #[test]
    fn partial_config_overrides_only_named_fields() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{"coalesce_window_ms": 33}"#).unwrap();
        assert_eq!(config.coalesce_window(), Duration::from_millis(33));
        assert_eq!(config.capture_timeout_ms, DEFAULT_CAPTURE_TIMEOUT_MS);
    }
}
