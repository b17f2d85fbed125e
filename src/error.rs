//! Error types for the bridge.
//!
//! Every failure surfaced to the UI caller is a [`BridgeError`] attached to
//! the specific request or capture that triggered it. Errors never abort the
//! event coalescer's batching loop; a single malformed event is logged and
//! dropped at event granularity instead.

/// Error returned to the UI on a request, attach, or capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The engine runtime has not completed initialization. The call was not
    /// forwarded.
    EngineNotReady,
    /// Method unrecognized by the engine. Distinct from failure so the UI
    /// can branch on "feature absent" vs "failed".
    NotSupported,
    /// Engine-reported failure with the engine's numeric code and a
    /// human-readable message.
    EngineError { code: i32, message: String },
    /// The capture job could not produce a result (invalid dimensions,
    /// resource not ready).
    CaptureUnavailable,
    /// The capture job did not complete within the configured bound.
    CaptureTimeout,
    /// The channel was already detached when the operation ran.
    ChannelClosed,
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::EngineNotReady => write!(f, "engine not initialized"),
            BridgeError::NotSupported => write!(f, "method not supported by engine"),
            BridgeError::EngineError { code, message } => {
                write!(f, "engine error {code}: {message}")
            }
            BridgeError::CaptureUnavailable => write!(f, "capture result unavailable"),
            BridgeError::CaptureTimeout => write!(f, "timed out waiting for capture job"),
            BridgeError::ChannelClosed => write!(f, "channel is closed"),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
