//! Call Gateway - synchronous request/response exchange with the engine.
//!
//! The gateway accepts one request at a time from the UI, forwards it into
//! the engine's execution context, and resolves exactly one response per
//! request. Resolution may happen on any thread the engine chooses, so the
//! UI-facing half is safe to invoke from anywhere; the caller's `resolve`
//! callback must be prepared for that.

use crate::engine::{ChannelId, CompletionFn, Engine, EngineStatus, ENGINE_OK};
use crate::error::{BridgeError, BridgeResult};
use crate::runtime::EngineRuntime;
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One-shot response callback handed in by the UI caller.
pub type ResponseCallback = Box<dyn FnOnce(BridgeResult<Vec<u8>>) + Send>;

/// Single-assignment resolution slot.
///
/// The engine's completion callback and the gateway's immediate-rejection
/// path race for the same `resolve`; whichever takes the slot first wins and
/// the other finds it empty. Exactly one resolution per request.
pub(crate) struct ResponseSlot(Mutex<Option<ResponseCallback>>);

impl ResponseSlot {
    pub(crate) fn new(resolve: ResponseCallback) -> Arc<Self> {
        Arc::new(Self(Mutex::new(Some(resolve))))
    }

    pub(crate) fn resolve(&self, result: BridgeResult<Vec<u8>>) {
        if let Some(resolve) = self.0.lock().unwrap().take() {
            resolve(result);
        }
    }
}

/// Map an engine completion `(code, payload)` to a bridge result.
///
/// On success the payload is the result bytes; on failure it carries the
/// engine's human-readable message.
pub(crate) fn completion_result(code: i32, payload: Vec<u8>, fallback: &str) -> BridgeResult<Vec<u8>> {
    if code == ENGINE_OK {
        return Ok(payload);
    }
    let message = if payload.is_empty() {
        fallback.to_string()
    } else {
        String::from_utf8_lossy(&payload).into_owned()
    };
    Err(BridgeError::EngineError { code, message })
}

/// Forwards UI requests to the engine, one response per request.
pub struct CallGateway {
    engine: Arc<dyn Engine>,
    runtime: Arc<EngineRuntime>,
    channel: ChannelId,
    name: String,
    in_flight: Arc<AtomicBool>,
}

impl CallGateway {
    pub(crate) fn new(
        engine: Arc<dyn Engine>,
        runtime: Arc<EngineRuntime>,
        channel: ChannelId,
        name: String,
    ) -> Self {
        Self {
            engine,
            runtime,
            channel,
            name,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Forward one request. Non-blocking: `resolve` is invoked exactly once,
    /// possibly synchronously, possibly from an engine thread.
    ///
    /// If the engine runtime is not ready the call resolves with
    /// [`BridgeError::EngineNotReady`] without contacting the engine.
    /// Issuing a second call before the first resolves is a caller error:
    /// it is logged and still forwarded, with undefined relative resolution
    /// order.
    pub fn send(&self, method: &str, payload: &[u8], resolve: ResponseCallback) {
        if method.is_empty() {
            warn!("{}: rejecting call with empty method name", self.name);
            resolve(Err(BridgeError::NotSupported));
            return;
        }
        if !self.runtime.is_ready() {
            resolve(Err(BridgeError::EngineNotReady));
            return;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!(
                "{}: '{method}' issued before the previous call resolved",
                self.name
            );
        }

        let slot = ResponseSlot::new(resolve);
        let done: CompletionFn = {
            let slot = Arc::clone(&slot);
            let in_flight = Arc::clone(&self.in_flight);
            Box::new(move |code, payload| {
                in_flight.store(false, Ordering::Release);
                slot.resolve(completion_result(code, payload, "engine call failed"));
            })
        };

        match self.engine.call(self.channel, method, payload, done) {
            EngineStatus::Accepted => {}
            EngineStatus::NotSupported => {
                self.in_flight.store(false, Ordering::Release);
                slot.resolve(Err(BridgeError::NotSupported));
            }
            EngineStatus::Failed(code) => {
                self.in_flight.store(false, Ordering::Release);
                slot.resolve(Err(BridgeError::EngineError {
                    code,
                    message: "call rejected by engine".to_string(),
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockEngine, MockOp};
    use std::sync::mpsc;
    use test_log::test;

    fn ready_gateway(mock: &Arc<MockEngine>) -> CallGateway {
        let engine: Arc<dyn Engine> = mock.clone();
        let runtime = EngineRuntime::new();
        runtime.ensure_init(&engine).unwrap();
        CallGateway::new(engine, runtime, ChannelId(9), "gateway-9".to_string())
    }

    fn send_and_wait(gateway: &CallGateway, method: &str, payload: &[u8]) -> BridgeResult<Vec<u8>> {
        let (tx, rx) = mpsc::channel();
        gateway.send(
            method,
            payload,
            Box::new(move |result| tx.send(result).unwrap()),
        );
        rx.recv().unwrap()
    }

    #[test]
    fn uninitialized_runtime_rejects_without_engine_contact() {
        let mock = MockEngine::new();
        let engine: Arc<dyn Engine> = mock.clone();
        let gateway = CallGateway::new(
            engine,
            EngineRuntime::new(),
            ChannelId(1),
            "gateway-1".to_string(),
        );

        let (tx, rx) = mpsc::channel();
        gateway.send(
            "getPlatformVersion",
            b"",
            Box::new(move |result| tx.send(result).unwrap()),
        );
        assert_eq!(rx.recv().unwrap(), Err(BridgeError::EngineNotReady));
        assert!(mock.ops().is_empty(), "engine must not be contacted");
    }

    #[test]
    fn unknown_method_resolves_not_supported() {
        let mock = MockEngine::new();
        let gateway = ready_gateway(&mock);
        assert_eq!(
            send_and_wait(&gateway, "unknownMethod", b"{}"),
            Err(BridgeError::NotSupported)
        );
    }

    #[test]
    fn known_method_resolves_reply_payload() {
        let mock = MockEngine::new();
        mock.set_reply("getZoom", b"14".to_vec());
        let gateway = ready_gateway(&mock);
        assert_eq!(send_and_wait(&gateway, "getZoom", b""), Ok(b"14".to_vec()));
        assert!(mock
            .ops()
            .contains(&MockOp::Call(ChannelId(9), "getZoom".to_string())));
    }

    #[test]
    fn engine_failure_code_maps_to_engine_error_with_message() {
        let mock = MockEngine::new();
        mock.set_failure("setStyle", -3);
        let gateway = ready_gateway(&mock);
        assert_eq!(
            send_and_wait(&gateway, "setStyle", b"dark"),
            Err(BridgeError::EngineError {
                code: -3,
                message: "mock failure for setStyle".to_string()
            })
        );
    }

    #[test]
    fn empty_method_name_is_rejected_locally() {
        let mock = MockEngine::new();
        let gateway = ready_gateway(&mock);
        assert_eq!(
            send_and_wait(&gateway, "", b""),
            Err(BridgeError::NotSupported)
        );
        // Only the init op; the empty call never reached the engine.
        assert_eq!(mock.ops(), vec![MockOp::Init]);
    }

    #[test]
    fn each_request_resolves_exactly_once() {
        let mock = MockEngine::new();
        mock.hold_method("slowOp");
        let gateway = ready_gateway(&mock);

        let (tx, rx) = mpsc::channel();
        gateway.send(
            "slowOp",
            b"",
            Box::new(move |result| tx.send(result).unwrap()),
        );
        assert!(rx.try_recv().is_err(), "must not resolve before completion");

        assert!(mock.complete_held(ENGINE_OK, b"done".to_vec()));
        assert_eq!(rx.recv().unwrap(), Ok(b"done".to_vec()));
        // A stray second completion has nothing to resolve.
        assert!(!mock.complete_held(ENGINE_OK, Vec::new()));
    }

    #[test]
    fn pipelined_second_call_still_resolves_independently() {
        let mock = MockEngine::new();
        mock.hold_method("first");
        mock.set_reply("second", b"ok".to_vec());
        let gateway = ready_gateway(&mock);

        let (tx1, rx1) = mpsc::channel();
        gateway.send("first", b"", Box::new(move |r| tx1.send(r).unwrap()));

        // Caller error: second call while the first is outstanding. Both
        // must still resolve, each exactly once.
        let (tx2, rx2) = mpsc::channel();
        gateway.send("second", b"", Box::new(move |r| tx2.send(r).unwrap()));
        assert_eq!(rx2.recv().unwrap(), Ok(b"ok".to_vec()));

        assert!(mock.complete_held(ENGINE_OK, b"late".to_vec()));
        assert_eq!(rx1.recv().unwrap(), Ok(b"late".to_vec()));
    }
}
