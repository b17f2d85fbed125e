//! Bridge lifecycle: single-flight initialization under concurrent
//! attaches, and the full attach / send / capture / detach path.

use engine_bridge::mock::MockEngine;
use engine_bridge::{BatchSink, Bridge, BridgeConfig, BridgeError, ChannelId, ENGINE_OK};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use test_log::test;

struct NullSink;

impl BatchSink for NullSink {
    fn deliver_batch(&self, _batch: String) {}
}

struct CollectSink(Mutex<Vec<String>>);

impl BatchSink for CollectSink {
    fn deliver_batch(&self, batch: String) {
        self.0.lock().unwrap().push(batch);
    }
}

#[test]
fn concurrent_attaches_coalesce_into_one_engine_init() {
    let mock = MockEngine::new();
    mock.set_manual_init();
    let bridge = Arc::new(Bridge::new(mock.clone(), BridgeConfig::default()).unwrap());

    let mut attachers = Vec::new();
    for id in 0..4u64 {
        let bridge = Arc::clone(&bridge);
        attachers.push(thread::spawn(move || {
            bridge
                .attach(ChannelId(id), Arc::new(NullSink), Box::new(|_| {}))
                .map(|channel| channel.id())
        }));
    }

    // Let every attacher reach the init wait.
    thread::sleep(Duration::from_millis(30));
    assert_eq!(mock.init_calls(), 1, "attaches must share one init round");
    mock.complete_init(ENGINE_OK, Vec::new());

    for attacher in attachers {
        assert!(attacher.join().unwrap().is_ok());
    }
    assert!(bridge.is_engine_ready());
}

#[test]
fn attach_send_capture_detach_happy_path() {
    let mock = MockEngine::new();
    mock.set_reply("setMapStyle", b"applied".to_vec());
    mock.set_frame(Some(b"frame".to_vec()));
    let bridge = Bridge::new(
        mock.clone(),
        BridgeConfig {
            coalesce_window_ms: 5,
            ..BridgeConfig::default()
        },
    )
    .unwrap();

    let (ready_tx, ready_rx) = mpsc::channel();
    let channel = bridge
        .attach(
            ChannelId(7),
            Arc::new(CollectSink(Mutex::new(Vec::new()))),
            Box::new(move |ready| ready_tx.send(ready).unwrap()),
        )
        .unwrap();
    assert_eq!(ready_rx.recv().unwrap(), Ok(b"view-ready".to_vec()));

    let (tx, rx) = mpsc::channel();
    channel.send("setMapStyle", b"dark", Box::new(move |r| tx.send(r).unwrap()));
    assert_eq!(rx.recv().unwrap(), Ok(b"applied".to_vec()));

    assert_eq!(channel.capture(), Ok(b"frame".to_vec()));

    bridge.detach(ChannelId(7)).unwrap();
    assert_eq!(channel.capture(), Err(BridgeError::ChannelClosed));
}

#[test]
fn failed_init_fails_attach_and_suppresses_lifecycle_forwarding() {
    let mock = MockEngine::new();
    mock.set_init_result(12, b"license expired".to_vec());
    let bridge = Bridge::new(mock.clone(), BridgeConfig::default()).unwrap();

    let err = bridge
        .attach(ChannelId(1), Arc::new(NullSink), Box::new(|_| {}))
        .err()
        .unwrap();
    assert_eq!(
        err,
        BridgeError::EngineError {
            code: 12,
            message: "license expired".to_string()
        }
    );
    assert!(!bridge.is_engine_ready());

    bridge.notify_lifecycle(engine_bridge::LifecycleEvent::Background);
    // Only the failed init was recorded; no lifecycle op reached the engine.
    assert_eq!(mock.init_calls(), 1);
    assert_eq!(mock.ops().len(), 1);
}

#[test]
fn capture_timeout_is_bounded() {
    let mock = MockEngine::new();
    mock.set_frame(Some(b"unreachable".to_vec()));
    mock.set_drop_jobs(true);
    let bridge = Bridge::new(
        mock.clone(),
        BridgeConfig {
            capture_timeout_ms: 50,
            ..BridgeConfig::default()
        },
    )
    .unwrap();

    let channel = bridge
        .attach(ChannelId(2), Arc::new(NullSink), Box::new(|_| {}))
        .unwrap();

    let started = std::time::Instant::now();
    assert_eq!(channel.capture(), Err(BridgeError::CaptureTimeout));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(5), "wait must be bounded");
}
