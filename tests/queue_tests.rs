//! Behavioral tests for the UDP intake queue: admission order, drop
//! accounting, backpressure signaling, and drain semantics.

use sensebridge::config::types::{RateLimitSettings, UdpQueueSettings};
use sensebridge::queue::UdpQueueHandler;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn remote() -> SocketAddr {
    "127.0.0.1:9999".parse().unwrap()
}

fn settings() -> UdpQueueSettings {
    UdpQueueSettings {
        max_concurrent: 1,
        max_size: 10,
        backpressure_threshold_percent: 80,
        rate_limit: RateLimitSettings::default(),
        max_message_size_bytes: 65507,
        handler_timeout: Duration::from_secs(5),
        queue_full_log_throttle: Duration::from_secs(10),
    }
}

#[tokio::test]
async fn test_three_messages_back_to_back_all_process() {
    let queue = UdpQueueHandler::new("user_events", settings());

    for _ in 0..3 {
        let accepted = queue.add_message(vec![0u8; 64], remote(), |_m, _r| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<(), String>(())
        });
        assert!(accepted);
    }

    queue.wait_for_empty().await;

    let snapshot = queue.metrics();
    assert_eq!(snapshot.messages_received, 3);
    assert_eq!(snapshot.messages_queued, 3);
    assert_eq!(snapshot.messages_processed, 3);
    assert_eq!(snapshot.messages_failed, 0);
}

#[tokio::test]
async fn test_size_drop_changes_only_size_counter() {
    let mut cfg = settings();
    cfg.max_message_size_bytes = 100;
    let queue = UdpQueueHandler::new("user_events", cfg);

    let before = queue.metrics();
    let accepted = queue.add_message(vec![0u8; 101], remote(), |_m, _r| async {
        Ok::<(), String>(())
    });
    assert!(!accepted);

    let after = queue.metrics();
    assert_eq!(after.messages_received, before.messages_received + 1);
    assert_eq!(after.dropped_size, before.dropped_size + 1);
    assert_eq!(after.messages_queued, before.messages_queued);
    assert_eq!(after.dropped_rate_limit, before.dropped_rate_limit);
    assert_eq!(after.dropped_queue_full, before.dropped_queue_full);
    assert_eq!(after.messages_processed, before.messages_processed);
    assert_eq!(after.messages_failed, before.messages_failed);
}

#[tokio::test]
async fn test_rate_limited_burst_admits_exactly_the_window() {
    let mut cfg = settings();
    cfg.rate_limit = RateLimitSettings {
        enable: true,
        max_messages_per_minute: 10,
        violation_log_throttle: Duration::from_secs(60),
    };
    let queue = UdpQueueHandler::new("user_events", cfg);

    let handled = Arc::new(AtomicUsize::new(0));
    let mut accepted = 0;
    for _ in 0..25 {
        let handled = Arc::clone(&handled);
        if queue.add_message(vec![0u8; 16], remote(), move |_m, _r| async move {
            handled.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        }) {
            accepted += 1;
        }
    }
    queue.wait_for_empty().await;

    // Exactly the window is admitted; every rejection is counted even though
    // the warning log is throttled to one per interval.
    assert_eq!(accepted, 10);
    assert_eq!(handled.load(Ordering::SeqCst), 10);

    let snapshot = queue.metrics();
    assert_eq!(snapshot.dropped_rate_limit, 15);
    assert_eq!(snapshot.messages_queued, 10);
}

#[tokio::test]
async fn test_queue_full_drops_incoming_and_recovers() {
    let mut cfg = settings();
    cfg.max_size = 3;
    let queue = UdpQueueHandler::new("user_events", cfg);

    let gate = Arc::new(tokio::sync::Notify::new());

    for _ in 0..3 {
        let gate = Arc::clone(&gate);
        assert!(queue.add_message(vec![0u8; 16], remote(), move |_m, _r| async move {
            gate.notified().await;
            Ok::<(), String>(())
        }));
    }

    // Queue holds queued + in-flight items; the fourth is rejected.
    assert!(!queue.add_message(vec![0u8; 16], remote(), |_m, _r| async {
        Ok::<(), String>(())
    }));
    assert_eq!(queue.metrics().dropped_queue_full, 1);

    // Drain and verify the queue accepts again.
    for _ in 0..3 {
        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    queue.wait_for_empty().await;

    assert!(queue.add_message(vec![0u8; 16], remote(), |_m, _r| async {
        Ok::<(), String>(())
    }));
    queue.wait_for_empty().await;
    assert_eq!(queue.metrics().messages_processed, 4);
}

#[tokio::test]
async fn test_backpressure_flag_follows_utilization() {
    let mut cfg = settings();
    cfg.max_size = 4;
    cfg.backpressure_threshold_percent = 50;
    let queue = UdpQueueHandler::new("user_events", cfg);

    let gate = Arc::new(tokio::sync::Notify::new());

    assert!(!queue.backpressure_active());
    assert!(!queue.metrics().backpressure_active);

    for _ in 0..2 {
        let gate = Arc::clone(&gate);
        assert!(queue.add_message(vec![0u8; 16], remote(), move |_m, _r| async move {
            gate.notified().await;
            Ok::<(), String>(())
        }));
    }
    assert!(queue.backpressure_active());

    for _ in 0..4 {
        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    queue.wait_for_empty().await;
    assert!(!queue.backpressure_active());
}

#[tokio::test]
async fn test_failing_handlers_do_not_stall_the_queue() {
    let queue = UdpQueueHandler::new("log_events", settings());

    for i in 0..10 {
        let accepted = queue.add_message(vec![0u8; 16], remote(), move |_m, _r| async move {
            if i % 2 == 0 {
                Err::<(), String>(format!("handler failure {i}"))
            } else {
                Ok(())
            }
        });
        assert!(accepted);
    }
    queue.wait_for_empty().await;

    let snapshot = queue.metrics();
    assert_eq!(snapshot.messages_processed, 5);
    assert_eq!(snapshot.messages_failed, 5);
    assert_eq!(snapshot.queue_depth, 0);
}
