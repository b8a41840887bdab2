use opskit::{DebounceHandler, Debouncer, Throttle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn recording_handler(
    invocations: Arc<AtomicU32>,
    values: Arc<Mutex<Vec<u32>>>,
) -> DebounceHandler<u32> {
    Arc::new(move |value| {
        let invocations = Arc::clone(&invocations);
        let values = Arc::clone(&values);
        Box::pin(async move {
            invocations.fetch_add(1, Ordering::SeqCst);
            values.lock().push(value);
        })
    })
}

#[tokio::test]
async fn burst_collapses_to_single_invocation_with_last_value() {
    let invocations = Arc::new(AtomicU32::new(0));
    let values = Arc::new(Mutex::new(Vec::new()));
    let debouncer = Debouncer::new(
        Duration::from_millis(40),
        recording_handler(Arc::clone(&invocations), Arc::clone(&values)),
    );

    for i in 1..=10 {
        assert!(debouncer.call(i));
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(*values.lock(), vec![10]);
}

#[tokio::test]
async fn large_burst_accepts_every_call_and_keeps_the_newest_value() {
    let invocations = Arc::new(AtomicU32::new(0));
    let values = Arc::new(Mutex::new(Vec::new()));
    let debouncer = Debouncer::new(
        Duration::from_millis(40),
        recording_handler(Arc::clone(&invocations), Arc::clone(&values)),
    );

    // No yields between calls, so the burst outpaces the drain task
    for i in 1..=500 {
        assert!(debouncer.call(i));
    }

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    assert_eq!(*values.lock(), vec![500]);
}

#[tokio::test]
async fn quiet_gaps_produce_separate_invocations() {
    let invocations = Arc::new(AtomicU32::new(0));
    let values = Arc::new(Mutex::new(Vec::new()));
    let debouncer = Debouncer::new(
        Duration::from_millis(20),
        recording_handler(Arc::clone(&invocations), Arc::clone(&values)),
    );

    debouncer.call(1);
    tokio::time::sleep(Duration::from_millis(60)).await;
    debouncer.call(2);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    assert_eq!(*values.lock(), vec![1, 2]);
}

#[tokio::test]
async fn stopping_flushes_the_pending_value() {
    let invocations = Arc::new(AtomicU32::new(0));
    let values = Arc::new(Mutex::new(Vec::new()));
    let mut debouncer = Debouncer::new(
        Duration::from_secs(60),
        recording_handler(Arc::clone(&invocations), Arc::clone(&values)),
    );

    debouncer.call(7);
    tokio::time::sleep(Duration::from_millis(20)).await;
    debouncer.stop();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(*values.lock(), vec![7]);
    assert!(!debouncer.call(8));
}

#[tokio::test]
async fn throttle_passes_once_per_window() {
    let throttle = Throttle::new(Duration::from_millis(50));
    let executed = AtomicU32::new(0);

    for _ in 0..5 {
        throttle.run(|| executed.fetch_add(1, Ordering::SeqCst));
    }
    assert_eq!(executed.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(70)).await;

    for _ in 0..5 {
        throttle.run(|| executed.fetch_add(1, Ordering::SeqCst));
    }
    assert_eq!(executed.load(Ordering::SeqCst), 2);
}
