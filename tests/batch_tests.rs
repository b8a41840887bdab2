use opskit::{BatchConfig, BatchHandler, BatchProcessor, ErrorCode, OpsKitError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn counting_handler(batches: Arc<AtomicU32>) -> BatchHandler<u32, u32> {
    Arc::new(move |items: Vec<u32>| {
        let batches = Arc::clone(&batches);
        Box::pin(async move {
            batches.fetch_add(1, Ordering::SeqCst);
            Ok(items.into_iter().map(|i| i + 100).collect())
        })
    })
}

#[tokio::test]
async fn full_batch_processes_immediately() {
    let batches = Arc::new(AtomicU32::new(0));
    let config = BatchConfig::builder()
        .batch_size(3)
        .batch_timeout(Duration::from_secs(60))
        .build();
    let processor = BatchProcessor::new(config, counting_handler(Arc::clone(&batches)));
    processor.start();

    let started = Instant::now();
    let (a, b, c) = tokio::join!(processor.add(1), processor.add(2), processor.add(3));

    // Flushed by size, nowhere near the 60s timeout
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(a.unwrap(), 101);
    assert_eq!(b.unwrap(), 102);
    assert_eq!(c.unwrap(), 103);
    assert_eq!(batches.load(Ordering::SeqCst), 1);

    processor.stop().await;
}

#[tokio::test]
async fn partial_batch_processes_after_timeout() {
    let batches = Arc::new(AtomicU32::new(0));
    let config = BatchConfig::builder()
        .batch_size(10)
        .batch_timeout(Duration::from_millis(40))
        .build();
    let processor = BatchProcessor::new(config, counting_handler(Arc::clone(&batches)));
    processor.start();

    let (a, b) = tokio::join!(processor.add(1), processor.add(2));

    assert_eq!(a.unwrap(), 101);
    assert_eq!(b.unwrap(), 102);
    assert_eq!(batches.load(Ordering::SeqCst), 1);

    processor.stop().await;
}

#[tokio::test]
async fn items_arriving_during_processing_form_a_new_batch() {
    let batches = Arc::new(AtomicU32::new(0));
    let batches_clone = Arc::clone(&batches);
    // Slow handler so a second add overlaps the in-flight flush
    let handler: BatchHandler<u32, u32> = Arc::new(move |items: Vec<u32>| {
        let batches = Arc::clone(&batches_clone);
        Box::pin(async move {
            batches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(40)).await;
            Ok(items)
        })
    });
    let config = BatchConfig::builder()
        .batch_size(1)
        .batch_timeout(Duration::from_secs(60))
        .build();
    let processor = Arc::new(BatchProcessor::new(config, handler));
    processor.start();

    let first = tokio::spawn({
        let processor = Arc::clone(&processor);
        async move { processor.add(1).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = tokio::spawn({
        let processor = Arc::clone(&processor);
        async move { processor.add(2).await }
    });

    assert_eq!(first.await.unwrap().unwrap(), 1);
    assert_eq!(second.await.unwrap().unwrap(), 2);
    assert_eq!(batches.load(Ordering::SeqCst), 2);

    processor.stop().await;
}

#[tokio::test]
async fn manual_flush_processes_partial_batch() {
    let batches = Arc::new(AtomicU32::new(0));
    let config = BatchConfig::builder()
        .batch_size(100)
        .batch_timeout(Duration::from_secs(60))
        .build();
    let processor = Arc::new(BatchProcessor::new(
        config,
        counting_handler(Arc::clone(&batches)),
    ));
    processor.start();

    let queued = tokio::spawn({
        let processor = Arc::clone(&processor);
        async move { processor.add(9).await }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(processor.queue_len(), 1);
    processor.flush().await.unwrap();

    assert_eq!(queued.await.unwrap().unwrap(), 109);
    assert_eq!(processor.queue_len(), 0);

    processor.stop().await;
}

#[tokio::test]
async fn adds_racing_stop_all_resolve() {
    let batches = Arc::new(AtomicU32::new(0));
    let config = BatchConfig::builder()
        .batch_size(4)
        .batch_timeout(Duration::from_millis(5))
        .build();
    let processor = Arc::new(BatchProcessor::new(
        config,
        counting_handler(Arc::clone(&batches)),
    ));
    processor.start();

    let adds: Vec<_> = (0..50)
        .map(|i| {
            let processor = Arc::clone(&processor);
            tokio::spawn(async move { processor.add(i).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(2)).await;
    processor.stop().await;

    // Every add terminates: with the handler's result or BatchClosed,
    // never a hang on an orphaned waiter
    for (i, add) in adds.into_iter().enumerate() {
        let result = tokio::time::timeout(Duration::from_secs(5), add)
            .await
            .expect("add resolved")
            .unwrap();
        match result {
            Ok(value) => assert_eq!(value, i as u32 + 100),
            Err(error) => assert_eq!(error.code, ErrorCode::BatchClosed),
        }
    }
}

#[tokio::test]
async fn handler_failure_rejects_every_item_in_the_batch() {
    let handler: BatchHandler<u32, u32> = Arc::new(|_items| {
        Box::pin(async { Err(OpsKitError::unavailable("sink rejected the batch")) })
    });
    let config = BatchConfig::builder()
        .batch_size(3)
        .batch_timeout(Duration::from_secs(60))
        .build();
    let processor = BatchProcessor::new(config, handler);
    processor.start();

    let (a, b, c) = tokio::join!(processor.add(1), processor.add(2), processor.add(3));

    for result in [a, b, c] {
        let error = result.unwrap_err();
        assert_eq!(error.code, ErrorCode::Unavailable);
        assert_eq!(error.message, "sink rejected the batch");
    }

    processor.stop().await;
}
