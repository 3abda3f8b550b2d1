//! Stress tests for the worker message channels
//!
//! Run with: cargo test --release --test stress_message_channel -- --nocapture

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use xferd_core::config::ChannelConfig;
use xferd_core::protocol::{message_bus, JobId, ThroughputUpdate, TransferStatus};
use xferd_core::XferdError;

/// Many producers against a small channel: nothing lost, nothing duplicated
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_many_producers_one_consumer() {
    let num_workers = 64u64;
    let per_worker = 500u64;
    let (producer, mut consumer) = message_bus(&ChannelConfig {
        capacity: 256,
        ..Default::default()
    })
    .unwrap();

    let accepted = Arc::new(AtomicU64::new(0));
    let rejected = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let workers: Vec<_> = (0..num_workers)
        .map(|w| {
            let producer = producer.clone();
            let accepted = accepted.clone();
            let rejected = rejected.clone();
            tokio::spawn(async move {
                let job = JobId::generate();
                for i in 0..per_worker {
                    let msg = TransferStatus::new(job, w * per_worker + i, "ACTIVE");
                    match producer.enqueue(msg) {
                        Ok(()) => {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(XferdError::QueueFull { .. }) => {
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        })
        .collect();
    drop(producer);

    let mut received = Vec::new();
    loop {
        let batch = consumer.drain(128);
        let done = workers.iter().all(|w| w.is_finished());
        received.extend(batch.status.iter().map(|m| m.file_id));
        if batch.is_empty() && done {
            break;
        }
        tokio::time::sleep(Duration::from_micros(200)).await;
    }
    for w in workers {
        w.await.unwrap();
    }
    received.extend(consumer.drain(usize::MAX).status.iter().map(|m| m.file_id));

    let accepted = accepted.load(Ordering::Relaxed);
    let rejected = rejected.load(Ordering::Relaxed);
    println!(
        "accepted={} rejected={} in {:?}",
        accepted,
        rejected,
        start.elapsed()
    );
    assert_eq!(accepted + rejected, num_workers * per_worker);
    assert_eq!(received.len() as u64, accepted);

    received.sort_unstable();
    received.dedup();
    assert_eq!(received.len() as u64, accepted, "No duplicates expected");
}

/// A stalled consumer bounds memory: producers see QueueFull, not growth
#[tokio::test]
async fn stress_stalled_consumer_is_bounded() {
    let (producer, consumer) = message_bus(&ChannelConfig {
        capacity: 1_000,
        ..Default::default()
    })
    .unwrap();

    let job = JobId::generate();
    let mut full = 0;
    for i in 0..10_000 {
        if producer
            .enqueue(ThroughputUpdate::new(job, i, 1.0, i))
            .is_err()
        {
            full += 1;
        }
    }
    assert_eq!(full, 9_000);
    assert_eq!(
        consumer.pending(xferd_core::protocol::MessageKind::Throughput),
        1_000
    );
}
