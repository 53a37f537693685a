//! Observer-driven retuning exercised through real views: a queue with a
//! producer 10x slower than its consumer must grow the producer's batch
//! threshold and leave the consumer's alone.

use batchfifo::{Observer, ObserverConfig, QueueMaster, ViewConfig};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_slow_producer_retunes_views_at_batch_boundaries() {
    let master = Arc::new(QueueMaster::<u64>::new(1024, 1));
    let observer = Arc::new(Observer::new(ObserverConfig::default()));

    let mut producer = master.producer_view(ViewConfig::with_step(1));
    let mut consumer = master.consumer_view(ViewConfig::with_step(4));
    producer.attach_observer(&observer);
    consumer.attach_observer(&observer);

    // Fill all four sample windows with a measured profile: the producer
    // works 10x longer between pushes and its batched enqueues are the
    // expensive ones. The final sample triggers the tuning event.
    for _ in 0..100 {
        observer.record_producer_work(Duration::from_micros(100));
        observer.record_consumer_work(Duration::from_micros(10));
        observer.record_push_cost(Duration::from_micros(500));
    }
    for _ in 0..50 {
        observer.record_pop_cost(Duration::from_micros(5));
    }
    assert_eq!(observer.tuning_events(), 1);

    // Steps are adopted at batch boundaries only: the next full exchange.
    assert_eq!(producer.step(), 1);
    producer.push(0); // step 1: drains immediately, then adopts the retune
    assert_eq!(producer.step(), 50, "producer step must grow");

    assert_eq!(consumer.pop(), Some(0));
    assert!(
        consumer.step() <= 4,
        "consumer step must not grow past its initial value"
    );

    // Stream the rest through to make sure the retuned views still agree.
    for i in 1..=200u64 {
        producer.push(i);
    }
    producer.terminate();

    let mut seen = Vec::new();
    while let Some(v) = consumer.pop() {
        seen.push(v);
    }
    assert_eq!(seen, (1..=200).collect::<Vec<_>>());
}

#[test]
fn test_observer_needs_fresh_windows_between_events() {
    let observer = Observer::new(ObserverConfig {
        producer_window: 8,
        consumer_window: 8,
        push_cost_window: 8,
        pop_cost_window: 8,
    });

    for _ in 0..8 {
        observer.record_producer_work(Duration::from_micros(10));
        observer.record_consumer_work(Duration::from_micros(10));
        observer.record_push_cost(Duration::from_micros(40));
        observer.record_pop_cost(Duration::from_micros(40));
    }
    assert_eq!(observer.tuning_events(), 1);

    // A partial refill must not retune again.
    for _ in 0..4 {
        observer.record_producer_work(Duration::from_micros(10));
        observer.record_consumer_work(Duration::from_micros(10));
        observer.record_push_cost(Duration::from_micros(40));
        observer.record_pop_cost(Duration::from_micros(40));
    }
    assert_eq!(observer.tuning_events(), 1);
}
