//! Cross-thread promise tests: one producer streaming indices to consumers
//! in both wait modes, for both step policies.

use stepsync::{
    spawn_registered, DynamicStepPromise, StaticStepPromise, StepRule, ThreadRegistry, WaitMode,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_static_promise_streams_values_across_threads() {
    ThreadRegistry::global().register_current_thread();

    for wait_mode in [WaitMode::Spin, WaitMode::Park] {
        const MAX: usize = 999;

        let (mut setter, promise) =
            StaticStepPromise::<u64>::with_capacity(MAX, 8, 64, wait_mode);

        let producer = spawn_registered("producer", move || {
            for i in 0..MAX {
                setter.set(i, (i as u64) * 3);
            }
            setter.set_final(MAX, (MAX as u64) * 3);
        });

        let mut consumers = Vec::new();
        for c in 0..3 {
            let promise = Arc::clone(&promise);
            consumers.push(spawn_registered(&format!("consumer-{c}"), move || {
                for i in 0..=MAX {
                    assert_eq!(*promise.get(i), (i as u64) * 3, "wrong value at index {i}");
                }
            }));
        }

        producer.join().unwrap();
        for consumer in consumers {
            consumer.join().unwrap();
        }
    }
}

#[test]
fn test_static_promise_every_published_prefix_is_readable() {
    ThreadRegistry::global().register_current_thread();

    const MAX: usize = 499;

    let (mut setter, promise) = StaticStepPromise::<u64>::with_capacity(MAX, 16, 64, WaitMode::Spin);

    let reader = {
        let promise = Arc::clone(&promise);
        spawn_registered("prefix-reader", move || {
            // Whenever the published index moves, every value at or below it
            // must already hold the exact argument of its `set` call.
            loop {
                let published = promise.published_index();
                if published >= 0 {
                    for i in (0..=published as usize).step_by(37) {
                        assert_eq!(*promise.get(i), i as u64);
                    }
                }
                if published == MAX as i64 {
                    break;
                }
                thread::yield_now();
            }
        })
    };

    for i in 0..MAX {
        setter.set(i, i as u64);
    }
    setter.set_final(MAX, MAX as u64);

    reader.join().unwrap();
}

#[test]
fn test_dynamic_promise_consumer_unblock_frees_stranded_reader() {
    ThreadRegistry::global().register_current_thread();

    let (mut setter, promise) = DynamicStepPromise::<u64>::with_capacity(
        100,
        64,
        64,
        WaitMode::Spin,
        StepRule::ConsumerOnly { unblock: true },
    );

    // Fulfil well past what the reader needs, but under the step threshold,
    // so nothing is published.
    for i in 0..=20u64 {
        setter.set(i as usize, i);
    }
    assert_eq!(promise.published_index(), -1);

    let reader = {
        let promise = Arc::clone(&promise);
        spawn_registered("stranded", move || *promise.get(10))
    };

    // Give the reader time to block on unpublished progress, then shrink the
    // step from the consumer side; the retroactive publication must wake it.
    thread::sleep(Duration::from_millis(50));
    promise.set_step(1);

    assert_eq!(reader.join().unwrap(), 10);
}

#[test]
fn test_dynamic_promise_timer_stream_stays_correct() {
    ThreadRegistry::global().register_current_thread();

    const MAX: usize = 599;

    let (mut setter, promise) = DynamicStepPromise::<u64>::with_capacity(
        MAX,
        32,
        64,
        WaitMode::Park,
        StepRule::Timer {
            budget: Duration::from_nanos(1),
            unblock: false,
        },
    );

    let consumer = {
        let promise = Arc::clone(&promise);
        spawn_registered("timer-consumer", move || {
            for i in 0..=MAX {
                assert_eq!(*promise.get(i), i as u64);
            }
        })
    };

    for i in 0..MAX {
        setter.set(i, i as u64);
    }
    setter.set_final(MAX, MAX as u64);

    // The unreachable budget must have shrunk the step to its floor.
    assert_eq!(promise.step(), 1);
    consumer.join().unwrap();
}
