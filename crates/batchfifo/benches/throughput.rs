use batchfifo::{QueueMaster, SmartFifo, ViewConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;

const MESSAGES: u64 = 100_000;

fn bench_smart_fifo(c: &mut Criterion) {
    let mut group = c.benchmark_group("smart_fifo");
    group.throughput(Throughput::Elements(MESSAGES));

    for &chunk in &[16usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("spsc_chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let fifo = Arc::new(SmartFifo::<u64>::new(chunk));
                let producer = fifo.producer();
                let mut consumer = fifo.consumer(chunk);

                let feeder = thread::spawn(move || {
                    for i in 0..MESSAGES {
                        producer.push(i);
                    }
                    producer.terminate();
                });

                let mut sum = 0u64;
                loop {
                    let mut elements = consumer.pop();
                    if elements.is_end_of_stream() {
                        break;
                    }
                    elements.for_each(|v| sum += *v);
                }
                feeder.join().unwrap();
                black_box(sum)
            });
        });
    }

    group.finish();
}

fn bench_ringed_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("ringed_queue");
    group.throughput(Throughput::Elements(MESSAGES));

    for &step in &[1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::new("spsc_step", step), &step, |b, &step| {
            b.iter(|| {
                let master = Arc::new(QueueMaster::<u64>::new(4096, 1));
                let mut producer = master.producer_view(ViewConfig::with_step(step));
                let mut consumer = master.consumer_view(ViewConfig::with_step(step));

                let feeder = thread::spawn(move || {
                    for i in 0..MESSAGES {
                        producer.push(i);
                    }
                    producer.terminate();
                });

                let mut sum = 0u64;
                while let Some(v) = consumer.pop() {
                    sum += v;
                }
                feeder.join().unwrap();
                black_box(sum)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_smart_fifo, bench_ringed_queue);
criterion_main!(benches);
