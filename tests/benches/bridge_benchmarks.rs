//! # Bridge Benchmarks
//!
//! | Component | Operation | Target |
//! |-----------|-----------|--------|
//! | BoundedMailbox | put at capacity (evicting) | < 1µs |
//! | HandlerRegistry | dispatch to N handlers | < 1µs per handler |
//! | fan_out | one inbound message to three keys | < 1µs |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gw_01_telemetry_link::fan_out;
use shared_bus::{BoundedMailbox, HandlerRegistry};
use shared_types::LinkMessage;
use std::time::Duration;

fn sample_message(seq: u64) -> LinkMessage {
    LinkMessage::new(33, "GLOBAL_POSITION_INT")
        .with_field("lat", 473_977_418)
        .with_field("lon", 85_455_939)
        .with_field("seq", seq)
}

fn bench_mailbox(c: &mut Criterion) {
    let mut group = c.benchmark_group("mailbox");

    for capacity in [16_usize, 200, 2_000] {
        let mailbox = BoundedMailbox::new(capacity);
        for seq in 0..capacity as u64 {
            mailbox.put(sample_message(seq));
        }
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("put_evicting", capacity),
            &capacity,
            |b, _| {
                let mut seq = 0_u64;
                b.iter(|| {
                    seq += 1;
                    black_box(mailbox.put(sample_message(seq)))
                })
            },
        );
    }

    group.bench_function("drain_200", |b| {
        let mailbox = BoundedMailbox::new(200);
        b.iter(|| {
            for seq in 0..200 {
                mailbox.put(sample_message(seq));
            }
            black_box(mailbox.drain_all())
        })
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    for handlers in [1_usize, 8, 64] {
        let registry: HandlerRegistry<LinkMessage> = HandlerRegistry::new();
        for _ in 0..handlers {
            registry.register("33", |m: &LinkMessage| {
                black_box(m.msg_id);
                Ok(())
            }, None);
        }
        let message = sample_message(1);
        group.throughput(Throughput::Elements(handlers as u64));
        group.bench_with_input(BenchmarkId::new("dispatch", handlers), &handlers, |b, _| {
            b.iter(|| black_box(registry.dispatch("33", &message)))
        });
    }

    let filtered: HandlerRegistry<LinkMessage> = HandlerRegistry::new();
    filtered.register("33", |_: &LinkMessage| Ok(()), Some(Duration::from_secs(60)));
    let message = sample_message(1);
    filtered.dispatch("33", &message);
    group.bench_function("dispatch_suppressed", |b| {
        b.iter(|| black_box(filtered.dispatch("33", &message)))
    });

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    c.bench_function("fan_out", |b| {
        b.iter(|| black_box(fan_out(sample_message(7))))
    });
}

criterion_group!(benches, bench_mailbox, bench_dispatch, bench_fan_out);
criterion_main!(benches);
