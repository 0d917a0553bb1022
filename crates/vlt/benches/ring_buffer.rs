// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ring Buffer Benchmark
//!
//! Measures the startup buffer hot paths:
//! - push throughput for typical frame sizes
//! - push/pull steady state (daemon keeping up)
//! - lazy growth cost while filling a dynamic buffer
//!
//! Every log message written before the daemon connects goes through this
//! buffer, so push cost directly bounds early-boot logging throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vlt::DltBuffer;

fn bench_push_pull_steady_state(c: &mut Criterion) {
    let frame = vec![0xA5u8; 256];
    c.bench_function("ring_push_pull_256b", |b| {
        let mut buf = DltBuffer::new_static(64 * 1024).unwrap();
        let mut out = vec![0u8; 2048];
        b.iter(|| {
            buf.push(black_box(&frame)).unwrap();
            let n = buf.pull(&mut out).unwrap();
            black_box(n);
        });
    });
}

fn bench_push_until_full(c: &mut Criterion) {
    let frame = vec![0x5Au8; 1024];
    c.bench_function("ring_fill_static_64k", |b| {
        b.iter(|| {
            let mut buf = DltBuffer::new_static(64 * 1024).unwrap();
            while buf.push(black_box(&frame)).is_ok() {}
            black_box(buf.message_count());
        });
    });
}

fn bench_dynamic_growth(c: &mut Criterion) {
    let frame = vec![0x42u8; 512];
    c.bench_function("ring_grow_4k_to_64k", |b| {
        b.iter(|| {
            let mut buf = DltBuffer::new_dynamic(4 * 1024, 64 * 1024, 4 * 1024).unwrap();
            while buf.push(black_box(&frame)).is_ok() {}
            black_box(buf.total_size());
        });
    });
}

fn bench_wraparound(c: &mut Criterion) {
    // keep the buffer nearly full so every push wraps
    let frame = vec![0x77u8; 700];
    c.bench_function("ring_wraparound_700b", |b| {
        let mut buf = DltBuffer::new_static(4 * 1024).unwrap();
        let mut out = vec![0u8; 1024];
        for _ in 0..4 {
            buf.push(&frame).unwrap();
        }
        b.iter(|| {
            let n = buf.pull(&mut out).unwrap();
            buf.push(black_box(&frame)).unwrap();
            black_box(n);
        });
    });
}

criterion_group!(
    benches,
    bench_push_pull_steady_state,
    bench_push_until_full,
    bench_dynamic_growth,
    bench_wraparound
);
criterion_main!(benches);
