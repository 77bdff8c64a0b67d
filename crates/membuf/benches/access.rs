// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![expect(missing_docs, reason = "Benchmark code")]

use std::alloc::System;
use std::hint::black_box;

use alloc_tracker::{Allocator, Session};
use criterion::{Criterion, criterion_group, criterion_main};
use membuf::{Buffer, BufferExt, ByteOrder, CompositeBuffer, HeapBuffer, NativeBuffer, PlainTestBuffer};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<System> = Allocator::system();

// Large enough that bulk copies are not dominated by call overhead.
const BUFFER_LEN: usize = 16 * 1024;

fn entrypoint(c: &mut Criterion) {
    let allocs = Session::new();

    let mut heap = HeapBuffer::new(BUFFER_LEN);
    let mut native = NativeBuffer::allocate(BUFFER_LEN).unwrap();
    let mut plain = PlainTestBuffer::new(BUFFER_LEN);

    let half = BUFFER_LEN / 2;
    let mut composite = CompositeBuffer::from_children(
        ByteOrder::NATIVE,
        [
            Box::new(HeapBuffer::new(half)) as Box<dyn Buffer>,
            Box::new(HeapBuffer::new(half)),
        ],
    )
    .unwrap();

    let mut group = c.benchmark_group("access");

    group.bench_function("heap_put_get_u64", |b| {
        b.iter(|| {
            heap.put_u64(black_box(8), black_box(0x0102_0304_0506_0708)).unwrap();
            heap.get_u64(black_box(8)).unwrap()
        });
    });

    group.bench_function("native_put_get_u64", |b| {
        b.iter(|| {
            native.put_u64(black_box(8), black_box(0x0102_0304_0506_0708)).unwrap();
            native.get_u64(black_box(8)).unwrap()
        });
    });

    group.bench_function("plain_put_get_u64", |b| {
        b.iter(|| {
            plain.put_u64(black_box(8), black_box(0x0102_0304_0506_0708)).unwrap();
            plain.get_u64(black_box(8)).unwrap()
        });
    });

    group.bench_function("heap_get_u64_foreign", |b| {
        b.iter(|| heap.get_u64_foreign(black_box(8)).unwrap());
    });

    group.bench_function("composite_get_u64_within_child", |b| {
        b.iter(|| composite.get_u64(black_box(8)).unwrap());
    });

    group.bench_function("composite_get_u64_straddling", |b| {
        b.iter(|| composite.get_u64(black_box(half - 3)).unwrap());
    });

    group.bench_function("composite_put_u64_straddling", |b| {
        b.iter(|| composite.put_u64(black_box(half - 3), black_box(u64::MAX)).unwrap());
    });

    group.finish();

    let mut group = c.benchmark_group("copy");

    let allocs_op = allocs.operation("heap_to_native");
    group.bench_function("heap_to_native", |b| {
        b.iter(|| {
            let _span = allocs_op.measure_thread();
            heap.copy_to(0, &mut native, 0, BUFFER_LEN).unwrap();
        });
    });

    let allocs_op = allocs.operation("heap_to_plain");
    group.bench_function("heap_to_plain", |b| {
        b.iter(|| {
            let _span = allocs_op.measure_thread();
            heap.copy_to(0, &mut plain, 0, BUFFER_LEN).unwrap();
        });
    });

    let allocs_op = allocs.operation("plain_to_heap");
    group.bench_function("plain_to_heap", |b| {
        b.iter(|| {
            let _span = allocs_op.measure_thread();
            plain.copy_to(0, &mut heap, 0, BUFFER_LEN).unwrap();
        });
    });

    let allocs_op = allocs.operation("new_slice");
    group.bench_function("new_slice", |b| {
        b.iter(|| {
            let _span = allocs_op.measure_thread();
            heap.new_slice(black_box(16), black_box(64)).unwrap()
        });
    });

    let allocs_op = allocs.operation("slice");
    group.bench_function("slice", |b| {
        b.iter(|| {
            let _span = allocs_op.measure_thread();
            heap.slice(black_box(16), black_box(64)).unwrap().capacity()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
