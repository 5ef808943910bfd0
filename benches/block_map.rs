//! Block mapping benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use linear_block::block::{BlockAllocator, DefaultBlockAllocator, Fence};
use linear_block::memory::{MemfdConfig, MemoryUsage};

fn allocator() -> DefaultBlockAllocator {
    DefaultBlockAllocator::memfd(MemfdConfig::default().with_name("bench"))
}

fn bench_allocate_and_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_and_map");
    let allocator = allocator();

    for capacity in [4096u32, 64 * 1024, 1024 * 1024] {
        group.throughput(Throughput::Bytes(capacity as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let mut block = allocator
                        .allocate_linear_block(capacity, MemoryUsage::READ_WRITE)
                        .unwrap();
                    let view = block.map().acquire().unwrap();
                    std::hint::black_box(view.base());
                });
            },
        );
    }

    group.finish();
}

fn bench_remap_mapped_block(c: &mut Criterion) {
    let mut block = allocator()
        .allocate_linear_block(1024 * 1024, MemoryUsage::READ_WRITE)
        .unwrap();
    let _ = block.map().acquire().unwrap();

    c.bench_function("remap_mapped_block", |b| {
        b.iter(|| {
            let view = block.map().acquire().unwrap();
            std::hint::black_box(view.data());
        });
    });
}

fn bench_share_and_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("share_and_map");
    let block = allocator()
        .allocate_linear_block(1024 * 1024, MemoryUsage::READ_WRITE)
        .unwrap();

    for size in [256usize, 4096, 256 * 1024] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let shared = block.share(4096, size, Fence::empty());
                let view = shared.map().acquire().unwrap();
                std::hint::black_box(view.as_slice().len());
            });
        });
    }

    group.finish();
}

fn bench_sub_block(c: &mut Criterion) {
    let block = allocator()
        .allocate_linear_block(1024 * 1024, MemoryUsage::READ_WRITE)
        .unwrap();
    let shared = block.share(0, 1024 * 1024, Fence::empty());

    c.bench_function("sub_block_chain", |b| {
        b.iter(|| {
            let sub = shared.sub_block(1000, 500_000).sub_block(100, 1000);
            std::hint::black_box(sub.range());
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_and_map,
    bench_remap_mapped_block,
    bench_share_and_map,
    bench_sub_block
);
criterion_main!(benches);
