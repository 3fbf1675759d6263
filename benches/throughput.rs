/// Throughput benchmarks for the overwrite engine
///
/// Measures full erase cycles (random passes plus the zero pass) on a temp
/// file, and raw block generation for each fill.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use secure_disk_eraser::algorithms::{BlockFill, OverwriteEngine, RandomFill, ZeroFill};
use secure_disk_eraser::DeviceIdentity;
use std::io::Write;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

// Helper to create a temporary file of given size
fn create_temp_file(size_mb: u64) -> std::io::Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    let chunk = vec![0xABu8; 1024 * 1024];
    for _ in 0..size_mb {
        file.write_all(&chunk)?;
    }
    file.flush()?;
    Ok(file)
}

// Full overwrite of a 16 MiB target with different block sizes
fn bench_overwrite_block_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("overwrite_block_sizes");
    group.sample_size(10);

    let size_mb = 16;
    let identity = DeviceIdentity::new("BENCH-0001");
    let cancel = CancellationToken::new();

    for (name, block_size) in [("4KB", 4 * 1024), ("64KB", 64 * 1024), ("1MB", 1024 * 1024)] {
        // one random pass plus the zero pass
        group.throughput(Throughput::Bytes(2 * size_mb * 1024 * 1024));
        group.bench_with_input(BenchmarkId::from_parameter(name), &block_size, |b, &block_size| {
            let engine = OverwriteEngine::new(block_size);
            let temp = create_temp_file(size_mb).unwrap();
            b.iter(|| {
                let mut file = temp.reopen().unwrap();
                let summary = engine
                    .overwrite(&identity, &mut file, 1, &cancel, |event| {
                        black_box(event);
                    })
                    .unwrap();
                black_box(summary);
            });
        });
    }

    group.finish();
}

// Block generation alone, without any I/O
fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_fill");
    let mut buf = vec![0u8; 4096];
    group.throughput(Throughput::Bytes(buf.len() as u64));

    group.bench_function("random", |b| {
        let mut fill = RandomFill::seeded(7);
        b.iter(|| fill.fill(black_box(&mut buf)));
    });
    group.bench_function("zero", |b| {
        let mut fill = ZeroFill;
        b.iter(|| fill.fill(black_box(&mut buf)));
    });

    group.finish();
}

criterion_group!(benches, bench_overwrite_block_sizes, bench_fill);
criterion_main!(benches);
