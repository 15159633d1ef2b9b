use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use s_unzip::{ExtractOptions, Extractor};

#[path = "../tests/common/mod.rs"]
mod common;

use common::ArchiveBuilder;

fn generate_compressible_data(size: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn format_size(size: usize) -> String {
    if size >= 1024 * 1024 {
        format!("{}MB", size / (1024 * 1024))
    } else {
        format!("{}KB", size / 1024)
    }
}

/// `count` deflated entries followed by the target
fn archive_with_target_last(count: usize, entry_size: usize) -> Vec<u8> {
    let filler = generate_compressible_data(entry_size);
    let mut builder = ArchiveBuilder::new();
    for i in 0..count {
        builder = builder.deflated(&format!("filler/{i}.txt"), &filler);
    }
    builder.deflated("data/app.db", &filler).finish()
}

fn bench_extract_one_position(c: &mut Criterion) {
    let entry_size = 64 * 1024;
    let mut group = c.benchmark_group("extract_one_last_entry");

    for count in [1usize, 16, 128] {
        let archive = archive_with_target_last(count, entry_size);
        group.throughput(Throughput::Bytes(archive.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &archive, |b, archive| {
            let extractor = Extractor::default();
            b.iter(|| {
                let data = extractor.extract_one(&archive[..], "*.db").unwrap();
                black_box(data);
            });
        });
    }
    group.finish();
}

fn bench_extract_many(c: &mut Criterion) {
    for size in [100 * 1024, 1024 * 1024] {
        let data = generate_compressible_data(size);
        let archive = ArchiveBuilder::new()
            .deflated("a/one.json", &data)
            .deflated("skip.bin", &data)
            .streamed("b/two.json", &data, true)
            .finish();

        let mut group = c.benchmark_group(format!("extract_many_{}", format_size(size)));
        group.throughput(Throughput::Bytes(2 * size as u64));
        for buffer in [8 * 1024, 64 * 1024] {
            let extractor = Extractor::new(ExtractOptions::default().with_buffer_size(buffer));
            group.bench_with_input(
                BenchmarkId::new("buffer", format_size(buffer)),
                &archive,
                |b, archive| {
                    b.iter(|| {
                        let files = extractor.extract_many(&archive[..], &["*.json"]).unwrap();
                        black_box(files);
                    });
                },
            );
        }
        group.finish();
    }
}

fn bench_extract_chain(c: &mut Criterion) {
    let inner = ArchiveBuilder::new()
        .deflated("app.db", &generate_compressible_data(1024 * 1024))
        .finish();
    let outer = ArchiveBuilder::new()
        .deflated("manifest.json", b"{}")
        .deflated("contents", &inner)
        .finish();

    c.bench_function("extract_chain_nested_1MB", |b| {
        let extractor = Extractor::default();
        b.iter(|| {
            let data = extractor
                .extract_chain(&outer[..], &["contents", "app.db"])
                .unwrap();
            black_box(data);
        });
    });
}

criterion_group!(
    benches,
    bench_extract_one_position,
    bench_extract_many,
    bench_extract_chain
);
criterion_main!(benches);
