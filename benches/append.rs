use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use commitlog::{Config, Log, Record, SegmentConfig};
use tempfile::tempdir_in;

struct Params {
    payload_size: usize,
    total_appends: u64,
}

fn bench_append(c: &mut Criterion, label: &str, params: Params) {
    let id = BenchmarkId::from_parameter(format!("payload={}B n={}", params.payload_size, params.total_appends));
    c.benchmark_group(label)
        .sample_size(10)
        .sampling_mode(SamplingMode::Flat)
        .throughput(Throughput::Elements(params.total_appends))
        .bench_with_input(id, &params, |b, params| {
            let tmp = tempdir_in(".").unwrap();
            let config = Config::default().with_segment(
                SegmentConfig::default()
                    .with_max_store_bytes(64 * 1024 * 1024)
                    .with_max_index_bytes(4 * 1024 * 1024),
            );
            let log = Log::open(tmp.path(), config).unwrap();
            let payload = vec![0u8; params.payload_size];

            b.iter(|| {
                for _ in 0..params.total_appends {
                    log.append(&Record::new(payload.clone())).unwrap();
                }
                log.flush().unwrap();
            })
        });
}

fn bench_append_small(c: &mut Criterion) {
    bench_append(
        c,
        "append/small",
        Params {
            payload_size: 64,
            total_appends: 1_000,
        },
    );
}

fn bench_append_large(c: &mut Criterion) {
    bench_append(
        c,
        "append/large",
        Params {
            payload_size: 16 * 1024,
            total_appends: 1_000,
        },
    );
}

fn bench_append_sync_on_append(c: &mut Criterion) {
    let id = BenchmarkId::from_parameter("sync_on_append n=200");
    c.benchmark_group("append/sync_on_append")
        .sample_size(10)
        .sampling_mode(SamplingMode::Flat)
        .throughput(Throughput::Elements(200))
        .bench_with_input(id, &200u64, |b, &total_appends| {
            let tmp = tempdir_in(".").unwrap();
            let config = Config::default().with_segment(
                SegmentConfig::default()
                    .with_max_store_bytes(64 * 1024 * 1024)
                    .with_max_index_bytes(4 * 1024 * 1024)
                    .with_sync_on_append(true),
            );
            let log = Log::open(tmp.path(), config).unwrap();
            let payload = vec![0u8; 256];

            b.iter(|| {
                for _ in 0..total_appends {
                    log.append(&Record::new(payload.clone())).unwrap();
                }
            })
        });
}

criterion_group!(benches, bench_append_small, bench_append_large, bench_append_sync_on_append);
criterion_main!(benches);
