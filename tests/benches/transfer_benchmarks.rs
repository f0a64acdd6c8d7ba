//! # Transfer Engine Benchmarks
//!
//! Hot paths of the upload and download handlers:
//!
//! | Path | Where it runs |
//! |------|---------------|
//! | Block reconciliation | every `putBlocks` and download record |
//! | Task key encode/decode | every store read, write and prefix scan |
//! | Ledger sort | first ordered-manifest request per upload |
//! | Record encoding | every task write |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::seq::SliceRandom;
use shared_types::content_hash;
use transfer_engine::adapters::BincodeRecordSerializer;
use transfer_engine::{
    partition_blocks, BlockLedger, RecordSerializer, TaskKey, TaskPartition, TransferredBlock, UploadRecord,
};

fn hashes(count: usize) -> Vec<String> {
    (0..count).map(|i| content_hash(&(i as u64).to_be_bytes())).collect()
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("block-reconciliation");

    for size in [64, 1_024, 16_384] {
        let existing = hashes(size);
        // Half held, half new.
        let candidates: Vec<String> = existing[size / 2..]
            .iter()
            .cloned()
            .chain(hashes(size + size / 2)[size..].iter().cloned())
            .collect();

        group.throughput(Throughput::Elements(candidates.len() as u64));
        group.bench_with_input(BenchmarkId::new("partition_blocks", size), &size, |b, _| {
            b.iter(|| black_box(partition_blocks(&existing, &candidates)))
        });
    }

    group.finish();
}

fn bench_task_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("task-keys");
    let file_hash = content_hash(b"benchmark file");
    let key = TaskKey::upload("AQr_benchmark_peer", &file_hash, TaskPartition::Doing);
    let encoded = key.encode();

    group.bench_function("encode_upload_key", |b| b.iter(|| black_box(key.encode())));
    group.bench_function("decode_upload_key", |b| b.iter(|| black_box(TaskKey::decode(&encoded))));
    group.bench_function("encode_download_key", |b| {
        b.iter(|| black_box(TaskKey::download("AQr_benchmark_peer", 4_000_000_000, TaskPartition::Done).encode()))
    });

    group.finish();
}

fn shuffled_ledger(size: usize) -> BlockLedger {
    let mut blocks: Vec<TransferredBlock> = hashes(size)
        .into_iter()
        .enumerate()
        .map(|(i, hash)| TransferredBlock::new(hash, i as u64).held_by("AQr_uploader"))
        .collect();
    blocks.shuffle(&mut rand::thread_rng());

    let mut ledger = BlockLedger::new();
    ledger.append(&blocks);
    ledger
}

fn bench_ledger_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger-sort");

    for size in [256, 4_096, 65_536] {
        let ledger = shuffled_ledger(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("sort_by_index", size), &ledger, |b, ledger| {
            b.iter_batched(
                || ledger.clone(),
                |mut ledger| {
                    ledger.sort_by_index().ok();
                    black_box(ledger)
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_record_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("record-encoding");
    let serializer = BincodeRecordSerializer;

    for size in [64, 4_096] {
        let mut record = UploadRecord::new("AQr_uploader", content_hash(b"file"), vec![0xca, 0xfe], 1_700_000_000);
        record.ledger = shuffled_ledger(size);
        let bytes = serializer.encode(&record).unwrap_or_default();

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("encode_upload_record", size), &record, |b, record| {
            b.iter(|| black_box(serializer.encode(record)))
        });
        group.bench_with_input(BenchmarkId::new("decode_upload_record", size), &bytes, |b, bytes| {
            b.iter(|| black_box(serializer.decode::<UploadRecord>(bytes)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reconciliation,
    bench_task_keys,
    bench_ledger_sort,
    bench_record_encoding
);
criterion_main!(benches);
