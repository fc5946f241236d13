//! Benchmarks for checkpoint write and read throughput

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use checkpoint::{CheckpointCallback, CheckpointRecord, CheckpointStore, Metrics, OptimizerState, TrainingState};
use tempfile::TempDir;
use zoo_core::{CheckpointConfig, Device, StateDict, Tensor};

/// State dict of `tensors` dense tensors holding `values` floats each
fn dense_state(tensors: usize, values: usize) -> StateDict {
    (0..tensors)
        .map(|i| {
            let tensor = Tensor::from_vec([values], vec![0.5f32; values]).unwrap();
            (format!("layer{}.weight", i), tensor)
        })
        .collect()
}

struct Snapshot(StateDict);

impl TrainingState for Snapshot {
    fn model_state(&self) -> StateDict {
        self.0.clone()
    }

    fn optimizer_state(&self) -> OptimizerState {
        OptimizerState::new().with_param("lr", 0.01)
    }
}

fn checkpoint_write_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint_write");

    for size in [250_000, 2_500_000, 25_000_000].iter() {
        group.throughput(Throughput::Bytes((*size * 4) as u64));

        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::with_best_file(temp_dir.path().join("best.ckpt"));
        let record = CheckpointRecord::new(1, dense_state(10, size / 10), OptimizerState::new());
        let path = temp_dir.path().join("bench.ckpt");

        group.bench_function(format!("{}MB", size * 4 / 1_000_000), |b| {
            b.iter(|| store.save(&record, &path, false).unwrap());
        });
    }

    group.finish();
}

fn checkpoint_read_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint_read");

    for size in [250_000, 2_500_000, 25_000_000].iter() {
        group.throughput(Throughput::Bytes((*size * 4) as u64));

        // Setup: write checkpoint first
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::with_best_file(temp_dir.path().join("best.ckpt"));
        let path = temp_dir.path().join("bench.ckpt");
        let record = CheckpointRecord::new(1, dense_state(10, size / 10), OptimizerState::new());
        store.save(&record, &path, false).unwrap();

        group.bench_function(format!("{}MB", size * 4 / 1_000_000), |b| {
            b.iter(|| store.load(&path, Device::Cpu, None).unwrap());
        });
    }

    group.finish();
}

fn callback_retention(c: &mut Criterion) {
    let mut group = c.benchmark_group("callback_retention");
    let state = Snapshot(dense_state(4, 10_000));

    for max_save in [1i64, 4, 16].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(max_save),
            max_save,
            |b, &max_save| {
                b.iter(|| {
                    let temp_dir = TempDir::new().unwrap();
                    let mut callback = CheckpointCallback::new(CheckpointConfig {
                        directory: temp_dir.path().to_path_buf(),
                        filename: "epoch_{epoch}.ckpt".to_string(),
                        best_file: temp_dir.path().join("best.ckpt"),
                        max_save,
                        ..Default::default()
                    })
                    .unwrap();

                    for epoch in 0..20 {
                        callback.on_epoch_end(epoch, &Metrics::new(), &state).unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    checkpoint_write_benchmark,
    checkpoint_read_benchmark,
    callback_retention,
);
criterion_main!(benches);
