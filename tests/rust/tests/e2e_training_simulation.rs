//! End-to-end training simulation test
//!
//! Simulates a training run with:
//! - Model resolution from the zoo
//! - Epoch-end checkpointing with best-only selection and bounded retention
//! - Resuming into a freshly resolved network
//! - Fine-tuning on a different class count through state-dict reconciliation
//! - Loading checkpoints written under a data-parallel wrapper

use anyhow::Result;
use std::path::Path;

use checkpoint::{
    read_header, CheckpointCallback, CheckpointStore, Metrics, OptimizerState, ProcType,
    TrainingState, CHECKPOINT_VERSION,
};
use model_zoo::{diff_states, merge_compatible, Model, ModelRequest, ModelZoo};
use zoo_core::{CheckpointConfig, Device, Epoch, Parameterized, StateDict, MULTI_DEVICE_PREFIX};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("checkpoint=debug,model_zoo=debug")
        .with_test_writer()
        .try_init();
}

/// Simulates a training process
struct SimulatedTrainer {
    model: Model,
    optimizer: OptimizerState,
    proc_type: ProcType,
}

impl SimulatedTrainer {
    fn new(model: Model) -> Self {
        Self {
            model,
            optimizer: OptimizerState::new()
                .with_param("lr", 0.1)
                .with_param("momentum", 0.9),
            proc_type: ProcType::Single,
        }
    }

    fn data_parallel(mut self) -> Self {
        self.proc_type = ProcType::MultiGpu;
        self
    }

    /// Pretends to run an epoch: decays the learning rate and returns the
    /// validation loss
    fn train_epoch(&mut self, loss: f64) -> Metrics {
        if let Some(lr) = self.optimizer.hyper_params.get_mut("lr") {
            *lr *= 0.5;
        }
        [("val_loss".to_string(), loss), ("val_acc".to_string(), 1.0 - loss)]
            .into_iter()
            .collect()
    }
}

impl TrainingState for SimulatedTrainer {
    fn model_name(&self) -> Option<&str> {
        Some(self.model.architecture())
    }

    fn model_state(&self) -> StateDict {
        let state = self.model.state_dict();
        match self.proc_type {
            ProcType::Single => state,
            ProcType::MultiGpu => state
                .iter()
                .map(|(name, t)| (format!("{}{}", MULTI_DEVICE_PREFIX, name), t.clone()))
                .collect(),
        }
    }

    fn optimizer_state(&self) -> OptimizerState {
        self.optimizer.clone()
    }

    fn proc_type(&self) -> ProcType {
        self.proc_type
    }
}

fn checkpoint_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if name.starts_with("epoch_") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[test]
fn test_train_checkpoint_resume() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let zoo = ModelZoo::global();

    let request = ModelRequest::classification("resnet18", 10);
    let mut trainer = SimulatedTrainer::new(zoo.get_model(&request)?);
    let mut callback = CheckpointCallback::new(CheckpointConfig {
        directory: dir.path().join("run"),
        filename: "epoch_{epoch}_loss_{loss}.ckpt".to_string(),
        save_best_only: true,
        max_save: 2,
        verbose: 1,
        best_file: dir.path().join("run").join("model_best.pth.tar"),
        ..Default::default()
    })?;

    let losses = [0.9, 0.7, 0.8, 0.5, 0.6, 0.4];
    let mut written = Vec::new();
    for (epoch, loss) in losses.into_iter().enumerate() {
        let metrics = trainer.train_epoch(loss);
        if let Some(path) = callback.on_epoch_end(epoch as Epoch, &metrics, &trainer)? {
            written.push(path);
        }
    }

    // Improvements at epochs 1, 2, 4 and 6; only the last two survive
    assert_eq!(written.len(), 4);
    assert_eq!(
        checkpoint_files(&dir.path().join("run"))?,
        vec!["epoch_004_loss_0.5000.ckpt", "epoch_006_loss_0.4000.ckpt"]
    );
    assert_eq!(callback.best(), 0.4);

    let header = read_header(callback.store().best_file())?;
    assert_eq!(header.version, CHECKPOINT_VERSION);
    assert_eq!(header.epoch, 6);
    assert_eq!(header.metadata.modelname.as_deref(), Some("resnet18"));

    // Resume into a fresh network of the same architecture
    let mut resumed = zoo.get_model(&request.clone().pretrained(false))?;
    let store = CheckpointStore::new();
    let record = store.load(callback.store().best_file(), Device::Cpu, Some(&mut resumed))?;
    assert_eq!(record.epoch, 6);
    assert_eq!(resumed.state_dict(), trainer.model.state_dict());
    assert_eq!(record.optimizer_state, trainer.optimizer_state());
    assert_eq!(diff_states(&resumed.state_dict(), &record.model_state)?.count(), 0);
    Ok(())
}

#[test]
fn test_fine_tune_on_new_classes() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let zoo = ModelZoo::global();

    let source = SimulatedTrainer::new(zoo.get_model(&ModelRequest::classification("resnet34", 1000))?);
    let path = dir.path().join("imagenet.ckpt");
    let store = CheckpointStore::with_best_file(dir.path().join("best.ckpt"));
    let record = checkpoint::CheckpointRecord::new(90, source.model_state(), source.optimizer_state())
        .with_model_name("resnet34");
    store.save(&record, &path, false)?;

    let mut target = zoo.get_model(&ModelRequest::classification("resnet34", 7).pretrained(false))?;
    let loaded = store.load(&path, Device::Cpu, None)?;

    // Direct load fails on the head shapes
    assert!(target.load_state_dict(&loaded.model_state).is_err());

    let canonical = target.state_dict();
    let mismatched: Vec<String> = diff_states(&canonical, &loaded.model_state)?
        .map(|m| m.name.to_string())
        .collect();
    assert_eq!(mismatched, vec!["fc.weight".to_string(), "fc.bias".to_string()]);

    let (merged, kept) = merge_compatible(&canonical, &loaded.model_state)?;
    assert_eq!(kept, mismatched);
    target.load_state_dict(&merged)?;

    let state = target.state_dict();
    assert_eq!(state.get("fc.weight").map(|t| t.shape().dims().to_vec()), Some(vec![7, 512]));
    assert_eq!(state.get("conv1.conv.weight"), loaded.model_state.get("conv1.conv.weight"));
    Ok(())
}

#[test]
fn test_resume_data_parallel_checkpoint() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let zoo = ModelZoo::global();

    let request = ModelRequest::segmentation("Linknet", 3).pretrained(false);
    let trainer = SimulatedTrainer::new(zoo.get_model(&request)?).data_parallel();
    let mut callback = CheckpointCallback::new(CheckpointConfig {
        directory: dir.path().to_path_buf(),
        filename: "epoch_{epoch}.ckpt".to_string(),
        best_file: dir.path().join("best.ckpt"),
        ..Default::default()
    })?;

    let path = callback
        .on_epoch_end(0, &Metrics::new(), &trainer)?
        .ok_or_else(|| anyhow::anyhow!("checkpoint not written"))?;
    assert_eq!(read_header(&path)?.proc_type(), ProcType::MultiGpu);

    let mut resumed = zoo.get_model(&request)?;
    let record = CheckpointStore::new().load(&path, Device::Cuda(1), Some(&mut resumed))?;
    assert!(record.model_state.keys().all(|k| !k.starts_with(MULTI_DEVICE_PREFIX)));
    assert!(record.model_state.iter().all(|(_, t)| t.device() == Device::Cuda(1)));
    assert_eq!(resumed.state_dict().len(), trainer.model.state_dict().len());
    Ok(())
}
