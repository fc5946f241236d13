//! Periodic checkpoint callback
//!
//! Invoked synchronously at every epoch boundary. Writes the live training
//! state through a [`CheckpointStore`], optionally only when the monitored
//! metric improves, and keeps at most `max_save` files on disk.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use zoo_core::config::expand_home;
use zoo_core::{CheckpointConfig, Epoch, Result};

use crate::record::{CheckpointRecord, TrainingState};
use crate::store::CheckpointStore;

/// Metric values reported at the end of an epoch
pub type Metrics = HashMap<String, f64>;

/// Observable callback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackState {
    /// Between epochs
    Idle,

    /// Writing a checkpoint
    Checkpointing,
}

/// Bounded FIFO of written checkpoint paths
#[derive(Debug, Clone, Default)]
pub struct RetentionWindow {
    paths: VecDeque<PathBuf>,
    capacity: Option<usize>,
}

impl RetentionWindow {
    /// Window holding at most `capacity` paths, unbounded for `None`
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            paths: VecDeque::new(),
            capacity,
        }
    }

    /// Records a write and returns the paths that fell out of the window,
    /// oldest first. A path already present moves to the back.
    pub fn push(&mut self, path: PathBuf) -> Vec<PathBuf> {
        let Some(capacity) = self.capacity else {
            return Vec::new();
        };
        self.paths.retain(|p| *p != path);
        self.paths.push_back(path);

        let mut evicted = Vec::new();
        while self.paths.len() > capacity {
            if let Some(oldest) = self.paths.pop_front() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

/// Epoch-end checkpoint writer
#[derive(Debug)]
pub struct CheckpointCallback {
    config: CheckpointConfig,
    directory: PathBuf,
    store: CheckpointStore,
    best: f64,
    window: RetentionWindow,
    state: CallbackState,
}

impl CheckpointCallback {
    /// Validates `config` and prepares an idle callback
    pub fn new(config: CheckpointConfig) -> Result<Self> {
        config.validate()?;
        let directory = expand_home(&config.directory);
        let store = CheckpointStore::with_best_file(config.best_file.clone());
        let window = RetentionWindow::new(config.retention());
        Ok(Self {
            config,
            directory,
            store,
            best: f64::INFINITY,
            window,
            state: CallbackState::Idle,
        })
    }

    pub fn state(&self) -> CallbackState {
        self.state
    }

    /// Best monitored value seen so far, `+inf` before the first write in
    /// best-only mode
    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn window(&self) -> &RetentionWindow {
        &self.window
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Path for the checkpoint of zero-based `epoch`
    pub fn checkpoint_path(&self, epoch: Epoch, metrics: &Metrics) -> PathBuf {
        let loss = match metrics.get(&self.config.monitor) {
            Some(value) => format!("{:.4}", value),
            None => "nan".to_string(),
        };
        let file = self
            .config
            .filename
            .replace("{epoch}", &format!("{:03}", epoch + 1))
            .replace("{loss}", &loss);
        self.directory.join(file)
    }

    /// Handles the end of zero-based `epoch`. Returns the written path, if
    /// any.
    pub fn on_epoch_end(
        &mut self,
        epoch: Epoch,
        metrics: &Metrics,
        training: &dyn TrainingState,
    ) -> Result<Option<PathBuf>> {
        let path = self.checkpoint_path(epoch, metrics);

        if !self.config.save_best_only {
            self.report(epoch, &path, None);
            self.write(epoch, &path, training, false)?;
            return Ok(Some(path));
        }

        let Some(&current) = metrics.get(&self.config.monitor) else {
            debug!(monitor = %self.config.monitor, "Monitored metric missing, skipping checkpoint");
            return Ok(None);
        };
        if current < self.best {
            self.report(epoch, &path, Some(current));
            self.write(epoch, &path, training, true)?;
            self.best = current;
            Ok(Some(path))
        } else {
            debug!(epoch = epoch + 1, current, best = self.best, "No improvement");
            Ok(None)
        }
    }

    fn write(&mut self, epoch: Epoch, path: &Path, training: &dyn TrainingState, is_best: bool) -> Result<()> {
        self.state = CallbackState::Checkpointing;

        let mut record = CheckpointRecord::new(epoch + 1, training.model_state(), training.optimizer_state())
            .with_proc_type(training.proc_type());
        if let Some(name) = training.model_name() {
            record = record.with_model_name(name);
        }
        let result = self.store.save(&record, path, is_best);
        self.state = CallbackState::Idle;
        result?;

        for evicted in self.window.push(path.to_path_buf()) {
            match fs::remove_file(&evicted) {
                Ok(()) => debug!(path = %evicted.display(), "Deleted old checkpoint"),
                Err(e) => warn!(path = %evicted.display(), error = %e, "Failed to delete old checkpoint"),
            }
        }
        Ok(())
    }

    fn report(&self, epoch: Epoch, path: &Path, improved: Option<f64>) {
        let epoch = epoch + 1;
        let path = path.display();
        match (self.config.verbose > 0, improved) {
            (true, Some(current)) => info!(epoch, from = self.best, to = current, path = %path, "Improved, saving model"),
            (true, None) => info!(epoch, path = %path, "Saving model"),
            (false, Some(current)) => debug!(epoch, from = self.best, to = current, path = %path, "Improved, saving model"),
            (false, None) => debug!(epoch, path = %path, "Saving model"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::OptimizerState;
    use zoo_core::{Init, StateDict, Tensor};

    struct Trainer;

    impl TrainingState for Trainer {
        fn model_name(&self) -> Option<&str> {
            Some("resnet18")
        }

        fn model_state(&self) -> StateDict {
            let mut state = StateDict::new();
            state.insert("fc.weight", Tensor::deferred([2, 4], Init::KaimingUniform));
            state
        }

        fn optimizer_state(&self) -> OptimizerState {
            OptimizerState::new().with_param("lr", 0.01)
        }
    }

    fn config(dir: &Path) -> CheckpointConfig {
        CheckpointConfig {
            directory: dir.to_path_buf(),
            filename: "ckpt_{epoch}_{loss}.pth.tar".to_string(),
            best_file: dir.join("model_best.pth.tar"),
            ..Default::default()
        }
    }

    fn metrics(value: f64) -> Metrics {
        [("val_loss".to_string(), value)].into_iter().collect()
    }

    fn checkpoints(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("ckpt_"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_path_template() {
        let dir = tempfile::tempdir().unwrap();
        let callback = CheckpointCallback::new(config(dir.path())).unwrap();
        assert_eq!(
            callback.checkpoint_path(0, &metrics(0.123456)),
            dir.path().join("ckpt_001_0.1235.pth.tar")
        );
        assert_eq!(
            callback.checkpoint_path(11, &Metrics::new()),
            dir.path().join("ckpt_012_nan.pth.tar")
        );
    }

    #[test]
    fn test_save_best_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = CheckpointCallback::new(CheckpointConfig {
            save_best_only: true,
            ..config(dir.path())
        })
        .unwrap();

        let mut written = Vec::new();
        for (epoch, loss) in [0.5, 0.3, 0.4, 0.2].into_iter().enumerate() {
            if callback.on_epoch_end(epoch as Epoch, &metrics(loss), &Trainer).unwrap().is_some() {
                written.push(epoch + 1);
            }
            assert_eq!(callback.state(), CallbackState::Idle);
        }
        assert_eq!(written, vec![1, 2, 4]);
        assert_eq!(callback.best(), 0.2);
        assert_eq!(
            checkpoints(dir.path()),
            vec!["ckpt_001_0.5000.pth.tar", "ckpt_002_0.3000.pth.tar", "ckpt_004_0.2000.pth.tar"]
        );

        // The best file holds the last improvement
        let best = callback.store().load(callback.store().best_file(), zoo_core::Device::Cpu, None).unwrap();
        assert_eq!(best.epoch, 4);
        assert_eq!(best.model_name.as_deref(), Some("resnet18"));
    }

    #[test]
    fn test_failed_save_keeps_previous_best() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = CheckpointCallback::new(CheckpointConfig {
            filename: "{epoch}/ckpt_{loss}.pth.tar".to_string(),
            save_best_only: true,
            ..config(dir.path())
        })
        .unwrap();
        // A plain file where epoch 2's directory should go
        fs::write(dir.path().join("002"), b"").unwrap();

        assert!(callback.on_epoch_end(0, &metrics(0.5), &Trainer).unwrap().is_some());
        assert!(callback.on_epoch_end(1, &metrics(0.3), &Trainer).is_err());
        assert_eq!(callback.best(), 0.5);
        assert_eq!(callback.state(), CallbackState::Idle);

        let written = callback.on_epoch_end(2, &metrics(0.4), &Trainer).unwrap();
        assert_eq!(written, Some(dir.path().join("003").join("ckpt_0.4000.pth.tar")));
        assert_eq!(callback.best(), 0.4);
    }

    #[test]
    fn test_missing_metric_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = CheckpointCallback::new(CheckpointConfig {
            save_best_only: true,
            ..config(dir.path())
        })
        .unwrap();

        let result = callback.on_epoch_end(0, &Metrics::new(), &Trainer).unwrap();
        assert!(result.is_none());
        assert!(checkpoints(dir.path()).is_empty());
        assert!(callback.best().is_infinite());
    }

    #[test]
    fn test_max_save_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = CheckpointCallback::new(CheckpointConfig {
            max_save: 2,
            ..config(dir.path())
        })
        .unwrap();

        for epoch in 0..3 {
            callback.on_epoch_end(epoch, &metrics(1.0), &Trainer).unwrap();
        }
        assert_eq!(
            checkpoints(dir.path()),
            vec!["ckpt_002_1.0000.pth.tar", "ckpt_003_1.0000.pth.tar"]
        );
        assert_eq!(callback.window().len(), 2);
    }

    #[test]
    fn test_same_path_not_duplicated() {
        let mut window = RetentionWindow::new(Some(2));
        assert!(window.push(PathBuf::from("a")).is_empty());
        assert!(window.push(PathBuf::from("a")).is_empty());
        assert!(window.push(PathBuf::from("b")).is_empty());
        assert_eq!(window.push(PathBuf::from("c")), vec![PathBuf::from("a")]);

        let unbounded = &mut RetentionWindow::new(None);
        for name in ["a", "b", "c"] {
            assert!(unbounded.push(PathBuf::from(name)).is_empty());
        }
        assert!(unbounded.is_empty());
    }

    #[test]
    fn test_eviction_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = CheckpointCallback::new(CheckpointConfig {
            max_save: 1,
            ..config(dir.path())
        })
        .unwrap();

        let first = callback.on_epoch_end(0, &metrics(1.0), &Trainer).unwrap().unwrap();
        fs::remove_file(&first).unwrap();
        assert!(callback.on_epoch_end(1, &metrics(1.0), &Trainer).is_ok());
        assert_eq!(checkpoints(dir.path()), vec!["ckpt_002_1.0000.pth.tar"]);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CheckpointCallback::new(CheckpointConfig {
            save_weights_only: false,
            ..config(dir.path())
        })
        .is_err());
        assert!(CheckpointCallback::new(CheckpointConfig {
            filename: String::new(),
            ..config(dir.path())
        })
        .is_err());
    }

    #[test]
    fn test_zero_max_save_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut callback = CheckpointCallback::new(CheckpointConfig {
            max_save: 0,
            ..config(dir.path())
        })
        .unwrap();

        for epoch in 0..3 {
            callback.on_epoch_end(epoch, &metrics(1.0), &Trainer).unwrap();
        }
        assert_eq!(checkpoints(dir.path()).len(), 3);
        assert!(callback.window().is_empty());
    }
}
