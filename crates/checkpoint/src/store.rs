//! Checkpoint save and restore

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use zoo_core::config::{expand_home, BEST_CHECKPOINT_FILE};
use zoo_core::{Device, Error, Parameterized, Result};

use crate::format;
use crate::record::{CheckpointRecord, ProcType};

/// Reads and writes checkpoint files
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    /// Where improved checkpoints are copied
    best_file: PathBuf,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::with_best_file(BEST_CHECKPOINT_FILE)
    }

    pub fn with_best_file(best_file: impl Into<PathBuf>) -> Self {
        Self {
            best_file: best_file.into(),
        }
    }

    pub fn best_file(&self) -> &Path {
        &self.best_file
    }

    /// Writes `record` to `path`. With `is_best` the file is also copied
    /// over the best file. Returns the number of bytes written.
    #[instrument(skip(self, record, path), fields(epoch = record.epoch, path = %path.display()))]
    pub fn save(&self, record: &CheckpointRecord, path: &Path, is_best: bool) -> Result<u64> {
        let bytes = format::encode(record)?;
        let size = format::write_atomic(path, &bytes)?;

        if is_best {
            if let Some(parent) = self.best_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::copy(path, &self.best_file)?;
            debug!(best_file = %self.best_file.display(), "Copied best checkpoint");
        }

        debug!(size_bytes = size, "Checkpoint saved");
        Ok(size)
    }

    /// Reads the checkpoint at `path` onto `device`
    ///
    /// Multi-device parameter names are normalized to single-device form.
    /// With a `model`, the restored state is loaded into it and any name or
    /// shape disagreement fails the load.
    #[instrument(skip(self, path, model), fields(path = %path.as_ref().display()))]
    pub fn load(
        &self,
        path: impl AsRef<Path>,
        device: Device,
        model: Option<&mut dyn Parameterized>,
    ) -> Result<CheckpointRecord> {
        let path = expand_home(path.as_ref());
        if !path.is_file() {
            return Err(Error::CheckpointNotFound { path });
        }

        let bytes = fs::read(&path)?;
        let mut record = format::decode(&bytes, &path)?;
        info!(
            path = %path.display(),
            epoch = record.epoch,
            device = %device,
            "Loaded checkpoint"
        );
        if let Some(name) = &record.model_name {
            info!(model_name = %name, "Checkpoint model name, make sure it matches your model");
        }

        if record.proc_type == ProcType::MultiGpu {
            info!("Converting multi-GPU checkpoint to single-device parameter names");
            record = record.normalize();
        }
        record.model_state = record.model_state.to_device(device);
        record.optimizer_state.slots = record.optimizer_state.slots.to_device(device);

        if let Some(model) = model {
            model.load_state_dict(&record.model_state)?;
            debug!("Checkpoint state loaded into model");
        }
        Ok(record)
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}
