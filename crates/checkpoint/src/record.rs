//! Persisted training snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use zoo_core::{Epoch, StateDict, MULTI_DEVICE_PREFIX};

/// How the model was being executed when the snapshot was taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcType {
    #[default]
    Single,

    /// Data-parallel wrapper; parameter names carry the `module.` prefix
    MultiGpu,
}

impl ProcType {
    /// Interprets a stored label. Missing or unknown labels are single
    /// device.
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("multi_gpu") | Some("multi-gpu") => ProcType::MultiGpu,
            _ => ProcType::Single,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcType::Single => "single",
            ProcType::MultiGpu => "multi_gpu",
        }
    }
}

impl fmt::Display for ProcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optimizer state, opaque to the checkpoint layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Scalar settings such as learning rate and momentum
    pub hyper_params: BTreeMap<String, f64>,

    /// Per-parameter buffers (momentum, running averages, ...)
    pub slots: StateDict,
}

impl OptimizerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.hyper_params.insert(name.into(), value);
        self
    }
}

/// Snapshot written at the end of an epoch
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    /// Number of completed epochs
    pub epoch: Epoch,

    pub model_state: StateDict,

    pub optimizer_state: OptimizerState,

    pub proc_type: ProcType,

    /// Advisory architecture name, never validated on load
    pub model_name: Option<String>,
}

impl CheckpointRecord {
    pub fn new(epoch: Epoch, model_state: StateDict, optimizer_state: OptimizerState) -> Self {
        Self {
            epoch,
            model_state,
            optimizer_state,
            proc_type: ProcType::Single,
            model_name: None,
        }
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    pub fn with_proc_type(mut self, proc_type: ProcType) -> Self {
        self.proc_type = proc_type;
        self
    }

    /// Renames parameters to single-device form and marks the record
    /// single-device, so later calls leave it unchanged
    pub fn normalize(mut self) -> Self {
        if self.proc_type == ProcType::MultiGpu {
            self.model_state = self.model_state.strip_prefix(MULTI_DEVICE_PREFIX);
            self.proc_type = ProcType::Single;
        }
        self
    }
}

/// Live training state the checkpoint callback snapshots
pub trait TrainingState {
    /// Architecture name recorded as advisory metadata
    fn model_name(&self) -> Option<&str> {
        None
    }

    fn model_state(&self) -> StateDict;

    fn optimizer_state(&self) -> OptimizerState;

    fn proc_type(&self) -> ProcType {
        ProcType::Single
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zoo_core::{Init, Tensor};

    #[test]
    fn test_proc_type_labels() {
        assert_eq!(ProcType::from_label(Some("multi_gpu")), ProcType::MultiGpu);
        assert_eq!(ProcType::from_label(Some("multi-gpu")), ProcType::MultiGpu);
        assert_eq!(ProcType::from_label(Some("single")), ProcType::Single);
        assert_eq!(ProcType::from_label(Some("tpu")), ProcType::Single);
        assert_eq!(ProcType::from_label(None), ProcType::Single);
    }

    #[test]
    fn test_normalize_idempotent() {
        let mut state = StateDict::new();
        state.insert("module.fc.weight", Tensor::deferred([2, 4], Init::Zeros));
        state.insert("fc.bias", Tensor::deferred([2], Init::Zeros));

        let record = CheckpointRecord::new(3, state, OptimizerState::new())
            .with_proc_type(ProcType::MultiGpu)
            .normalize();
        let keys: Vec<_> = record.model_state.keys().map(String::from).collect();
        assert_eq!(keys, vec!["fc.weight", "fc.bias"]);

        assert_eq!(record.proc_type, ProcType::Single);

        let again = record.clone().normalize();
        assert_eq!(again, record);
    }

    #[test]
    fn test_normalize_nested_prefix_once() {
        let mut state = StateDict::new();
        state.insert("module.module.fc.weight", Tensor::deferred([2, 4], Init::Zeros));

        let record = CheckpointRecord::new(1, state, OptimizerState::new())
            .with_proc_type(ProcType::MultiGpu)
            .normalize()
            .normalize();
        let keys: Vec<_> = record.model_state.keys().map(String::from).collect();
        assert_eq!(keys, vec!["module.fc.weight"]);
    }
}
