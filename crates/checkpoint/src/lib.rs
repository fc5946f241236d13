//! Checkpoint management for training loops
//!
//! Provides the versioned on-disk format, save/restore with multi-device
//! normalization, and the epoch-end callback with bounded retention.

pub mod callback;
pub mod format;
pub mod record;
pub mod store;

pub use callback::{CallbackState, CheckpointCallback, Metrics, RetentionWindow};
pub use format::{read_header, CheckpointHeader, CheckpointMetadata, CHECKPOINT_VERSION};
pub use record::{CheckpointRecord, OptimizerState, ProcType, TrainingState};
pub use store::CheckpointStore;
