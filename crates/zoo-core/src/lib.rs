//! Zoo Core - Foundation for model resolution and checkpoint management
//!
//! Provides the shared tensor and state-dict types, error handling, and
//! configuration used by the model zoo and checkpoint crates.

pub mod config;
pub mod error;
pub mod state_dict;
pub mod types;

pub use config::{CheckpointConfig, ResolverConfig, ZooConfig};
pub use error::{Error, Result};
pub use state_dict::{Parameterized, StateDict, MULTI_DEVICE_PREFIX};
pub use types::*;
