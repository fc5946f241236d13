//! Zoo configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Error, InputSize, Result};

/// Prefix reserved for experimental architectures that bypass the catalog
pub const EXPERIMENTAL_PREFIX: &str = "TEST";

/// Well-known file the latest improved checkpoint is copied to
pub const BEST_CHECKPOINT_FILE: &str = "model_best.pth.tar";

/// Module and file identifiers a repository may export that are not
/// constructible model names
pub const DEFAULT_CLASSIFICATION_EXCLUDES: &[&str] = &[
    "dpn",
    "inception_resv2_wide",
    "nasnet",
    "nasnet_mobile",
    "pnasnet",
    "pyramid_resnet",
    "resnet_swish",
    "resnext_features",
    "resnext",
    "se_module",
    "se_resnet",
    "senet",
    "wide_resnet",
    "wide_resnet_2",
    "resnet",
    "vgg",
    "squeezenet",
    "inception",
    "densenet",
];

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZooConfig {
    /// Model resolution settings
    pub resolver: ResolverConfig,

    /// Periodic checkpoint settings
    pub checkpoint: CheckpointConfig,
}

impl ZooConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config: ZooConfig = serde_json::from_str(&raw)?;
        config.checkpoint.validate()?;
        debug!(path = %path.display(), "Loaded zoo configuration");
        Ok(config)
    }
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Names starting with this prefix skip catalog validation
    pub experimental_prefix: String,

    /// Input size handed to resolution-specific segmentation networks when
    /// the request does not carry one
    pub default_input_size: InputSize,

    /// Repository identifiers removed from the classification catalog
    pub classification_excludes: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            experimental_prefix: EXPERIMENTAL_PREFIX.to_string(),
            default_input_size: InputSize::square(512),
            classification_excludes: DEFAULT_CLASSIFICATION_EXCLUDES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Periodic checkpoint callback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Directory checkpoints are written to (`~` is expanded)
    pub directory: PathBuf,

    /// File name template; `{epoch}` and `{loss}` are substituted
    pub filename: String,

    /// Metric key compared when `save_best_only` is set (lower is better)
    pub monitor: String,

    /// Only write when the monitored metric improves
    pub save_best_only: bool,

    /// Persist weights and optimizer state only (the only supported mode)
    pub save_weights_only: bool,

    /// Maximum number of checkpoint files kept; zero or negative keeps
    /// every file
    pub max_save: i64,

    /// 0 = quiet, 1 = log every save at info level
    pub verbose: u8,

    /// Where improved checkpoints are copied
    pub best_file: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./checkpoints"),
            filename: "ckpt.pth.tar".to_string(),
            monitor: "val_loss".to_string(),
            save_best_only: false,
            save_weights_only: true,
            max_save: -1,
            verbose: 0,
            best_file: PathBuf::from(BEST_CHECKPOINT_FILE),
        }
    }
}

impl CheckpointConfig {
    /// Checks the settings the callback cannot honour
    pub fn validate(&self) -> Result<()> {
        if !self.save_weights_only {
            return Err(Error::InvalidConfig {
                message: "save_weights_only=false is not supported".to_string(),
            });
        }
        if self.filename.is_empty() {
            return Err(Error::InvalidConfig {
                message: "checkpoint filename template is empty".to_string(),
            });
        }
        Ok(())
    }

    /// Retention bound, `None` when unbounded
    pub fn retention(&self) -> Option<usize> {
        if self.max_save > 0 {
            Some(self.max_save as usize)
        } else {
            None
        }
    }
}

/// Expands a leading `~` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}
