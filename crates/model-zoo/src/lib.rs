//! Model zoo for the training harness
//!
//! Resolves architecture names to constructed networks, rebuilds their
//! heads for a target class count, and reconciles state dicts across
//! structurally modified networks.

pub mod arch;
pub mod catalog;
pub mod layers;
pub mod model;
pub mod reconcile;
pub mod repository;
pub mod resolver;
pub mod surgery;
pub mod vanilla;
pub mod zoo;

pub use arch::{ArchitectureSpec, HeadLocator, HeadStrategy, Resolution, TrunkLayout};
pub use catalog::Catalog;
pub use model::{Model, ModelSummary};
pub use reconcile::{diff_states, merge_compatible, MismatchReport, ParameterMismatch};
pub use repository::{CustomRepository, ProviderRepository};
pub use resolver::{ModelRequest, ModelZoo};
