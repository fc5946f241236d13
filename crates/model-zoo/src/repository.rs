//! Architecture repository seams
//!
//! The resolver draws classification networks from two repositories: a
//! provider repository with boolean pretrained switches, and a custom
//! repository whose pretrained variants are selected by a weights-source
//! token. Both are traits so a harness can plug in its own tables.

use std::collections::BTreeSet;

use zoo_core::Result;

use crate::arch::ArchitectureSpec;
use crate::model::Model;

/// Provider ("stock") architecture repository
pub trait ProviderRepository: Send + Sync {
    /// Every identifier the repository exports, including module names
    /// that are not constructible
    fn names(&self) -> BTreeSet<String>;

    /// Declaration of a constructible architecture
    fn spec(&self, name: &str) -> Option<&ArchitectureSpec>;

    /// Builds the stock network (1000-class head), optionally pretrained
    fn construct(&self, name: &str, pretrained: bool) -> Result<Model>;

    /// Builds an untrained network with a `num_classes` head
    fn construct_vanilla(&self, name: &str, num_classes: usize) -> Result<Model>;
}

/// Custom ("contrib") architecture repository
pub trait CustomRepository: Send + Sync {
    /// Every identifier the repository exports, including module names
    /// that are not constructible
    fn names(&self) -> BTreeSet<String>;

    /// Declaration of a pretrained-capable architecture
    fn spec(&self, name: &str) -> Option<&ArchitectureSpec>;

    /// Builds the network from the named weights source. A missing source
    /// is rejected; untrained instances come from [`construct_vanilla`].
    ///
    /// [`construct_vanilla`]: CustomRepository::construct_vanilla
    fn construct(&self, name: &str, source: Option<&str>) -> Result<Model>;

    /// Builds an untrained network with a `num_classes` head
    fn construct_vanilla(&self, name: &str, num_classes: usize) -> Result<Model>;
}
