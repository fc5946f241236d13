//! Architecture catalog
//!
//! Lists the architecture names each family accepts and validates requested
//! names against them.

use std::collections::BTreeSet;

use zoo_core::{Error, Family, ResolverConfig, Result};

use crate::repository::{CustomRepository, ProviderRepository};
use crate::zoo::SEGMENTATION_CATALOG;

/// Read-only view combining both repositories with the resolver settings
pub struct Catalog<'a> {
    stock: &'a dyn ProviderRepository,
    contrib: &'a dyn CustomRepository,
    config: &'a ResolverConfig,
}

impl<'a> Catalog<'a> {
    pub fn new(stock: &'a dyn ProviderRepository, contrib: &'a dyn CustomRepository, config: &'a ResolverConfig) -> Self {
        Self { stock, contrib, config }
    }

    /// Names accepted for `family`
    ///
    /// Classification is the union of both repositories minus the configured
    /// module identifiers that are not real networks.
    pub fn supported(&self, family: Family) -> BTreeSet<String> {
        match family {
            Family::Segmentation => SEGMENTATION_CATALOG.iter().map(|s| s.to_string()).collect(),
            Family::Classification => {
                let mut names = self.contrib.names();
                names.extend(self.stock.names());
                for excluded in &self.config.classification_excludes {
                    names.remove(excluded);
                }
                names
            }
        }
    }

    /// Like [`Catalog::supported`] with the family given as a string
    pub fn supported_by_name(&self, family: &str) -> Result<BTreeSet<String>> {
        Ok(self.supported(family.parse()?))
    }

    pub fn is_experimental(&self, name: &str) -> bool {
        name.starts_with(&self.config.experimental_prefix)
    }

    /// Rejects names that are neither catalogued nor experimental
    pub fn validate(&self, family: Family, name: &str) -> Result<()> {
        if self.is_experimental(name) || self.supported(family).contains(name) {
            Ok(())
        } else {
            Err(Error::UnknownArchitecture {
                family,
                name: name.to_string(),
            })
        }
    }
}
