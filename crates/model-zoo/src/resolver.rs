//! Model resolution
//!
//! Turns a (family, name, class count) request into a constructed network
//! whose head produces the requested number of outputs.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use tracing::{info, instrument, warn};
use zoo_core::{Error, Family, InputSize, ResolverConfig, Result};

use crate::arch::ArchitectureSpec;
use crate::catalog::Catalog;
use crate::model::Model;
use crate::repository::{CustomRepository, ProviderRepository};
use crate::surgery::replace_head;
use crate::vanilla::{self, VanillaSource};
use crate::zoo::{ContribModels, SegmentationModels, StockModels, SEGMENTATION_CATALOG};

static GLOBAL: OnceLock<ModelZoo> = OnceLock::new();

/// What to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub family: Family,
    pub name: String,
    pub num_classes: usize,

    /// Start from published weights when the architecture has them
    pub pretrained: bool,

    /// Input resolution for resolution-specific segmentation networks
    pub input_size: Option<InputSize>,
}

impl ModelRequest {
    /// Pretrained request with no input size
    pub fn new(family: Family, name: impl Into<String>, num_classes: usize) -> Self {
        Self {
            family,
            name: name.into(),
            num_classes,
            pretrained: true,
            input_size: None,
        }
    }

    /// Parses the family from its string form
    pub fn parse(family: &str, name: impl Into<String>, num_classes: usize) -> Result<Self> {
        Ok(Self::new(family.parse()?, name, num_classes))
    }

    pub fn classification(name: impl Into<String>, num_classes: usize) -> Self {
        Self::new(Family::Classification, name, num_classes)
    }

    pub fn segmentation(name: impl Into<String>, num_classes: usize) -> Self {
        Self::new(Family::Segmentation, name, num_classes)
    }

    pub fn pretrained(mut self, pretrained: bool) -> Self {
        self.pretrained = pretrained;
        self
    }

    pub fn input_size(mut self, input_size: InputSize) -> Self {
        self.input_size = Some(input_size);
        self
    }
}

/// Architecture dispatcher over the provider, custom and segmentation
/// repositories
pub struct ModelZoo {
    stock: Box<dyn ProviderRepository>,
    contrib: Box<dyn CustomRepository>,
    segmentation: SegmentationModels,
    config: ResolverConfig,
}

impl ModelZoo {
    /// Zoo over the built-in repositories
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_repositories(Box::new(StockModels::new()), Box::new(ContribModels::new()), config)
    }

    pub fn with_repositories(
        stock: Box<dyn ProviderRepository>,
        contrib: Box<dyn CustomRepository>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            stock,
            contrib,
            segmentation: SegmentationModels::new(),
            config,
        }
    }

    /// Process-wide zoo with the default configuration
    pub fn global() -> &'static ModelZoo {
        GLOBAL.get_or_init(|| ModelZoo::new(ResolverConfig::default()))
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(self.stock.as_ref(), self.contrib.as_ref(), &self.config)
    }

    /// Names accepted for the family given as a string
    pub fn supported_models(&self, family: &str) -> Result<BTreeSet<String>> {
        self.catalog().supported_by_name(family)
    }

    /// Declaration behind a name, if any repository has one
    pub fn spec(&self, family: Family, name: &str) -> Option<&ArchitectureSpec> {
        match family {
            Family::Classification => self.stock.spec(name).or_else(|| self.contrib.spec(name)),
            Family::Segmentation => self.segmentation.spec(name),
        }
    }

    /// Shorthand for [`ModelZoo::get_model`]
    pub fn resolve(
        &self,
        family: Family,
        name: &str,
        num_classes: usize,
        pretrained: bool,
        input_size: Option<InputSize>,
    ) -> Result<Model> {
        self.get_model(&ModelRequest {
            family,
            name: name.to_string(),
            num_classes,
            pretrained,
            input_size,
        })
    }

    /// Builds the requested network
    ///
    /// The name is validated against the catalog before anything is
    /// constructed, unless it carries the experimental prefix.
    #[instrument(skip(self), fields(family = %request.family, name = %request.name))]
    pub fn get_model(&self, request: &ModelRequest) -> Result<Model> {
        if request.num_classes == 0 {
            return Err(Error::InvalidConfig {
                message: "num_classes must be at least 1".to_string(),
            });
        }
        self.catalog().validate(request.family, &request.name)?;

        info!(
            architecture = %request.name,
            num_classes = request.num_classes,
            pretrained = request.pretrained,
            "Loading model"
        );

        match request.family {
            Family::Classification => self.classification(request),
            Family::Segmentation => self.segmentation(request),
        }
    }

    /// Untrained network for `name` with a `num_classes` head, chosen by
    /// name prefix
    pub fn untrained_model(&self, name: &str, num_classes: usize) -> Result<Model> {
        self.vanilla(name, num_classes).map(|(model, _)| model)
    }

    fn classification(&self, request: &ModelRequest) -> Result<Model> {
        let name = request.name.as_str();

        let (mut model, spec) = if let Some(spec) = self.stock.spec(name) {
            (self.stock.construct(name, request.pretrained)?, *spec)
        } else if self.contrib.names().contains(name) {
            if request.pretrained {
                self.contrib_pretrained(name, request.num_classes)?
            } else {
                info!(architecture = name, "Loading a vanilla model");
                self.vanilla(name, request.num_classes)?
            }
        } else {
            return Err(Error::UnknownArchitecture {
                family: Family::Classification,
                name: name.to_string(),
            });
        };

        replace_head(&mut model, &spec, request.num_classes)?;
        Ok(model)
    }

    fn contrib_pretrained(&self, name: &str, num_classes: usize) -> Result<(Model, ArchitectureSpec)> {
        match self.contrib.spec(name).copied() {
            Some(spec) if spec.has_pretrained() => {
                let model = self.contrib.construct(name, spec.weights)?;
                Ok((model, spec))
            }
            Some(_) => {
                warn!(architecture = name, "No pretrained variant, building an untrained model instead");
                self.vanilla(name, num_classes)
            }
            None => Err(Error::PretrainedUnavailable {
                architecture: name.to_string(),
                weights: None,
            }),
        }
    }

    fn vanilla(&self, name: &str, num_classes: usize) -> Result<(Model, ArchitectureSpec)> {
        let source = vanilla::lookup(name)?;
        let canonical = source.canonical();
        let (model, spec) = match source {
            VanillaSource::Stock(_) => (
                self.stock.construct_vanilla(canonical, num_classes)?,
                self.stock.spec(canonical).copied(),
            ),
            VanillaSource::Contrib(_) => (
                self.contrib.construct_vanilla(canonical, num_classes)?,
                self.contrib.spec(canonical).copied(),
            ),
        };
        let spec = spec.ok_or_else(|| Error::DispatchGap {
            name: canonical.to_string(),
        })?;
        Ok((model, spec))
    }

    fn segmentation(&self, request: &ModelRequest) -> Result<Model> {
        let name = request.name.as_str();
        let spec = match self.segmentation.spec(name) {
            Some(spec) => spec,
            None if SEGMENTATION_CATALOG.contains(&name) => {
                return Err(Error::DispatchGap {
                    name: name.to_string(),
                })
            }
            None => {
                return Err(Error::UnknownArchitecture {
                    family: Family::Segmentation,
                    name: name.to_string(),
                })
            }
        };

        let weights = match (request.pretrained, spec.weights) {
            (true, None) => {
                warn!(
                    architecture = name,
                    "No pretrained model available, an untrained model has been created instead"
                );
                None
            }
            (true, weights) => weights,
            (false, _) => None,
        };
        let input_size = request.input_size.unwrap_or(self.config.default_input_size);
        self.segmentation
            .construct(name, request.num_classes, weights, Some(input_size))
    }
}

impl Default for ModelZoo {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}
