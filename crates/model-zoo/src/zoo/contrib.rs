//! Custom repository: third-party ImageNet networks
//!
//! Lowercase names are the pretrained-capable variants. The class-style
//! names (`DPN`, `BNInception`, ...) are exported for untrained use only.

use std::collections::BTreeSet;

use tracing::debug;
use zoo_core::{Error, Family, Result};

use super::trunks::*;
use super::SpecTable;
use crate::arch::{ArchitectureSpec, HeadStrategy, TrunkLayout, DEFAULT_NUM_CLASSES};
use crate::model::Model;
use crate::repository::CustomRepository;

/// Module identifiers the repository exports next to its constructors
const MODULES: &[&str] = &[
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
];

/// Untrained-only class names
const CLASSES: &[&str] = &[
    "BNInception",
    "DPN",
    "InceptionResNetV2",
    "InceptionV4",
    "NASNetALarge",
    "NASNetAMobile",
    "PNASNet5Large",
    "PolyNet",
    "PyResNet",
    "ResNeXt101_32x4d",
    "ResNeXt101_64x4d",
    "Xception",
];

const fn imagenet(name: &'static str, trunk: TrunkLayout, head_in: usize) -> ArchitectureSpec {
    ArchitectureSpec::classifier(name, trunk, head_in).head("last_linear")
}

const fn dpn(name: &'static str, trunk: TrunkLayout, head_in: usize, weights: &'static str) -> ArchitectureSpec {
    imagenet(name, trunk, head_in)
        .weights(weights)
        .strategy(HeadStrategy::PointwiseConv)
}

static CONTRIB: &[ArchitectureSpec] = &[
    imagenet("bninception", BN_INCEPTION, 1024),
    dpn("dpn68", DPN_SMALL, 832, "imagenet"),
    dpn("dpn68b", DPN_SMALL, 832, "imagenet+5k"),
    dpn("dpn92", DPN_LARGE, 2688, "imagenet+5k"),
    dpn("dpn98", DPN_LARGE, 2688, "imagenet"),
    dpn("dpn107", DPN_LARGE, 2688, "imagenet+5k"),
    dpn("dpn131", DPN_LARGE, 2688, "imagenet"),
    imagenet("inceptionresnetv2", INCEPTION_RESNET, 1536),
    imagenet("inceptionv4", INCEPTION_RESNET, 1536),
    imagenet("nasnetalarge", NASNET_LARGE, 4032),
    imagenet("nasnetamobile", NASNET_MOBILE, 1056),
    imagenet("pnasnet5large", PNASNET, 4320),
    imagenet("polynet", INCEPTION_RESNET, 2048),
    imagenet("resnext101_32x4d", RESNET_BOTTLENECK, 2048),
    imagenet("resnext101_64x4d", RESNET_BOTTLENECK, 2048),
    imagenet("se_resnet50", RESNET_BOTTLENECK, 2048),
    imagenet("se_resnet101", RESNET_BOTTLENECK, 2048),
    imagenet("se_resnet152", RESNET_BOTTLENECK, 2048),
    imagenet("se_resnext50_32x4d", RESNET_BOTTLENECK, 2048),
    imagenet("se_resnext101_32x4d", RESNET_BOTTLENECK, 2048),
    imagenet("senet154", RESNET_BOTTLENECK, 2048),
    imagenet("xception", XCEPTION, 2048),
    ArchitectureSpec::classifier("se_inception_v3", INCEPTION, 2048)
        .untrained()
        .aux("AuxLogits", 768)
        .strategy(HeadStrategy::InceptionDual),
    imagenet("pyresnet18", RESNET_BASIC, 512).untrained(),
    imagenet("pyresnet34", RESNET_BASIC, 512).untrained(),
];

/// Built-in custom repository
#[derive(Debug)]
pub struct ContribModels {
    table: SpecTable,
}

impl ContribModels {
    pub fn new() -> Self {
        Self {
            table: SpecTable::new(CONTRIB),
        }
    }

    fn lookup(&self, name: &str) -> Result<&'static ArchitectureSpec> {
        self.table.get(name).ok_or_else(|| Error::UnknownArchitecture {
            family: Family::Classification,
            name: name.to_string(),
        })
    }
}

impl Default for ContribModels {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomRepository for ContribModels {
    fn names(&self) -> BTreeSet<String> {
        self.table
            .names()
            .chain(CLASSES.iter().copied())
            .chain(MODULES.iter().copied())
            .map(String::from)
            .collect()
    }

    fn spec(&self, name: &str) -> Option<&ArchitectureSpec> {
        self.table.get(name)
    }

    fn construct(&self, name: &str, source: Option<&str>) -> Result<Model> {
        let spec = self.lookup(name)?;
        match (source, spec.weights) {
            (Some(requested), Some(published)) if requested == published => {
                debug!(architecture = name, weights = requested, "Constructing contrib network");
                Ok(spec.build(DEFAULT_NUM_CLASSES, Some(requested), None))
            }
            _ => Err(Error::PretrainedUnavailable {
                architecture: name.to_string(),
                weights: source.map(String::from),
            }),
        }
    }

    fn construct_vanilla(&self, name: &str, num_classes: usize) -> Result<Model> {
        let spec = self.lookup(name)?;
        Ok(spec.build(num_classes, None, None))
    }
}
