//! Provider repository: the stock vision networks

use std::collections::BTreeSet;

use tracing::debug;
use zoo_core::{Error, Family, Result};

use super::trunks::*;
use super::SpecTable;
use crate::arch::{ArchitectureSpec, HeadStrategy, DEFAULT_NUM_CLASSES, SQUEEZE_HEAD_IN, VGG_HEAD_IN};
use crate::model::Model;
use crate::repository::ProviderRepository;

/// Module identifiers the provider exports next to its constructors
const MODULES: &[&str] = &["resnet", "densenet", "squeezenet", "vgg", "inception"];

const fn resnet(name: &'static str, bottleneck: bool) -> ArchitectureSpec {
    if bottleneck {
        ArchitectureSpec::classifier(name, RESNET_BOTTLENECK, 2048)
    } else {
        ArchitectureSpec::classifier(name, RESNET_BASIC, 512)
    }
}

const fn densenet(name: &'static str, trunk: crate::arch::TrunkLayout, head_in: usize) -> ArchitectureSpec {
    ArchitectureSpec::classifier(name, trunk, head_in).head("classifier")
}

const fn squeezenet(name: &'static str) -> ArchitectureSpec {
    ArchitectureSpec::classifier(name, SQUEEZE, SQUEEZE_HEAD_IN)
        .head("classifier")
        .strategy(HeadStrategy::SqueezeConv)
}

const fn vgg(name: &'static str) -> ArchitectureSpec {
    ArchitectureSpec::classifier(name, VGG, VGG_HEAD_IN)
        .head("classifier")
        .strategy(HeadStrategy::VggClassifier)
}

static STOCK: &[ArchitectureSpec] = &[
    resnet("resnet18", false),
    resnet("resnet34", false),
    resnet("resnet50", true),
    resnet("resnet101", true),
    resnet("resnet152", true),
    densenet("densenet121", DENSENET_121, 1024),
    densenet("densenet161", DENSENET_161, 2208),
    densenet("densenet169", DENSENET_169, 1664),
    densenet("densenet201", DENSENET_201, 1920),
    squeezenet("squeezenet1_0"),
    squeezenet("squeezenet1_1"),
    vgg("vgg11"),
    vgg("vgg11_bn"),
    vgg("vgg13"),
    vgg("vgg13_bn"),
    vgg("vgg16"),
    vgg("vgg16_bn"),
    vgg("vgg19"),
    vgg("vgg19_bn"),
    ArchitectureSpec::classifier("inception_v3", INCEPTION, 2048)
        .aux("AuxLogits", 768)
        .strategy(HeadStrategy::InceptionDual),
];

/// Built-in provider repository
#[derive(Debug)]
pub struct StockModels {
    table: SpecTable,
}

impl StockModels {
    pub fn new() -> Self {
        Self {
            table: SpecTable::new(STOCK),
        }
    }

    fn lookup(&self, name: &str) -> Result<&'static ArchitectureSpec> {
        self.table.get(name).ok_or_else(|| Error::UnknownArchitecture {
            family: Family::Classification,
            name: name.to_string(),
        })
    }
}

impl Default for StockModels {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRepository for StockModels {
    fn names(&self) -> BTreeSet<String> {
        self.table
            .names()
            .chain(MODULES.iter().copied())
            .map(String::from)
            .collect()
    }

    fn spec(&self, name: &str) -> Option<&ArchitectureSpec> {
        self.table.get(name)
    }

    fn construct(&self, name: &str, pretrained: bool) -> Result<Model> {
        let spec = self.lookup(name)?;
        let weights = if pretrained {
            Some(spec.weights.ok_or_else(|| Error::PretrainedUnavailable {
                architecture: name.to_string(),
                weights: None,
            })?)
        } else {
            None
        };
        debug!(architecture = name, pretrained, "Constructing stock network");
        Ok(spec.build(DEFAULT_NUM_CLASSES, weights, None))
    }

    fn construct_vanilla(&self, name: &str, num_classes: usize) -> Result<Model> {
        let spec = self.lookup(name)?;
        Ok(spec.build(num_classes, None, None))
    }
}
