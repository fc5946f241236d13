//! Architecture declarations
//!
//! Every buildable network is described by an [`ArchitectureSpec`]: where
//! its head lives, how the head is rebuilt for a new class count, the layout
//! of its trunk and whether pretrained weights are published for it.

use zoo_core::{Family, Init, InputSize, StateDict};

use crate::layers::{BatchNorm2d, Conv2d, InceptionAux, Layer, Linear};
use crate::model::Model;

/// Class count of the stock pretrained heads (ImageNet)
pub const DEFAULT_NUM_CLASSES: usize = 1000;

/// Input channels of the squeezenet final convolution
pub const SQUEEZE_HEAD_IN: usize = 512;

/// Flattened VGG feature size: 512 channels over a 7x7 map
pub const VGG_HEAD_IN: usize = 512 * 7 * 7;

const VGG_HIDDEN: usize = 4096;

/// How the final layer(s) are rebuilt for a new output cardinality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadStrategy {
    /// Dropout, 1x1 conv, ReLU, 13x13 average pool
    SqueezeConv,

    /// Three fully connected layers with ReLU and dropout in between
    VggClassifier,

    /// Auxiliary inception classifier (when present) plus a linear main head
    InceptionDual,

    /// Single 1x1 convolution keeping the input channels
    PointwiseConv,

    /// Single linear layer keeping the input features
    Linear,
}

impl HeadStrategy {
    /// Builds the main head for `in_features` inputs and `num_classes` outputs
    pub fn build(&self, in_features: usize, num_classes: usize, init: Init) -> Layer {
        match self {
            HeadStrategy::SqueezeConv => Layer::Sequential(vec![
                Layer::Dropout { p: 0.5 },
                Layer::Conv2d(Conv2d::with_init(in_features, num_classes, 1, true, init)),
                Layer::ReLU,
                Layer::AvgPool2d {
                    kernel_size: 13,
                    stride: 1,
                },
            ]),
            HeadStrategy::VggClassifier => Layer::Sequential(vec![
                Layer::Linear(Linear::with_init(in_features, VGG_HIDDEN, init.clone())),
                Layer::ReLU,
                Layer::Dropout { p: 0.5 },
                Layer::Linear(Linear::with_init(VGG_HIDDEN, VGG_HIDDEN, init.clone())),
                Layer::ReLU,
                Layer::Dropout { p: 0.5 },
                Layer::Linear(Linear::with_init(VGG_HIDDEN, num_classes, init)),
            ]),
            HeadStrategy::PointwiseConv => {
                Layer::Conv2d(Conv2d::with_init(in_features, num_classes, 1, true, init))
            }
            HeadStrategy::InceptionDual | HeadStrategy::Linear => {
                Layer::Linear(Linear::with_init(in_features, num_classes, init))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HeadStrategy::SqueezeConv => "squeeze-conv",
            HeadStrategy::VggClassifier => "vgg-classifier",
            HeadStrategy::InceptionDual => "inception-dual",
            HeadStrategy::PointwiseConv => "pointwise-conv",
            HeadStrategy::Linear => "linear",
        }
    }
}

/// Auxiliary head declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxHead {
    /// Module name of the auxiliary classifier
    pub module: &'static str,

    /// Channels of the feature map it is attached to
    pub in_channels: usize,
}

/// Where an architecture keeps its head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadLocator {
    /// Module name of the main head
    pub module: &'static str,

    /// Optional auxiliary head
    pub aux: Option<AuxHead>,
}

impl HeadLocator {
    pub const fn module(module: &'static str) -> Self {
        Self { module, aux: None }
    }
}

/// Whether an architecture depends on the input resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Fully convolutional, any resolution
    Any,

    /// Needs the caller's input size (or the configured default)
    Requires,

    /// Built for one square resolution
    Fixed(usize),
}

/// Backbone parameter layout
///
/// A stem conv-bn block on RGB input followed by one conv-bn block per
/// stage, each stage mapping the previous width to the next. Stage blocks
/// are named `{stage}{index}` with indices starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrunkLayout {
    pub stem: &'static str,
    pub stage: &'static str,
    pub widths: &'static [usize],
}

impl TrunkLayout {
    pub const fn new(stem: &'static str, stage: &'static str, widths: &'static [usize]) -> Self {
        Self { stem, stage, widths }
    }

    /// Channels of the last stage
    pub fn out_channels(&self) -> usize {
        self.widths.last().copied().unwrap_or(3)
    }

    pub fn build(&self, init: &Init) -> StateDict {
        let mut dict = StateDict::new();
        let Some(&stem_width) = self.widths.first() else {
            return dict;
        };
        conv_bn(&mut dict, self.stem, 3, stem_width, 3, init);
        for (i, pair) in self.widths.windows(2).enumerate() {
            let name = format!("{}{}", self.stage, i + 1);
            debug_assert_ne!(name, self.stem, "stage block shadows the stem");
            conv_bn(&mut dict, &name, pair[0], pair[1], 3, init);
        }
        dict
    }
}

fn conv_bn(dict: &mut StateDict, prefix: &str, in_channels: usize, out_channels: usize, kernel: usize, init: &Init) {
    let conv = Layer::Conv2d(Conv2d::with_init(in_channels, out_channels, kernel, false, init.clone()));
    let bn = Layer::BatchNorm2d(BatchNorm2d::new(out_channels, init));
    dict.extend_prefixed("", conv.state_dict(&format!("{}.conv", prefix)));
    dict.extend_prefixed("", bn.state_dict(&format!("{}.bn", prefix)));
}

/// Immutable description of a buildable network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchitectureSpec {
    /// Canonical name
    pub name: &'static str,

    /// Family the architecture belongs to
    pub family: Family,

    /// Pretrained weights source token, `None` when no pretrained variant
    /// is published
    pub weights: Option<&'static str>,

    /// Head location
    pub head: HeadLocator,

    /// Head rebuild strategy
    pub strategy: HeadStrategy,

    /// Backbone layout
    pub trunk: TrunkLayout,

    /// Input features of the stock main head
    pub head_in: usize,

    /// Input resolution dependency
    pub resolution: Resolution,
}

impl ArchitectureSpec {
    /// Classification network with a linear `fc` head and ImageNet weights
    pub const fn classifier(name: &'static str, trunk: TrunkLayout, head_in: usize) -> Self {
        Self {
            name,
            family: Family::Classification,
            weights: Some("imagenet"),
            head: HeadLocator::module("fc"),
            strategy: HeadStrategy::Linear,
            trunk,
            head_in,
            resolution: Resolution::Any,
        }
    }

    /// Segmentation network with a 1x1 conv head and no pretrained variant
    pub const fn segmenter(name: &'static str, head: &'static str, trunk: TrunkLayout, head_in: usize) -> Self {
        Self {
            name,
            family: Family::Segmentation,
            weights: None,
            head: HeadLocator::module(head),
            strategy: HeadStrategy::PointwiseConv,
            trunk,
            head_in,
            resolution: Resolution::Any,
        }
    }

    pub const fn weights(mut self, source: &'static str) -> Self {
        self.weights = Some(source);
        self
    }

    pub const fn untrained(mut self) -> Self {
        self.weights = None;
        self
    }

    pub const fn head(mut self, module: &'static str) -> Self {
        self.head.module = module;
        self
    }

    pub const fn aux(mut self, module: &'static str, in_channels: usize) -> Self {
        self.head.aux = Some(AuxHead { module, in_channels });
        self
    }

    pub const fn strategy(mut self, strategy: HeadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub const fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn has_pretrained(&self) -> bool {
        self.weights.is_some()
    }

    /// Builds an instance with a stock head of `num_classes` outputs.
    /// With `weights` set, trunk and head are initialized from that
    /// pretrained source.
    pub fn build(&self, num_classes: usize, weights: Option<&str>, input_size: Option<InputSize>) -> Model {
        let init = match weights {
            Some(source) => Init::Pretrained {
                source: source.to_string(),
            },
            None => Init::KaimingUniform,
        };

        let mut model = Model::new(self.name, self.family, num_classes, self.trunk.build(&init));
        model.set_input_size(input_size);
        if let Some(aux) = self.head.aux {
            model.replace_module(
                aux.module,
                Layer::InceptionAux(InceptionAux::with_init(aux.in_channels, num_classes, init.clone())),
            );
        }
        model.replace_module(self.head.module, self.strategy.build(self.head_in, num_classes, init));
        model
    }
}
