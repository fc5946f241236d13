//! Built-in architecture tables

mod contrib;
mod segmentation;
mod stock;

pub use contrib::ContribModels;
pub use segmentation::{SegmentationModels, SEGMENTATION_CATALOG};
pub use stock::StockModels;

use std::collections::HashMap;

use crate::arch::ArchitectureSpec;

/// Name-indexed view over a static declaration table
#[derive(Debug)]
pub struct SpecTable {
    specs: &'static [ArchitectureSpec],
    index: HashMap<&'static str, usize>,
}

impl SpecTable {
    pub fn new(specs: &'static [ArchitectureSpec]) -> Self {
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name, i))
            .collect();
        Self { specs, index }
    }

    pub fn get(&self, name: &str) -> Option<&'static ArchitectureSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declaration order
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.specs.iter().map(|spec| spec.name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Trunk layouts shared by several tables
pub(crate) mod trunks {
    use crate::arch::TrunkLayout;

    pub const RESNET_BASIC: TrunkLayout = TrunkLayout::new("conv1", "layer", &[64, 64, 128, 256, 512]);
    pub const RESNET_BOTTLENECK: TrunkLayout = TrunkLayout::new("conv1", "layer", &[64, 256, 512, 1024, 2048]);
    pub const DENSENET_121: TrunkLayout = TrunkLayout::new("features.conv0", "features.denseblock", &[64, 256, 512, 1024]);
    pub const DENSENET_161: TrunkLayout = TrunkLayout::new("features.conv0", "features.denseblock", &[96, 384, 1056, 2208]);
    pub const DENSENET_169: TrunkLayout = TrunkLayout::new("features.conv0", "features.denseblock", &[64, 256, 640, 1664]);
    pub const DENSENET_201: TrunkLayout = TrunkLayout::new("features.conv0", "features.denseblock", &[64, 256, 896, 1920]);
    pub const SQUEEZE: TrunkLayout = TrunkLayout::new("features.0", "features.fire", &[96, 128, 256, 384, 512]);
    pub const VGG: TrunkLayout = TrunkLayout::new("features.0", "features.block", &[64, 128, 256, 512, 512]);
    pub const INCEPTION: TrunkLayout = TrunkLayout::new("Conv2d_1a_3x3", "Mixed_", &[32, 192, 288, 768, 1280, 2048]);
    pub const INCEPTION_RESNET: TrunkLayout = TrunkLayout::new("conv2d_1a", "mixed_", &[32, 192, 320, 1088, 1536]);
    pub const BN_INCEPTION: TrunkLayout = TrunkLayout::new("conv1_7x7_s2", "inception_", &[64, 192, 576, 1024]);
    pub const DPN_SMALL: TrunkLayout = TrunkLayout::new("features.conv1_1", "features.conv", &[10, 144, 320, 704, 832]);
    pub const DPN_LARGE: TrunkLayout = TrunkLayout::new("features.conv1_1", "features.conv", &[64, 336, 704, 1552, 2688]);
    pub const NASNET_LARGE: TrunkLayout = TrunkLayout::new("conv0", "cell_", &[96, 1008, 2016, 4032]);
    pub const NASNET_MOBILE: TrunkLayout = TrunkLayout::new("conv0", "cell_", &[32, 264, 528, 1056]);
    pub const PNASNET: TrunkLayout = TrunkLayout::new("conv_0", "cell_", &[96, 1080, 2160, 4320]);
    pub const XCEPTION: TrunkLayout = TrunkLayout::new("conv1", "block", &[32, 728, 1024, 1536, 2048]);
    pub const UNET: TrunkLayout = TrunkLayout::new("down0", "down", &[64, 128, 256, 512, 1024]);
    pub const UNET_SMALL: TrunkLayout = TrunkLayout::new("down0", "down", &[16, 32, 64, 128, 256]);
    pub const TIRAMISU: TrunkLayout = TrunkLayout::new("firstconv", "denseBlocksDown.", &[48, 112, 192, 304, 464, 656]);
}
