//! Segmentation registry
//!
//! Every segmentation constructor takes the class count directly, so the
//! stock head already has the requested output channels. Experimental
//! entries (the `TEST` prefix) are dispatchable but not catalogued.

use zoo_core::{Error, Family, InputSize, Result};

use super::trunks::*;
use super::SpecTable;
use crate::arch::{ArchitectureSpec, Resolution, TrunkLayout};
use crate::model::Model;

/// Catalogued segmentation architectures
pub const SEGMENTATION_CATALOG: &[&str] = &[
    "Enet",
    "deeplabv2_ASPP",
    "deeplabv2_FOV",
    "deeplabv3",
    "deeplabv3_Plus",
    "DRN_C_42",
    "DRN_C_58",
    "DRN_D_38",
    "DRN_D_54",
    "DRN_D_105",
    "FRRN_A",
    "FRRN_B",
    "FusionNet",
    "GCN",
    "GCN_VisDa",
    "GCN_Densenet",
    "GCN_PSP",
    "GCN_NASNetA",
    "GCN_Resnext",
    "Linknet",
    "PSPNet",
    "Resnet_DUC",
    "Resnet_DUC_HDC",
    "Resnet_GCN",
    "Segnet",
    "Tiramisu57",
    "Tiramisu67",
    "Tiramisu103",
    "Unet",
    "UNet256",
    "UNet512",
    "UNet1024",
    "UNet960",
    "unet_dilated",
    "Unet_res",
    "UNet_stack",
];

const ENET: TrunkLayout = TrunkLayout::new("initial_block", "bottleneck", &[16, 64, 128]);
const FRRN: TrunkLayout = TrunkLayout::new("conv_in", "frru", &[48, 96, 192, 384]);
const FUSION: TrunkLayout = TrunkLayout::new("in_conv", "down_", &[64, 128, 256, 512, 1024]);
const SEGNET: TrunkLayout = TrunkLayout::new("enc0", "enc", &[64, 128, 256, 512, 512]);
const LINKNET: TrunkLayout = TrunkLayout::new("firstconv", "encoder", &[64, 64, 128, 256, 512]);
const DRN: TrunkLayout = TrunkLayout::new("base.layer0", "base.layer", &[16, 32, 64, 128, 256, 512]);

/// Backbone-pretrained segmenter with a 1x1 conv head
const fn backbone(name: &'static str, head: &'static str, trunk: TrunkLayout, head_in: usize) -> ArchitectureSpec {
    ArchitectureSpec::segmenter(name, head, trunk, head_in).weights("imagenet")
}

/// Segmenter with no published weights
const fn scratch(name: &'static str, head: &'static str, trunk: TrunkLayout, head_in: usize) -> ArchitectureSpec {
    ArchitectureSpec::segmenter(name, head, trunk, head_in)
}

static SEGMENTATION: &[ArchitectureSpec] = &[
    scratch("Enet", "fullconv", ENET, 16),
    backbone("deeplabv2_ASPP", "aspp", RESNET_BOTTLENECK, 2048),
    backbone("deeplabv2_FOV", "fov", RESNET_BOTTLENECK, 1024),
    backbone("deeplabv3", "classifier", RESNET_BOTTLENECK, 256),
    backbone("deeplabv3_Plus", "last_conv", XCEPTION, 256),
    backbone("DRN_C_42", "seg", DRN, 512),
    backbone("DRN_C_58", "seg", DRN, 512),
    backbone("DRN_D_38", "seg", DRN, 512),
    backbone("DRN_D_54", "seg", DRN, 512),
    backbone("DRN_D_105", "seg", DRN, 512),
    scratch("FRRN_A", "classifier", FRRN, 48),
    scratch("FRRN_B", "classifier", FRRN, 48),
    scratch("FusionNet", "out", FUSION, 64),
    backbone("GCN", "final", RESNET_BOTTLENECK, 21),
    backbone("GCN_VisDa", "final", RESNET_BOTTLENECK, 64).resolution(Resolution::Requires),
    backbone("GCN_Densenet", "final", DENSENET_161, 64).resolution(Resolution::Requires),
    backbone("GCN_PSP", "final", RESNET_BOTTLENECK, 64).resolution(Resolution::Requires),
    backbone("GCN_NASNetA", "final", NASNET_MOBILE, 64).resolution(Resolution::Requires),
    backbone("GCN_Resnext", "final", RESNET_BOTTLENECK, 64).resolution(Resolution::Requires),
    backbone("Linknet", "finalconv3", LINKNET, 32),
    backbone("PSPNet", "final", RESNET_BOTTLENECK, 512),
    backbone("Resnet_DUC", "duc", RESNET_BOTTLENECK, 2048),
    backbone("Resnet_DUC_HDC", "duc", RESNET_BOTTLENECK, 2048),
    backbone("Resnet_GCN", "out", RESNET_BOTTLENECK, 21),
    backbone("Segnet", "dec0", SEGNET, 64),
    scratch("Tiramisu57", "finalConv", TIRAMISU, 48),
    scratch("Tiramisu67", "finalConv", TIRAMISU, 48),
    scratch("Tiramisu103", "finalConv", TIRAMISU, 48),
    scratch("Unet", "final", UNET, 64),
    scratch("UNet256", "classify", UNET_SMALL, 16).resolution(Resolution::Fixed(256)),
    scratch("UNet512", "classify", UNET_SMALL, 16).resolution(Resolution::Fixed(512)),
    scratch("UNet1024", "classify", UNET_SMALL, 16).resolution(Resolution::Fixed(1024)),
    scratch("UNet960", "classify", UNET_SMALL, 12).resolution(Resolution::Fixed(960)),
    backbone("unet_dilated", "classify", UNET, 64),
    scratch("Unet_res", "out", UNET, 64),
    scratch("UNet_stack", "classify", UNET_SMALL, 12).resolution(Resolution::Requires),
    // Experimental
    scratch("TEST_DiLinknet", "finalconv3", LINKNET, 32),
    backbone("TEST_DLR_Resnet", "classifier", RESNET_BOTTLENECK, 256),
    backbone("TEST_DLX_Resnet", "classifier", XCEPTION, 256),
    scratch("TEST_PSPNet2", "final", RESNET_BOTTLENECK, 512),
    backbone("TEST_DLV2", "last_conv", XCEPTION, 256),
    scratch("TEST_DLV3", "aspp", RESNET_BOTTLENECK, 256),
    scratch("TEST_LinkCeption", "finalconv3", INCEPTION_RESNET, 32),
    scratch("TEST_LinkDensenet121", "finalconv3", DENSENET_121, 32),
    scratch("TEST_Linknet50", "finalconv3", RESNET_BOTTLENECK, 32),
    scratch("TEST_Linknet101", "finalconv3", RESNET_BOTTLENECK, 32),
    scratch("TEST_Linknet152", "finalconv3", RESNET_BOTTLENECK, 32),
    scratch("TEST_Linknext", "finalconv3", RESNET_BOTTLENECK, 32),
    scratch("TEST_FCDensenet", "finalConv", TIRAMISU, 48),
    scratch("TEST_Tiramisu57", "finalConv", TIRAMISU, 48),
    scratch("TEST_Unet_nested_dilated", "final", UNET, 64),
    scratch("TEST_Unet_plus_plus", "final", UNET, 64),
];

/// Segmentation constructor registry
#[derive(Debug)]
pub struct SegmentationModels {
    table: SpecTable,
}

impl SegmentationModels {
    pub fn new() -> Self {
        Self {
            table: SpecTable::new(SEGMENTATION),
        }
    }

    pub fn spec(&self, name: &str) -> Option<&'static ArchitectureSpec> {
        self.table.get(name)
    }

    /// Every dispatchable name, experimental ones included
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.names()
    }

    /// Builds `name` with a `num_classes` head. `input_size` is only
    /// consulted for resolution-specific networks.
    pub fn construct(&self, name: &str, num_classes: usize, weights: Option<&str>, input_size: Option<InputSize>) -> Result<Model> {
        let spec = self.table.get(name).ok_or_else(|| Error::UnknownArchitecture {
            family: Family::Segmentation,
            name: name.to_string(),
        })?;
        let input_size = match spec.resolution {
            Resolution::Any => None,
            Resolution::Requires => input_size,
            Resolution::Fixed(side) => Some(InputSize::square(side)),
        };
        Ok(spec.build(num_classes, weights, input_size))
    }
}

impl Default for SegmentationModels {
    fn default() -> Self {
        Self::new()
    }
}
