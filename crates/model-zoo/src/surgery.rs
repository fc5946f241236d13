//! Head surgery
//!
//! Swaps the final layer(s) of a constructed network for freshly
//! initialized ones sized for a new class count. The input width of every
//! replaced layer is read from the layer it replaces, so the new head stays
//! compatible with the trunk.

use tracing::debug;
use zoo_core::{Error, Init, Result};

use crate::arch::{ArchitectureSpec, HeadStrategy, SQUEEZE_HEAD_IN, VGG_HEAD_IN};
use crate::layers::{InceptionAux, Layer};
use crate::model::Model;

/// Replaces the head of `model` following the strategy declared in `spec`
pub fn replace_head(model: &mut Model, spec: &ArchitectureSpec, num_classes: usize) -> Result<()> {
    let module = spec.head.module;
    let in_features = head_input(model, spec, module)?;

    if spec.strategy == HeadStrategy::InceptionDual {
        if let Some(aux) = spec.head.aux {
            // Instances built without auxiliary logits keep a single head
            if let Some(existing) = model.module(aux.module) {
                let aux_in = match existing {
                    Layer::InceptionAux(layer) => layer.in_channels(),
                    _ => return Err(mismatch(spec, aux.module, "expected an inception auxiliary head")),
                };
                model.replace_module(aux.module, Layer::InceptionAux(InceptionAux::new(aux_in, num_classes)));
            }
        }
    }

    let head = spec.strategy.build(in_features, num_classes, Init::KaimingUniform);
    model.replace_module(module, head);
    model.set_num_classes(num_classes);

    debug!(
        architecture = spec.name,
        module,
        strategy = spec.strategy.name(),
        in_features,
        num_classes,
        "Replaced head"
    );
    Ok(())
}

/// Reads the input width of the current head, checking it has the shape
/// the strategy expects
fn head_input(model: &Model, spec: &ArchitectureSpec, module: &str) -> Result<usize> {
    let existing = model
        .module(module)
        .ok_or_else(|| mismatch(spec, module, "head module not found"))?;

    match spec.strategy {
        HeadStrategy::SqueezeConv => {
            let found = match existing {
                Layer::Sequential(_) => existing.in_features(),
                _ => None,
            };
            expect_fixed(spec, module, found, SQUEEZE_HEAD_IN)
        }
        HeadStrategy::VggClassifier => {
            let found = match existing {
                Layer::Sequential(_) => existing.in_features(),
                _ => None,
            };
            expect_fixed(spec, module, found, VGG_HEAD_IN)
        }
        HeadStrategy::PointwiseConv => match existing {
            Layer::Conv2d(conv) => Ok(conv.in_channels()),
            _ => Err(mismatch(spec, module, "expected a convolution")),
        },
        HeadStrategy::InceptionDual | HeadStrategy::Linear => match existing {
            Layer::Linear(linear) => Ok(linear.in_features()),
            _ => Err(mismatch(spec, module, "expected a linear layer")),
        },
    }
}

fn expect_fixed(spec: &ArchitectureSpec, module: &str, found: Option<usize>, expected: usize) -> Result<usize> {
    match found {
        Some(width) if width == expected => Ok(width),
        Some(width) => Err(mismatch(
            spec,
            module,
            &format!("expected {} input features, found {}", expected, width),
        )),
        None => Err(mismatch(spec, module, "expected a sequential head")),
    }
}

fn mismatch(spec: &ArchitectureSpec, module: &str, reason: &str) -> Error {
    Error::HeadMismatch {
        architecture: spec.name.to_string(),
        module: module.to_string(),
        reason: reason.to_string(),
    }
}
