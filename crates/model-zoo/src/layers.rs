//! Head building blocks
//!
//! Only the shape contract of each layer is modelled: the tensors it owns,
//! their names inside the parent module and their dimensions. Forward
//! computation belongs to the tensor engine.

use zoo_core::{Init, Shape, StateDict, Tensor};

/// Fully connected layer, `weight: [out, in]`, `bias: [out]`
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Linear {
    /// Freshly initialized layer
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_init(in_features, out_features, Init::KaimingUniform)
    }

    pub fn with_init(in_features: usize, out_features: usize, init: Init) -> Self {
        let bias_init = if init.is_pretrained() { init.clone() } else { Init::Zeros };
        Self {
            weight: Tensor::deferred([out_features, in_features], init),
            bias: Some(Tensor::deferred([out_features], bias_init)),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape().dim(1).unwrap_or(0)
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape().dim(0).unwrap_or(0)
    }
}

/// 2-D convolution, `weight: [out, in, k, k]`, optional `bias: [out]`
#[derive(Debug, Clone, PartialEq)]
pub struct Conv2d {
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Conv2d {
    /// Freshly initialized convolution with bias
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self::with_init(in_channels, out_channels, kernel_size, true, Init::KaimingUniform)
    }

    pub fn with_init(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        bias: bool,
        init: Init,
    ) -> Self {
        let bias = bias.then(|| {
            let bias_init = if init.is_pretrained() { init.clone() } else { Init::Zeros };
            Tensor::deferred([out_channels], bias_init)
        });
        Self {
            weight: Tensor::deferred([out_channels, in_channels, kernel_size, kernel_size], init),
            bias,
        }
    }

    pub fn in_channels(&self) -> usize {
        self.weight.shape().dim(1).unwrap_or(0)
    }

    pub fn out_channels(&self) -> usize {
        self.weight.shape().dim(0).unwrap_or(0)
    }

    pub fn kernel_size(&self) -> usize {
        self.weight.shape().dim(2).unwrap_or(0)
    }
}

/// Batch normalization over channels
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNorm2d {
    pub weight: Tensor,
    pub bias: Tensor,
    pub running_mean: Tensor,
    pub running_var: Tensor,
    pub num_batches_tracked: Tensor,
}

impl BatchNorm2d {
    pub fn new(channels: usize, init: &Init) -> Self {
        let (scale, shift) = match init {
            Init::Pretrained { .. } => (init.clone(), init.clone()),
            _ => (Init::Ones, Init::Zeros),
        };
        Self {
            weight: Tensor::deferred([channels], scale),
            bias: Tensor::deferred([channels], shift),
            running_mean: Tensor::buffer([channels], Init::Zeros),
            running_var: Tensor::buffer([channels], Init::Ones),
            num_batches_tracked: Tensor::buffer(Shape::scalar(), Init::Zeros),
        }
    }

    pub fn channels(&self) -> usize {
        self.weight.shape().dim(0).unwrap_or(0)
    }
}

/// Convolution without bias followed by batch norm
#[derive(Debug, Clone, PartialEq)]
pub struct ConvBn {
    pub conv: Conv2d,
    pub bn: BatchNorm2d,
}

impl ConvBn {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize, init: &Init) -> Self {
        Self {
            conv: Conv2d::with_init(in_channels, out_channels, kernel_size, false, init.clone()),
            bn: BatchNorm2d::new(out_channels, init),
        }
    }
}

/// Auxiliary classifier attached to an intermediate inception feature map
#[derive(Debug, Clone, PartialEq)]
pub struct InceptionAux {
    pub conv0: ConvBn,
    pub conv1: ConvBn,
    pub fc: Linear,
}

impl InceptionAux {
    pub fn new(in_channels: usize, num_classes: usize) -> Self {
        Self::with_init(in_channels, num_classes, Init::KaimingUniform)
    }

    pub fn with_init(in_channels: usize, num_classes: usize, init: Init) -> Self {
        Self {
            conv0: ConvBn::new(in_channels, 128, 1, &init),
            conv1: ConvBn::new(128, 768, 5, &init),
            fc: Linear::with_init(768, num_classes, init),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.conv0.conv.in_channels()
    }
}

/// A head module
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Linear(Linear),
    Conv2d(Conv2d),
    BatchNorm2d(BatchNorm2d),
    Dropout { p: f32 },
    ReLU,
    AvgPool2d { kernel_size: usize, stride: usize },
    Sequential(Vec<Layer>),
    InceptionAux(InceptionAux),
}

impl Layer {
    /// Calls `f` with the fully qualified name of every tensor, in
    /// registration order
    pub fn visit(&self, prefix: &str, f: &mut dyn FnMut(String, &Tensor)) {
        match self {
            Layer::Linear(l) => {
                f(join(prefix, "weight"), &l.weight);
                if let Some(bias) = &l.bias {
                    f(join(prefix, "bias"), bias);
                }
            }
            Layer::Conv2d(c) => visit_conv(prefix, c, f),
            Layer::BatchNorm2d(bn) => visit_bn(prefix, bn, f),
            Layer::Sequential(layers) => {
                for (i, layer) in layers.iter().enumerate() {
                    layer.visit(&join(prefix, &i.to_string()), f);
                }
            }
            Layer::InceptionAux(aux) => {
                for (name, block) in [("conv0", &aux.conv0), ("conv1", &aux.conv1)] {
                    let block_prefix = join(prefix, name);
                    visit_conv(&join(&block_prefix, "conv"), &block.conv, f);
                    visit_bn(&join(&block_prefix, "bn"), &block.bn, f);
                }
                let fc_prefix = join(prefix, "fc");
                f(join(&fc_prefix, "weight"), &aux.fc.weight);
                if let Some(bias) = &aux.fc.bias {
                    f(join(&fc_prefix, "bias"), bias);
                }
            }
            Layer::Dropout { .. } | Layer::ReLU | Layer::AvgPool2d { .. } => {}
        }
    }

    /// Mutable counterpart of [`Layer::visit`]
    pub fn visit_mut(&mut self, prefix: &str, f: &mut dyn FnMut(String, &mut Tensor)) {
        match self {
            Layer::Linear(l) => {
                f(join(prefix, "weight"), &mut l.weight);
                if let Some(bias) = &mut l.bias {
                    f(join(prefix, "bias"), bias);
                }
            }
            Layer::Conv2d(c) => visit_conv_mut(prefix, c, f),
            Layer::BatchNorm2d(bn) => visit_bn_mut(prefix, bn, f),
            Layer::Sequential(layers) => {
                for (i, layer) in layers.iter_mut().enumerate() {
                    layer.visit_mut(&join(prefix, &i.to_string()), f);
                }
            }
            Layer::InceptionAux(aux) => {
                for (name, block) in [("conv0", &mut aux.conv0), ("conv1", &mut aux.conv1)] {
                    let block_prefix = join(prefix, name);
                    visit_conv_mut(&join(&block_prefix, "conv"), &mut block.conv, f);
                    visit_bn_mut(&join(&block_prefix, "bn"), &mut block.bn, f);
                }
                let fc_prefix = join(prefix, "fc");
                f(join(&fc_prefix, "weight"), &mut aux.fc.weight);
                if let Some(bias) = &mut aux.fc.bias {
                    f(join(&fc_prefix, "bias"), bias);
                }
            }
            Layer::Dropout { .. } | Layer::ReLU | Layer::AvgPool2d { .. } => {}
        }
    }

    /// Parameters of this layer keyed relative to `prefix`
    pub fn state_dict(&self, prefix: &str) -> StateDict {
        let mut dict = StateDict::new();
        self.visit(prefix, &mut |name, tensor| {
            dict.insert(name, tensor.clone());
        });
        dict
    }

    /// Input width of the first weighted layer
    pub fn in_features(&self) -> Option<usize> {
        match self {
            Layer::Linear(l) => Some(l.in_features()),
            Layer::Conv2d(c) => Some(c.in_channels()),
            Layer::InceptionAux(aux) => Some(aux.in_channels()),
            Layer::Sequential(layers) => layers.iter().find_map(Layer::in_features),
            _ => None,
        }
    }

    /// Output width of the last weighted layer
    pub fn out_features(&self) -> Option<usize> {
        match self {
            Layer::Linear(l) => Some(l.out_features()),
            Layer::Conv2d(c) => Some(c.out_channels()),
            Layer::InceptionAux(aux) => Some(aux.fc.out_features()),
            Layer::Sequential(layers) => layers.iter().rev().find_map(Layer::out_features),
            _ => None,
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn visit_conv(prefix: &str, c: &Conv2d, f: &mut dyn FnMut(String, &Tensor)) {
    f(join(prefix, "weight"), &c.weight);
    if let Some(bias) = &c.bias {
        f(join(prefix, "bias"), bias);
    }
}

fn visit_conv_mut(prefix: &str, c: &mut Conv2d, f: &mut dyn FnMut(String, &mut Tensor)) {
    f(join(prefix, "weight"), &mut c.weight);
    if let Some(bias) = &mut c.bias {
        f(join(prefix, "bias"), bias);
    }
}

fn visit_bn(prefix: &str, bn: &BatchNorm2d, f: &mut dyn FnMut(String, &Tensor)) {
    f(join(prefix, "weight"), &bn.weight);
    f(join(prefix, "bias"), &bn.bias);
    f(join(prefix, "running_mean"), &bn.running_mean);
    f(join(prefix, "running_var"), &bn.running_var);
    f(join(prefix, "num_batches_tracked"), &bn.num_batches_tracked);
}

fn visit_bn_mut(prefix: &str, bn: &mut BatchNorm2d, f: &mut dyn FnMut(String, &mut Tensor)) {
    f(join(prefix, "weight"), &mut bn.weight);
    f(join(prefix, "bias"), &mut bn.bias);
    f(join(prefix, "running_mean"), &mut bn.running_mean);
    f(join(prefix, "running_var"), &mut bn.running_var);
    f(join(prefix, "num_batches_tracked"), &mut bn.num_batches_tracked);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_dims() {
        let fc = Linear::new(512, 10);
        assert_eq!(fc.in_features(), 512);
        assert_eq!(fc.out_features(), 10);
        assert_eq!(fc.weight.shape().dims(), &[10, 512]);
    }

    #[test]
    fn test_sequential_names() {
        let head = Layer::Sequential(vec![
            Layer::Dropout { p: 0.5 },
            Layer::Conv2d(Conv2d::new(512, 10, 1)),
            Layer::ReLU,
        ]);
        let dict = head.state_dict("classifier");
        let keys: Vec<_> = dict.keys().collect();
        assert_eq!(keys, vec!["classifier.1.weight", "classifier.1.bias"]);
        assert_eq!(head.in_features(), Some(512));
        assert_eq!(head.out_features(), Some(10));
    }

    #[test]
    fn test_inception_aux_names() {
        let aux = Layer::InceptionAux(InceptionAux::new(768, 10));
        let dict = aux.state_dict("AuxLogits");
        assert!(dict.contains_key("AuxLogits.conv0.conv.weight"));
        assert!(dict.contains_key("AuxLogits.conv1.bn.running_var"));
        assert_eq!(
            dict.get("AuxLogits.fc.weight").unwrap().shape().dims(),
            &[10, 768]
        );
        // conv inside BasicConv2d carries no bias
        assert!(!dict.contains_key("AuxLogits.conv0.conv.bias"));
        assert_eq!(aux.in_features(), Some(768));
        assert_eq!(aux.out_features(), Some(10));
    }

    #[test]
    fn test_visit_mut_matches_visit() {
        let mut head = Layer::InceptionAux(InceptionAux::new(768, 5));
        let expected: Vec<_> = head.state_dict("aux").keys().map(String::from).collect();
        let mut seen = Vec::new();
        head.visit_mut("aux", &mut |name, _| seen.push(name));
        assert_eq!(seen, expected);
    }
}
