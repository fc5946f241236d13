//! Core type definitions shared across the zoo

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Training epoch counter
pub type Epoch = u64;

/// Model family a request belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Image classification networks
    Classification,

    /// Dense per-pixel segmentation networks
    Segmentation,
}

impl Family {
    /// Returns the canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Classification => "classification",
            Family::Segmentation => "segmentation",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "classification" => Ok(Family::Classification),
            "segmentation" => Ok(Family::Segmentation),
            other => Err(Error::InvalidFamily {
                family: other.to_string(),
            }),
        }
    }
}

/// Device a tensor is placed on
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,

    /// Accelerator by ordinal
    Cuda(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

/// Spatial input resolution accepted by resolution-specific networks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct InputSize {
    /// Input height in pixels
    pub height: usize,

    /// Input width in pixels
    pub width: usize,
}

impl InputSize {
    /// Square input of `side` x `side` pixels
    pub fn square(side: usize) -> Self {
        Self {
            height: side,
            width: side,
        }
    }
}

impl fmt::Display for InputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.height, self.width)
    }
}

/// Tensor dimensions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// Zero-dimensional shape used for scalar buffers
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Size of dimension `index`, if present
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.0.get(index).copied()
    }

    /// Total element count (1 for scalars), saturating at `usize::MAX`
    pub fn numel(&self) -> usize {
        self.checked_numel().unwrap_or(usize::MAX)
    }

    /// Total element count, `None` if it overflows `usize`
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Row-major strides for a densely packed tensor of this shape.
    /// Saturates on overflow; shapes read from untrusted input go through
    /// [`Shape::checked_strides`].
    pub fn contiguous_strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.0.len()];
        for i in (0..self.0.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1].saturating_mul(self.0[i + 1]);
        }
        strides
    }

    /// Row-major strides, `None` if any stride overflows `usize`
    pub fn checked_strides(&self) -> Option<Vec<usize>> {
        let mut strides = vec![1usize; self.0.len()];
        for i in (0..self.0.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1].checked_mul(self.0[i + 1])?;
        }
        Some(strides)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", d)?;
        }
        f.write_str("]")
    }
}

/// Initializer the tensor engine runs when a deferred tensor is materialized
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Init {
    /// Copy weights published under a named pretrained source (e.g. "imagenet")
    Pretrained { source: String },

    /// Kaiming-uniform, used for freshly created weights
    KaimingUniform,

    /// All zeros (biases, running means, counters)
    Zeros,

    /// All ones (norm scales, running variances)
    Ones,
}

impl Init {
    pub fn is_pretrained(&self) -> bool {
        matches!(self, Init::Pretrained { .. })
    }
}

/// Tensor payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TensorData {
    /// Not yet materialized; holds the initializer to run
    Deferred(Init),

    /// Dense row-major values
    Dense(Vec<f32>),
}

/// Shape-bearing parameter or buffer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: TensorData,
    #[serde(default)]
    device: Device,
    requires_grad: bool,
}

impl Tensor {
    /// Trainable tensor whose values are produced by `init`
    pub fn deferred(shape: impl Into<Shape>, init: Init) -> Self {
        Self {
            shape: shape.into(),
            data: TensorData::Deferred(init),
            device: Device::Cpu,
            requires_grad: true,
        }
    }

    /// Non-trainable buffer (running statistics, counters)
    pub fn buffer(shape: impl Into<Shape>, init: Init) -> Self {
        Self {
            requires_grad: false,
            ..Self::deferred(shape, init)
        }
    }

    /// Dense tensor; `values` must hold exactly `shape.numel()` elements
    pub fn from_vec(shape: impl Into<Shape>, values: Vec<f32>) -> Result<Self> {
        let shape = shape.into();
        if shape.checked_numel() != Some(values.len()) {
            return Err(Error::InvalidTensor {
                reason: format!(
                    "shape {} holds {} elements but {} values were given",
                    shape,
                    shape.numel(),
                    values.len()
                ),
            });
        }
        Ok(Self {
            shape,
            data: TensorData::Dense(values),
            device: Device::Cpu,
            requires_grad: true,
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Dense values, if materialized
    pub fn values(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::Dense(v) => Some(v),
            TensorData::Deferred(_) => None,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    /// Moves the tensor to `device`
    pub fn to_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Decomposes the tensor into its parts
    pub fn into_parts(self) -> (Shape, TensorData, bool) {
        (self.shape, self.data, self.requires_grad)
    }

    /// Reassembles a tensor on the CPU from its parts
    pub fn from_parts(shape: Shape, data: TensorData, requires_grad: bool) -> Result<Self> {
        let Some(numel) = shape.checked_numel() else {
            return Err(Error::InvalidTensor {
                reason: format!("shape {} overflows usize", shape),
            });
        };
        if let TensorData::Dense(values) = &data {
            if values.len() != numel {
                return Err(Error::InvalidTensor {
                    reason: format!(
                        "shape {} holds {} elements but payload has {}",
                        shape,
                        numel,
                        values.len()
                    ),
                });
            }
        }
        Ok(Self {
            shape,
            data,
            device: Device::Cpu,
            requires_grad,
        })
    }
}
