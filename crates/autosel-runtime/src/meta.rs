use core::fmt::Display;
use serde::{Deserialize, Serialize};

pub use autosel_common::element::ElemType;

/// Device an output lives on.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    /// Host CPU.
    #[default]
    Cpu,
}

impl Display for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// Metadata describing one tensor argument of a kernel.
#[derive(new, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorMeta {
    /// Argument name inside the kernel.
    pub name: String,
    /// Element type.
    pub dtype: ElemType,
    /// Shape of the tensor.
    pub shape: Vec<usize>,
    /// Strides of the tensor, in elements.
    pub strides: Vec<usize>,
}

/// Device, element type and shape/stride of an operation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Device the output lives on.
    pub device: Device,
    /// Element type of the output.
    pub dtype: ElemType,
    /// Shape of the output.
    pub shape: Vec<usize>,
    /// Strides of the output, in elements.
    pub strides: Vec<usize>,
}

impl Layout {
    /// A contiguous row-major layout for the given shape.
    pub fn contiguous(device: Device, dtype: ElemType, shape: Vec<usize>) -> Self {
        let strides = contiguous_strides(&shape);
        Self {
            device,
            dtype,
            shape,
            strides,
        }
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Row-major strides for a shape, in elements.
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_strides() {
        assert_eq!(contiguous_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(contiguous_strides(&[5]), vec![1]);
        assert!(contiguous_strides(&[]).is_empty());
    }
}
