use std::sync::Arc;

use autosel_common::element::ElemType;
use autosel_common::rand::seeded_rng;
use autosel_common::tolerance::{Tolerance, compare_approx};
use autosel_runtime::meta::{Device, Layout, TensorMeta, contiguous_strides};
use autosel_runtime::tune::AutotuneError;
use rand::Rng;

use crate::{Element, FloatElement};

/// A CPU tensor with shared storage and strided views.
///
/// Cloning is cheap: views share the underlying buffer. Tuned kernels never
/// mutate their inputs, so shared storage is safe across candidates.
#[derive(Debug, Clone)]
pub struct Tensor<E> {
    data: Arc<Vec<E>>,
    shape: Vec<usize>,
    strides: Vec<usize>,
    offset: usize,
}

impl<E: Element> Tensor<E> {
    /// Create a contiguous tensor from raw data.
    pub fn from_data(shape: Vec<usize>, data: Vec<E>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "data length must match the shape"
        );
        let strides = contiguous_strides(&shape);
        Self {
            data: Arc::new(data),
            shape,
            strides,
            offset: 0,
        }
    }

    /// A tensor filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self::from_data(shape, vec![E::zero(); len])
    }

    /// A tensor filled with the given value.
    pub fn filled(shape: Vec<usize>, value: E) -> Self {
        let len = shape.iter().product();
        Self::from_data(shape, vec![value; len])
    }

    /// A tensor of seeded random integers in `[low, high)`.
    pub fn sample_int(shape: Vec<usize>, seed: u64, low: i64, high: i64) -> Self {
        let mut rng = seeded_rng(seed);
        let len = shape.iter().product();
        let data = (0..len)
            .map(|_| E::from_f64(rng.random_range(low..high) as f64))
            .collect();
        Self::from_data(shape, data)
    }

    /// Shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Strides of the tensor, in elements.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Element type descriptor.
    pub fn dtype(&self) -> ElemType {
        E::ELEM
    }

    /// Element at the given multi-index.
    #[inline]
    pub fn at(&self, index: &[usize]) -> E {
        debug_assert_eq!(index.len(), self.rank());
        let flat = self.offset
            + index
                .iter()
                .zip(self.strides.iter())
                .map(|(i, s)| i * s)
                .sum::<usize>();
        self.data[flat]
    }

    /// Transposed view, swapping the last two dimensions.
    pub fn t(&self) -> Self {
        assert!(self.rank() >= 2, "transpose requires at least two dims");
        let mut out = self.clone();
        let rank = self.rank();
        out.shape.swap(rank - 2, rank - 1);
        out.strides.swap(rank - 2, rank - 1);
        out
    }

    /// View of `length` indices of one dimension, starting at `start`.
    pub fn narrow(&self, dim: usize, start: usize, length: usize) -> Self {
        assert!(start + length <= self.shape[dim], "narrow out of range");
        let mut out = self.clone();
        out.offset += start * self.strides[dim];
        out.shape[dim] = length;
        out
    }

    /// Reinterpret a contiguous tensor with a new shape.
    pub fn reshape(&self, shape: Vec<usize>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            self.num_elements(),
            "reshape must preserve the number of elements"
        );
        let data = self.to_vec();
        Self::from_data(shape, data)
    }

    /// Whether the view is row-major contiguous.
    pub fn is_contiguous(&self) -> bool {
        self.strides == contiguous_strides(&self.shape)
    }

    /// Materialize the view into a row-major buffer.
    pub fn to_vec(&self) -> Vec<E> {
        let n = self.num_elements();
        if self.is_contiguous() && self.offset == 0 && self.data.len() == n {
            return self.data.as_ref().clone();
        }

        let rank = self.rank();
        let mut out = Vec::with_capacity(n);
        let mut index = vec![0usize; rank];
        for _ in 0..n {
            out.push(self.at(&index));
            for dim in (0..rank).rev() {
                index[dim] += 1;
                if index[dim] < self.shape[dim] {
                    break;
                }
                index[dim] = 0;
            }
        }
        out
    }

    /// Metadata describing this tensor as a kernel argument.
    pub fn meta(&self, name: impl Into<String>) -> TensorMeta {
        TensorMeta::new(
            name.into(),
            E::ELEM,
            self.shape.clone(),
            self.strides.clone(),
        )
    }

    /// Layout describing this tensor as an operation output.
    pub fn layout(&self) -> Layout {
        Layout {
            device: Device::Cpu,
            dtype: E::ELEM,
            shape: self.shape.clone(),
            strides: self.strides.clone(),
        }
    }
}

impl<E: FloatElement> Tensor<E> {
    /// A tensor of seeded uniform values in `[-1, 1)`.
    pub fn sample(shape: Vec<usize>, seed: u64) -> Self {
        let mut rng = seeded_rng(seed);
        let len = shape.iter().product();
        let data = (0..len)
            .map(|_| E::from_f64(rng.random_range(-1.0..1.0)))
            .collect();
        Self::from_data(shape, data)
    }
}

/// Verify an output tensor against the expected reference within tolerance.
///
/// Shape mismatch and out-of-tolerance values both disqualify the candidate.
pub fn verify_tensor<E: Element>(
    expected: &Tensor<E>,
    actual: &Tensor<E>,
    tolerance: Tolerance,
) -> Result<(), AutotuneError> {
    if expected.shape() != actual.shape() {
        return Err(AutotuneError::Unknown(format!(
            "output shape {:?} does not match expected {:?}",
            actual.shape(),
            expected.shape()
        )));
    }

    compare_approx(&expected.to_vec(), &actual.to_vec(), tolerance)?;
    Ok(())
}
