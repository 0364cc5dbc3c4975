use crate::reference::mm_dims;
use crate::{FloatElement, Tensor};

/// Block sizes of one tiled kernel instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockConfig {
    /// Rows of the output tile.
    pub block_m: usize,
    /// Columns of the output tile.
    pub block_n: usize,
    /// Depth of the reduction tile.
    pub block_k: usize,
}

impl BlockConfig {
    /// Create a block configuration.
    pub fn new(block_m: usize, block_n: usize, block_k: usize) -> Self {
        Self {
            block_m,
            block_n,
            block_k,
        }
    }
}

impl core::fmt::Display for BlockConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}x{}x{}", self.block_m, self.block_n, self.block_k)
    }
}

/// Tiled matrix multiply, rank 2 or batched rank 3, accumulating in `f32`.
///
/// Partial tiles at the edges are handled by clamping, so any shape is
/// accepted, including odd reduction sizes.
pub fn matmul_blocked<E: FloatElement>(
    a: &Tensor<E>,
    b: &Tensor<E>,
    config: BlockConfig,
) -> Tensor<E> {
    let (batch, m, k, n) = mm_dims(a.shape(), b.shape());
    let a_data = a.to_vec();
    let b_data = b.to_vec();

    let mut out = Vec::with_capacity(batch * m * n);
    let mut acc = vec![0.0f32; m * n];

    for bi in 0..batch {
        acc.fill(0.0);
        for m0 in (0..m).step_by(config.block_m) {
            let m1 = (m0 + config.block_m).min(m);
            for k0 in (0..k).step_by(config.block_k) {
                let k1 = (k0 + config.block_k).min(k);
                for n0 in (0..n).step_by(config.block_n) {
                    let n1 = (n0 + config.block_n).min(n);
                    for i in m0..m1 {
                        for p in k0..k1 {
                            let lhs = a_data[bi * m * k + i * k + p].to_f32();
                            for j in n0..n1 {
                                acc[i * n + j] += lhs * b_data[bi * k * n + p * n + j].to_f32();
                            }
                        }
                    }
                }
            }
        }
        out.extend(acc.iter().map(|value| E::from_f32(*value)));
    }

    let shape = if a.rank() == 2 {
        vec![m, n]
    } else {
        vec![batch, m, n]
    };
    Tensor::from_data(shape, out)
}

/// Tiled integer matrix multiply, `i8 × i8 → i32`, rank 2.
pub fn int_mm_blocked(a: &Tensor<i8>, b: &Tensor<i8>, config: BlockConfig) -> Tensor<i32> {
    let (batch, m, k, n) = mm_dims(a.shape(), b.shape());
    assert_eq!(batch, 1, "int_mm expects rank-2 tensors");
    let a_data = a.to_vec();
    let b_data = b.to_vec();

    let mut acc = vec![0i32; m * n];
    for m0 in (0..m).step_by(config.block_m) {
        let m1 = (m0 + config.block_m).min(m);
        for k0 in (0..k).step_by(config.block_k) {
            let k1 = (k0 + config.block_k).min(k);
            for n0 in (0..n).step_by(config.block_n) {
                let n1 = (n0 + config.block_n).min(n);
                for i in m0..m1 {
                    for p in k0..k1 {
                        let lhs = a_data[i * k + p] as i32;
                        for j in n0..n1 {
                            acc[i * n + j] += lhs * b_data[p * n + j] as i32;
                        }
                    }
                }
            }
        }
    }

    Tensor::from_data(vec![m, n], acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference;
    use autosel_common::tolerance::{Tolerance, compare_approx};

    #[test]
    fn test_matches_reference_on_odd_k() {
        let a = Tensor::<f32>::sample(vec![11, 22], 1);
        let b = Tensor::<f32>::sample(vec![22, 33], 2);

        let expected = reference::matmul(&a, &b);
        let actual = matmul_blocked(&a, &b, BlockConfig::new(16, 16, 8));

        compare_approx(
            &expected.to_vec(),
            &actual.to_vec(),
            Tolerance::new(1e-4, 1e-4),
        )
        .unwrap();
    }

    #[test]
    fn test_batched_matches_reference() {
        let a = Tensor::<f32>::sample(vec![2, 8, 32], 3);
        let b = Tensor::<f32>::sample(vec![2, 32, 8], 4);

        let expected = reference::matmul(&a, &b);
        let actual = matmul_blocked(&a, &b, BlockConfig::new(8, 8, 16));

        assert_eq!(actual.shape(), &[2, 8, 8]);
        compare_approx(
            &expected.to_vec(),
            &actual.to_vec(),
            Tolerance::new(1e-4, 1e-4),
        )
        .unwrap();
    }

    #[test]
    fn test_int_mm_blocked_is_exact() {
        let a = Tensor::<i8>::sample_int(vec![16, 24], 5, -10, 10);
        let b = Tensor::<i8>::sample_int(vec![24, 12], 6, -10, 10);

        let expected = reference::int_mm(&a, &b);
        let actual = int_mm_blocked(&a, &b, BlockConfig::new(8, 8, 8));
        assert_eq!(expected.to_vec(), actual.to_vec());
    }
}
