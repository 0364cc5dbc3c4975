//! Eager reference implementations of the tuned operations.
//!
//! These run without any selection machinery and define the numerical ground
//! truth candidates are verified against. Floating point accumulation happens
//! in `f64` so the reference is strictly more precise than any candidate.

use autosel_common::rand::seeded_rng;
use rand::Rng;

use crate::{FloatElement, Tensor};

/// Batch/m/k/n dimensions of a (batched) matmul problem.
pub(crate) fn mm_dims(lhs: &[usize], rhs: &[usize]) -> (usize, usize, usize, usize) {
    match (lhs.len(), rhs.len()) {
        (2, 2) => {
            assert_eq!(lhs[1], rhs[0], "inner dimensions must agree");
            (1, lhs[0], lhs[1], rhs[1])
        }
        (3, 3) => {
            assert_eq!(lhs[0], rhs[0], "batch dimensions must agree");
            assert_eq!(lhs[2], rhs[1], "inner dimensions must agree");
            (lhs[0], lhs[1], lhs[2], rhs[2])
        }
        _ => panic!("matmul expects two rank-2 or two rank-3 tensors"),
    }
}

/// Matrix multiply, rank 2 or batched rank 3.
pub fn matmul<E: FloatElement>(a: &Tensor<E>, b: &Tensor<E>) -> Tensor<E> {
    let (batch, m, k, n) = mm_dims(a.shape(), b.shape());
    let a_data = a.to_vec();
    let b_data = b.to_vec();

    let mut out = vec![E::zero(); batch * m * n];
    for bi in 0..batch {
        for i in 0..m {
            for j in 0..n {
                let mut acc = 0.0f64;
                for p in 0..k {
                    let lhs = a_data[bi * m * k + i * k + p].to_f64();
                    let rhs = b_data[bi * k * n + p * n + j].to_f64();
                    acc += lhs * rhs;
                }
                out[bi * m * n + i * n + j] = E::from_f64(acc);
            }
        }
    }

    let shape = if a.rank() == 2 {
        vec![m, n]
    } else {
        vec![batch, m, n]
    };
    Tensor::from_data(shape, out)
}

/// Integer matrix multiply, `i8 × i8 → i32`, rank 2.
pub fn int_mm(a: &Tensor<i8>, b: &Tensor<i8>) -> Tensor<i32> {
    let (batch, m, k, n) = mm_dims(a.shape(), b.shape());
    assert_eq!(batch, 1, "int_mm expects rank-2 tensors");
    let a_data = a.to_vec();
    let b_data = b.to_vec();

    let mut out = vec![0i32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0i32;
            for p in 0..k {
                acc += a_data[i * k + p] as i32 * b_data[p * n + j] as i32;
            }
            out[i * n + j] = acc;
        }
    }

    Tensor::from_data(vec![m, n], out)
}

/// Elementwise addition with right-aligned broadcasting of `b` onto `a`.
pub fn broadcast_add<E: FloatElement>(a: &Tensor<E>, b: &Tensor<E>) -> Tensor<E> {
    map_broadcast(a, b, |lhs, rhs| lhs + rhs)
}

/// Elementwise multiplication with right-aligned broadcasting of `b` onto `a`.
pub fn broadcast_mul<E: FloatElement>(a: &Tensor<E>, b: &Tensor<E>) -> Tensor<E> {
    map_broadcast(a, b, |lhs, rhs| lhs * rhs)
}

fn map_broadcast<E: FloatElement>(
    a: &Tensor<E>,
    b: &Tensor<E>,
    f: impl Fn(f64, f64) -> f64,
) -> Tensor<E> {
    assert!(
        b.rank() <= a.rank(),
        "broadcast operand has too many dimensions"
    );

    let rank = a.rank();
    let b_rank = b.rank();
    let n = a.num_elements();

    let mut out = Vec::with_capacity(n);
    let mut index = vec![0usize; rank];
    let mut b_index = vec![0usize; b_rank];

    for _ in 0..n {
        for (d, b_dim) in (rank - b_rank..rank).enumerate() {
            b_index[d] = if b.shape()[d] == 1 { 0 } else { index[b_dim] };
        }
        out.push(E::from_f64(f(
            a.at(&index).to_f64(),
            b.at(&b_index).to_f64(),
        )));

        for dim in (0..rank).rev() {
            index[dim] += 1;
            if index[dim] < a.shape()[dim] {
                break;
            }
            index[dim] = 0;
        }
    }

    Tensor::from_data(a.shape().to_vec(), out)
}

/// `bias + a @ b`, the rank-2 fused multiply-add.
pub fn addmm<E: FloatElement>(bias: &Tensor<E>, a: &Tensor<E>, b: &Tensor<E>) -> Tensor<E> {
    broadcast_add(&matmul(a, b), bias)
}

/// `bias + a @ b` batched, bias broadcast over the batch dimensions.
pub fn baddbmm<E: FloatElement>(bias: &Tensor<E>, a: &Tensor<E>, b: &Tensor<E>) -> Tensor<E> {
    broadcast_add(&matmul(a, b), bias)
}

/// `(a @ b) + (c @ d)` with both products of the same shape.
pub fn mm_plus_mm<E: FloatElement>(
    a: &Tensor<E>,
    b: &Tensor<E>,
    c: &Tensor<E>,
    d: &Tensor<E>,
) -> Tensor<E> {
    let lhs = matmul(a, b);
    let rhs = matmul(c, d);
    assert_eq!(lhs.shape(), rhs.shape(), "products must have the same shape");
    broadcast_add(&lhs, &rhs)
}

/// Elementwise `max(x, 0)`.
pub fn relu<E: FloatElement>(tensor: &Tensor<E>) -> Tensor<E> {
    let data = tensor
        .to_vec()
        .into_iter()
        .map(|value| E::from_f64(value.to_f64().max(0.0)))
        .collect();
    Tensor::from_data(tensor.shape().to_vec(), data)
}

/// Elementwise addition of a scalar.
pub fn add_scalar<E: FloatElement>(tensor: &Tensor<E>, value: f64) -> Tensor<E> {
    let data = tensor
        .to_vec()
        .into_iter()
        .map(|element| E::from_f64(element.to_f64() + value))
        .collect();
    Tensor::from_data(tensor.shape().to_vec(), data)
}

/// A seed-deterministic uniform mask in `[0, 1)`.
///
/// The mask only depends on the seed and shape, so candidates and the
/// reference observe the same values.
pub fn rand_mask<E: FloatElement>(shape: Vec<usize>, seed: u64) -> Tensor<E> {
    let mut rng = seeded_rng(seed);
    let len = shape.iter().product();
    let data = (0..len)
        .map(|_| E::from_f64(rng.random_range(0.0..1.0)))
        .collect();
    Tensor::from_data(shape, data)
}

/// Geometry of a 2d convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    /// Vertical and horizontal stride.
    pub stride: (usize, usize),
    /// Vertical and horizontal zero padding.
    pub padding: (usize, usize),
    /// Vertical and horizontal dilation.
    pub dilation: (usize, usize),
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            stride: (1, 1),
            padding: (0, 0),
            dilation: (1, 1),
        }
    }
}

impl ConvParams {
    /// Output height and width for the given input and kernel sizes.
    pub fn out_size(&self, h: usize, w: usize, kh: usize, kw: usize) -> (usize, usize) {
        let h_out = (h + 2 * self.padding.0 - self.dilation.0 * (kh - 1) - 1) / self.stride.0 + 1;
        let w_out = (w + 2 * self.padding.1 - self.dilation.1 * (kw - 1) - 1) / self.stride.1 + 1;
        (h_out, w_out)
    }

    /// Whether this is a pointwise convolution equivalent to a matmul.
    pub fn is_pointwise(&self, kh: usize, kw: usize) -> bool {
        kh == 1
            && kw == 1
            && self.stride == (1, 1)
            && self.padding == (0, 0)
            && self.dilation == (1, 1)
    }
}

/// Direct 2d convolution over `(n, c, h, w)` input and `(co, ci, kh, kw)`
/// weights, with optional per-channel bias.
pub fn conv2d<E: FloatElement>(
    x: &Tensor<E>,
    weight: &Tensor<E>,
    bias: Option<&Tensor<E>>,
    params: ConvParams,
) -> Tensor<E> {
    let [n, c, h, w]: [usize; 4] = x.shape().try_into().expect("conv2d input must be rank 4");
    let [co, ci, kh, kw]: [usize; 4] = weight
        .shape()
        .try_into()
        .expect("conv2d weight must be rank 4");
    assert_eq!(c, ci, "channel dimensions must agree");

    let (h_out, w_out) = params.out_size(h, w, kh, kw);
    let x_data = x.to_vec();
    let w_data = weight.to_vec();
    let bias_data = bias.map(|bias| bias.to_vec());

    let mut out = vec![E::zero(); n * co * h_out * w_out];
    for ni in 0..n {
        for oc in 0..co {
            let base = bias_data
                .as_ref()
                .map(|bias| bias[oc].to_f64())
                .unwrap_or(0.0);
            for oy in 0..h_out {
                for ox in 0..w_out {
                    let mut acc = base;
                    for ic in 0..c {
                        for ky in 0..kh {
                            for kx in 0..kw {
                                let iy = (oy * params.stride.0 + ky * params.dilation.0) as isize
                                    - params.padding.0 as isize;
                                let ix = (ox * params.stride.1 + kx * params.dilation.1) as isize
                                    - params.padding.1 as isize;
                                if iy < 0 || iy >= h as isize || ix < 0 || ix >= w as isize {
                                    continue;
                                }
                                let input = x_data
                                    [((ni * c + ic) * h + iy as usize) * w + ix as usize]
                                    .to_f64();
                                let kernel =
                                    w_data[((oc * ci + ic) * kh + ky) * kw + kx].to_f64();
                                acc += input * kernel;
                            }
                        }
                    }
                    out[((ni * co + oc) * h_out + oy) * w_out + ox] = E::from_f64(acc);
                }
            }
        }
    }

    Tensor::from_data(vec![n, co, h_out, w_out], out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_identity() {
        let a = Tensor::from_data(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0]);
        let identity = Tensor::from_data(vec![2, 2], vec![1.0f32, 0.0, 0.0, 1.0]);
        assert_eq!(matmul(&a, &identity).to_vec(), a.to_vec());
    }

    #[test]
    fn test_matmul_transposed_view() {
        let a = Tensor::from_data(vec![2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Tensor::from_data(vec![2, 3], vec![1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let out = matmul(&a, &b.t());
        assert_eq!(out.shape(), &[2, 2]);
        assert_eq!(out.to_vec(), vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_int_mm() {
        let a = Tensor::from_data(vec![2, 2], vec![1i8, -2, 3, 4]);
        let b = Tensor::from_data(vec![2, 2], vec![2i8, 0, 1, -1]);
        assert_eq!(int_mm(&a, &b).to_vec(), vec![0, 2, 10, -4]);
    }

    #[test]
    fn test_addmm_broadcasts_bias() {
        let bias = Tensor::from_data(vec![1, 2], vec![10.0f32, 20.0]);
        let a = Tensor::from_data(vec![2, 2], vec![1.0f32, 0.0, 0.0, 1.0]);
        let b = Tensor::from_data(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0]);
        assert_eq!(addmm(&bias, &a, &b).to_vec(), vec![11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_conv2d_pointwise_matches_matmul() {
        // A 1x1 convolution is a matmul over the channel dimension.
        let x = Tensor::<f32>::sample(vec![1, 3, 4, 4], 11);
        let w = Tensor::<f32>::sample(vec![2, 3, 1, 1], 12);
        let out = conv2d(&x, &w, None, ConvParams::default());

        // weight (co, ci) @ x (ci, h*w) per batch.
        let x_mat = x.reshape(vec![3, 16]);
        let w_mat = w.reshape(vec![2, 3]);
        let expected = matmul(&w_mat, &x_mat);
        assert_eq!(out.to_vec(), expected.to_vec());
    }

    #[test]
    fn test_rand_mask_deterministic() {
        let a = rand_mask::<f32>(vec![3, 3], 123);
        let b = rand_mask::<f32>(vec![3, 3], 123);
        assert_eq!(a.to_vec(), b.to_vec());
        assert!(a.to_vec().iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_conv_out_size() {
        let params = ConvParams {
            stride: (2, 3),
            padding: (4, 5),
            dilation: (1, 1),
        };
        assert_eq!(params.out_size(34, 41, 3, 3), (20, 17));
    }
}
