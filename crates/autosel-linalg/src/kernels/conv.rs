use super::BlockConfig;
use crate::reference::ConvParams;
use crate::{FloatElement, Tensor};

/// Tiled direct 2d convolution, blocking over output channels and columns,
/// accumulating in `f32`.
pub fn conv2d_blocked<E: FloatElement>(
    x: &Tensor<E>,
    weight: &Tensor<E>,
    bias: Option<&Tensor<E>>,
    params: ConvParams,
    config: BlockConfig,
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
        for oc0 in (0..co).step_by(config.block_m) {
            let oc1 = (oc0 + config.block_m).min(co);
            for ox0 in (0..w_out).step_by(config.block_n) {
                let ox1 = (ox0 + config.block_n).min(w_out);
                for oc in oc0..oc1 {
                    let base = bias_data
                        .as_ref()
                        .map(|bias| bias[oc].to_f32())
                        .unwrap_or(0.0);
                    for oy in 0..h_out {
                        for ox in ox0..ox1 {
                            let mut acc = base;
                            for ic in 0..c {
                                for ky in 0..kh {
                                    let iy = (oy * params.stride.0 + ky * params.dilation.0)
                                        as isize
                                        - params.padding.0 as isize;
                                    if iy < 0 || iy >= h as isize {
                                        continue;
                                    }
                                    for kx in 0..kw {
                                        let ix = (ox * params.stride.1 + kx * params.dilation.1)
                                            as isize
                                            - params.padding.1 as isize;
                                        if ix < 0 || ix >= w as isize {
                                            continue;
                                        }
                                        let input = x_data
                                            [((ni * c + ic) * h + iy as usize) * w + ix as usize]
                                            .to_f32();
                                        let kernel =
                                            w_data[((oc * ci + ic) * kh + ky) * kw + kx].to_f32();
                                        acc += input * kernel;
                                    }
                                }
                            }
                            out[((ni * co + oc) * h_out + oy) * w_out + ox] = E::from_f32(acc);
                        }
                    }
                }
            }
        }
    }

    Tensor::from_data(vec![n, co, h_out, w_out], out)
}
