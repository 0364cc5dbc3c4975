use std::sync::Arc;

use autosel_runtime::meta::{Device, Layout, TensorMeta};
use autosel_runtime::tune::{AutotuneError, Choice, FallbackChoice, TuningParams};

use super::{ConvSelector, maybe_append_template_choice, run_selection};
use crate::kernels::{BlockConfig, conv2d_blocked, matmul_blocked};
use crate::reference::{self, ConvParams};
use crate::templates::{CONV_TEMPLATE, MATMUL_TEMPLATE};
use crate::{ConvKey, FloatElement, Tensor};

/// Options controlling how a convolution is lowered to candidates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConvOptions {
    /// Lower a pointwise (1×1, unit stride, no padding) convolution to the
    /// matmul candidate set instead of the direct convolution kernels.
    pub conv_1x1_as_mm: bool,
}

/// Block configurations swept by the direct convolution template.
fn conv_configs() -> Vec<(BlockConfig, TuningParams)> {
    vec![
        (
            BlockConfig::new(2, 8, 8),
            TuningParams::new(Some(1), Some(1), None, None),
        ),
        (
            BlockConfig::new(4, 16, 8),
            TuningParams::new(Some(2), Some(2), None, None),
        ),
        (
            BlockConfig::new(8, 32, 8),
            TuningParams::new(Some(2), Some(4), None, None),
        ),
    ]
}

/// A pointwise convolution computed as one matmul per batch entry.
fn conv_1x1_via_mm<E: FloatElement>(
    x: &Tensor<E>,
    weight: &Tensor<E>,
    bias: Option<&Tensor<E>>,
    config: BlockConfig,
) -> Tensor<E> {
    let [n, c, h, w]: [usize; 4] = x.shape().try_into().expect("conv input must be rank 4");
    let co = weight.shape()[0];
    let w_mat = weight.reshape(vec![co, c]);

    let mut data = Vec::with_capacity(n * co * h * w);
    for ni in 0..n {
        let x_mat = x.narrow(0, ni, 1).reshape(vec![c, h * w]);
        data.extend(matmul_blocked(&w_mat, &x_mat, config).to_vec());
    }
    let out = Tensor::from_data(vec![n, co, h, w], data);

    match bias {
        Some(bias) => reference::broadcast_add(&out, &bias.reshape(vec![bias.num_elements(), 1, 1])),
        None => out,
    }
}

/// Tuned 2d convolution over `(n, c, h, w)` input and `(co, ci, kh, kw)`
/// weights.
pub fn conv2d<E: FloatElement>(
    selector: &ConvSelector<E>,
    x: &Tensor<E>,
    weight: &Tensor<E>,
    bias: Option<&Tensor<E>>,
    params: ConvParams,
    options: ConvOptions,
) -> Result<Tensor<E>, AutotuneError> {
    let [n, c, h, w]: [usize; 4] = x.shape().try_into().expect("conv input must be rank 4");
    let [co, _ci, kh, kw]: [usize; 4] = weight
        .shape()
        .try_into()
        .expect("conv weight must be rank 4");

    let key = ConvKey::generate(
        n,
        c,
        co,
        h,
        w,
        (kh, kw),
        params.stride,
        params.padding,
        params.dilation,
        bias.is_some(),
        E::ELEM,
    );
    let reference = reference::conv2d(x, weight, bias, params);
    let (h_out, w_out) = params.out_size(h, w, kh, kw);
    let layout = Layout::contiguous(Device::Cpu, E::ELEM, vec![n, co, h_out, w_out]);

    let mut choices: Vec<Arc<dyn Choice<(), Tensor<E>>>> = Vec::new();
    {
        let (x, weight, bias) = (x.clone(), weight.clone(), bias.cloned());
        choices.push(Arc::new(FallbackChoice::new("conv2d_fallback", move |_| {
            Ok(reference::conv2d(&x, &weight, bias.as_ref(), params))
        })));
    }

    if options.conv_1x1_as_mm && params.is_pointwise(kh, kw) {
        // Matmul-equivalent path: weight (co, ci) times input (ci, h*w).
        let inputs = vec![
            TensorMeta::new("A".to_string(), E::ELEM, vec![co, c], vec![c, 1]),
            TensorMeta::new("B".to_string(), E::ELEM, vec![c, h * w], vec![h * w, 1]),
        ];
        let mm_layout = Layout::contiguous(Device::Cpu, E::ELEM, vec![co, h * w]);

        for (config, tuning) in conv_configs() {
            let (x, weight, bias) = (x.clone(), weight.clone(), bias.cloned());
            maybe_append_template_choice(
                &mut choices,
                &MATMUL_TEMPLATE,
                config,
                tuning,
                inputs.clone(),
                mm_layout.clone(),
                move || conv_1x1_via_mm(&x, &weight, bias.as_ref(), config),
            );
        }
    } else {
        let inputs = vec![x.meta("X"), weight.meta("W")];

        for (config, tuning) in conv_configs() {
            let (x, weight, bias) = (x.clone(), weight.clone(), bias.cloned());
            maybe_append_template_choice(
                &mut choices,
                &CONV_TEMPLATE,
                config,
                tuning,
                inputs.clone(),
                layout.clone(),
                move || conv2d_blocked(&x, &weight, bias.as_ref(), params, config),
            );
        }
    }

    run_selection(
        selector,
        "conv2d",
        key,
        choices,
        reference,
        selector.tolerance(),
    )
}
