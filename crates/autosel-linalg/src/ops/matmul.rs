use std::sync::Arc;

use autosel_runtime::meta::{Device, Layout, TensorMeta};
use autosel_runtime::tune::{AutotuneError, Choice, FallbackChoice, TuningParams};

use super::{IntMmSelector, MatmulSelector, maybe_append_template_choice, run_selection};
use crate::kernels::{BlockConfig, int_mm_blocked, matmul_blocked};
use crate::reference::{self, mm_dims};
use crate::templates::{LINEAR_RELU_TEMPLATE, MASKED_MATMUL_TEMPLATE, MATMUL_TEMPLATE};
use crate::{Element, FloatElement, MatmulKey, Tensor};

/// Block configurations swept by the matmul-family templates.
fn mm_configs() -> Vec<(BlockConfig, TuningParams)> {
    vec![
        (
            BlockConfig::new(16, 16, 16),
            TuningParams::new(Some(1), Some(1), None, None),
        ),
        (
            BlockConfig::new(32, 32, 16),
            TuningParams::new(Some(2), Some(2), None, None),
        ),
        (
            BlockConfig::new(64, 32, 32),
            TuningParams::new(Some(2), Some(4), None, None),
        ),
    ]
}

/// Metadata of one contiguous matrix tile argument.
fn mat_meta<E: Element>(name: &str, rows: usize, cols: usize) -> TensorMeta {
    TensorMeta::new(name.to_string(), E::ELEM, vec![rows, cols], vec![cols, 1])
}

fn mm_like<E: FloatElement>(
    selector: &MatmulSelector<E>,
    op: &'static str,
    a: &Tensor<E>,
    b: &Tensor<E>,
) -> Result<Tensor<E>, AutotuneError> {
    let (batch, m, k, n) = mm_dims(a.shape(), b.shape());
    let key = MatmulKey::generate(
        op,
        batch,
        m,
        n,
        k,
        E::ELEM,
        a.is_contiguous(),
        b.is_contiguous(),
    );
    let reference = reference::matmul(a, b);
    let layout = Layout::contiguous(Device::Cpu, E::ELEM, vec![m, n]);
    let inputs = vec![mat_meta::<E>("A", m, k), mat_meta::<E>("B", k, n)];

    let mut choices: Vec<Arc<dyn Choice<(), Tensor<E>>>> = Vec::new();
    {
        let (a, b) = (a.clone(), b.clone());
        choices.push(Arc::new(FallbackChoice::new(
            format!("{op}_fallback"),
            move |_| Ok(reference::matmul(&a, &b)),
        )));
    }
    for (config, params) in mm_configs() {
        let (a, b) = (a.clone(), b.clone());
        maybe_append_template_choice(
            &mut choices,
            &MATMUL_TEMPLATE,
            config,
            params,
            inputs.clone(),
            layout.clone(),
            move || matmul_blocked(&a, &b, config),
        );
    }

    run_selection(selector, op, key, choices, reference, selector.tolerance())
}

/// Tuned rank-2 matrix multiply.
pub fn matmul<E: FloatElement>(
    selector: &MatmulSelector<E>,
    a: &Tensor<E>,
    b: &Tensor<E>,
) -> Result<Tensor<E>, AutotuneError> {
    assert_eq!(a.rank(), 2, "matmul expects rank-2 tensors");
    mm_like(selector, "mm", a, b)
}

/// Tuned batched matrix multiply.
pub fn bmm<E: FloatElement>(
    selector: &MatmulSelector<E>,
    a: &Tensor<E>,
    b: &Tensor<E>,
) -> Result<Tensor<E>, AutotuneError> {
    assert_eq!(a.rank(), 3, "bmm expects rank-3 tensors");
    mm_like(selector, "bmm", a, b)
}

fn addmm_like<E: FloatElement>(
    selector: &MatmulSelector<E>,
    op: &'static str,
    bias: &Tensor<E>,
    a: &Tensor<E>,
    b: &Tensor<E>,
) -> Result<Tensor<E>, AutotuneError> {
    let (batch, m, k, n) = mm_dims(a.shape(), b.shape());
    let key = MatmulKey::generate(
        op,
        batch,
        m,
        n,
        k,
        E::ELEM,
        a.is_contiguous(),
        b.is_contiguous(),
    );
    let reference = reference::addmm(bias, a, b);
    let layout = Layout::contiguous(Device::Cpu, E::ELEM, vec![m, n]);
    let inputs = vec![mat_meta::<E>("A", m, k), mat_meta::<E>("B", k, n)];

    let mut choices: Vec<Arc<dyn Choice<(), Tensor<E>>>> = Vec::new();
    {
        let (bias, a, b) = (bias.clone(), a.clone(), b.clone());
        choices.push(Arc::new(FallbackChoice::new(
            format!("{op}_fallback"),
            move |_| Ok(reference::addmm(&bias, &a, &b)),
        )));
    }
    for (config, params) in mm_configs() {
        let (bias, a, b) = (bias.clone(), a.clone(), b.clone());
        maybe_append_template_choice(
            &mut choices,
            &MATMUL_TEMPLATE,
            config,
            params,
            inputs.clone(),
            layout.clone(),
            move || reference::broadcast_add(&matmul_blocked(&a, &b, config), &bias),
        );
    }

    run_selection(selector, op, key, choices, reference, selector.tolerance())
}

/// Tuned `bias + a @ b`.
pub fn addmm<E: FloatElement>(
    selector: &MatmulSelector<E>,
    bias: &Tensor<E>,
    a: &Tensor<E>,
    b: &Tensor<E>,
) -> Result<Tensor<E>, AutotuneError> {
    assert_eq!(a.rank(), 2, "addmm expects rank-2 tensors");
    addmm_like(selector, "addmm", bias, a, b)
}

/// Tuned batched `bias + a @ b` with bias broadcast.
pub fn baddbmm<E: FloatElement>(
    selector: &MatmulSelector<E>,
    bias: &Tensor<E>,
    a: &Tensor<E>,
    b: &Tensor<E>,
) -> Result<Tensor<E>, AutotuneError> {
    assert_eq!(a.rank(), 3, "baddbmm expects rank-3 tensors");
    addmm_like(selector, "baddbmm", bias, a, b)
}

/// Tuned `relu(input @ weight.t() + bias)`, the fused linear layer.
pub fn linear_relu<E: FloatElement>(
    selector: &MatmulSelector<E>,
    input: &Tensor<E>,
    weight: &Tensor<E>,
    bias: &Tensor<E>,
) -> Result<Tensor<E>, AutotuneError> {
    assert_eq!(input.rank(), 2, "linear expects rank-2 input");
    let b = weight.t();
    let (batch, m, k, n) = mm_dims(input.shape(), b.shape());
    let key = MatmulKey::generate(
        "linear_relu",
        batch,
        m,
        n,
        k,
        E::ELEM,
        input.is_contiguous(),
        b.is_contiguous(),
    );
    let reference = reference::relu(&reference::addmm(bias, input, &b));
    let layout = Layout::contiguous(Device::Cpu, E::ELEM, vec![m, n]);
    let inputs = vec![
        mat_meta::<E>("A", m, k),
        mat_meta::<E>("B", k, n),
        bias.meta("BIAS"),
    ];

    let mut choices: Vec<Arc<dyn Choice<(), Tensor<E>>>> = Vec::new();
    {
        let (bias, input, b) = (bias.clone(), input.clone(), b.clone());
        choices.push(Arc::new(FallbackChoice::new(
            "linear_relu_fallback",
            move |_| Ok(reference::relu(&reference::addmm(&bias, &input, &b))),
        )));
    }
    for (config, params) in mm_configs() {
        let (bias, input, b) = (bias.clone(), input.clone(), b.clone());
        maybe_append_template_choice(
            &mut choices,
            &LINEAR_RELU_TEMPLATE,
            config,
            params,
            inputs.clone(),
            layout.clone(),
            move || {
                reference::relu(&reference::broadcast_add(
                    &matmul_blocked(&input, &b, config),
                    &bias,
                ))
            },
        );
    }

    run_selection(
        selector,
        "linear_relu",
        key,
        choices,
        reference,
        selector.tolerance(),
    )
}

/// Tuned `(a @ b) + (c @ d)`, both products sharing one candidate set.
pub fn mm_plus_mm<E: FloatElement>(
    selector: &MatmulSelector<E>,
    a: &Tensor<E>,
    b: &Tensor<E>,
    c: &Tensor<E>,
    d: &Tensor<E>,
) -> Result<Tensor<E>, AutotuneError> {
    let (batch, m, k, n) = mm_dims(a.shape(), b.shape());
    let key = MatmulKey::generate(
        "mm_plus_mm",
        batch,
        m,
        n,
        k,
        E::ELEM,
        a.is_contiguous() && c.is_contiguous(),
        b.is_contiguous() && d.is_contiguous(),
    );
    let reference = reference::mm_plus_mm(a, b, c, d);
    let layout = Layout::contiguous(Device::Cpu, E::ELEM, vec![m, n]);
    let inputs = vec![mat_meta::<E>("A", m, k), mat_meta::<E>("B", k, n)];

    let mut choices: Vec<Arc<dyn Choice<(), Tensor<E>>>> = Vec::new();
    {
        let (a, b, c, d) = (a.clone(), b.clone(), c.clone(), d.clone());
        choices.push(Arc::new(FallbackChoice::new(
            "mm_plus_mm_fallback",
            move |_| Ok(reference::mm_plus_mm(&a, &b, &c, &d)),
        )));
    }
    for (config, params) in mm_configs() {
        let (a, b, c, d) = (a.clone(), b.clone(), c.clone(), d.clone());
        maybe_append_template_choice(
            &mut choices,
            &MATMUL_TEMPLATE,
            config,
            params,
            inputs.clone(),
            layout.clone(),
            move || {
                reference::broadcast_add(
                    &matmul_blocked(&a, &b, config),
                    &matmul_blocked(&c, &d, config),
                )
            },
        );
    }

    run_selection(
        selector,
        "mm_plus_mm",
        key,
        choices,
        reference,
        selector.tolerance(),
    )
}

/// Tuned matmul multiplied by a seed-deterministic uniform mask.
pub fn mm_rand_mask<E: FloatElement>(
    selector: &MatmulSelector<E>,
    a: &Tensor<E>,
    b: &Tensor<E>,
    seed: u64,
) -> Result<Tensor<E>, AutotuneError> {
    assert_eq!(a.rank(), 2, "mm_rand_mask expects rank-2 tensors");
    let (batch, m, k, n) = mm_dims(a.shape(), b.shape());
    let key = MatmulKey::generate(
        "mm_rand_mask",
        batch,
        m,
        n,
        k,
        E::ELEM,
        a.is_contiguous(),
        b.is_contiguous(),
    );
    let mask = reference::rand_mask::<E>(vec![m, n], seed);
    let reference = reference::broadcast_mul(&reference::matmul(a, b), &mask);
    let layout = Layout::contiguous(Device::Cpu, E::ELEM, vec![m, n]);
    let inputs = vec![
        mat_meta::<E>("A", m, k),
        mat_meta::<E>("B", k, n),
        mask.meta("MASK"),
    ];

    let mut choices: Vec<Arc<dyn Choice<(), Tensor<E>>>> = Vec::new();
    {
        let (a, b, mask) = (a.clone(), b.clone(), mask.clone());
        choices.push(Arc::new(FallbackChoice::new(
            "mm_rand_mask_fallback",
            move |_| Ok(reference::broadcast_mul(&reference::matmul(&a, &b), &mask)),
        )));
    }
    for (config, params) in mm_configs() {
        let (a, b, mask) = (a.clone(), b.clone(), mask.clone());
        maybe_append_template_choice(
            &mut choices,
            &MASKED_MATMUL_TEMPLATE,
            config,
            params,
            inputs.clone(),
            layout.clone(),
            move || reference::broadcast_mul(&matmul_blocked(&a, &b, config), &mask),
        );
    }

    run_selection(
        selector,
        "mm_rand_mask",
        key,
        choices,
        reference,
        selector.tolerance(),
    )
}

/// Tuned integer matrix multiply, `i8 × i8 → i32`.
pub fn int_mm(
    selector: &IntMmSelector,
    a: &Tensor<i8>,
    b: &Tensor<i8>,
) -> Result<Tensor<i32>, AutotuneError> {
    let (batch, m, k, n) = mm_dims(a.shape(), b.shape());
    let key = MatmulKey::generate(
        "int_mm",
        batch,
        m,
        n,
        k,
        <i8 as Element>::ELEM,
        a.is_contiguous(),
        b.is_contiguous(),
    );
    let reference = reference::int_mm(a, b);
    let layout = Layout::contiguous(Device::Cpu, <i32 as Element>::ELEM, vec![m, n]);
    let inputs = vec![mat_meta::<i8>("A", m, k), mat_meta::<i8>("B", k, n)];

    let mut choices: Vec<Arc<dyn Choice<(), Tensor<i32>>>> = Vec::new();
    {
        let (a, b) = (a.clone(), b.clone());
        choices.push(Arc::new(FallbackChoice::new("int_mm_fallback", move |_| {
            Ok(reference::int_mm(&a, &b))
        })));
    }
    for (config, params) in mm_configs() {
        let (a, b) = (a.clone(), b.clone());
        maybe_append_template_choice(
            &mut choices,
            &MATMUL_TEMPLATE,
            config,
            params,
            inputs.clone(),
            layout.clone(),
            move || int_mm_blocked(&a, &b, config),
        );
    }

    run_selection(
        selector,
        "int_mm",
        key,
        choices,
        reference,
        selector.tolerance(),
    )
}
