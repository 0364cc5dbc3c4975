mod conv;
mod matmul;

pub use conv::*;
pub use matmul::*;

use std::sync::Arc;

use autosel_common::tolerance::Tolerance;
use autosel_runtime::meta::{Layout, TensorMeta};
use autosel_runtime::template::KernelTemplate;
use autosel_runtime::tune::{
    AlgorithmSelector, AutotuneError, AutotuneKey, Choice, Selection, TemplateBenchRequest,
    TemplateChoice, TuningParams,
};

use crate::kernels::BlockConfig;
use crate::templates::render_kernel;
use crate::{ConvKey, Element, MatmulKey, Tensor, verify_tensor};

/// Selector serving the float matmul-family operations.
pub type MatmulSelector<E> = AlgorithmSelector<MatmulKey, (), Tensor<E>>;
/// Selector serving the int8 matmul operation.
pub type IntMmSelector = AlgorithmSelector<MatmulKey, (), Tensor<i32>>;
/// Selector serving the 2d convolution operation.
pub type ConvSelector<E> = AlgorithmSelector<ConvKey, (), Tensor<E>>;

/// Render a template instantiation and append it as a choice.
///
/// An instantiation that cannot be rendered (unsupported element type for the
/// tuned path) is skipped, excluding it from benchmarking without failing the
/// whole selection.
pub(crate) fn maybe_append_template_choice<Out: Send + Sync + 'static>(
    choices: &mut Vec<Arc<dyn Choice<(), Out>>>,
    template: &KernelTemplate,
    config: BlockConfig,
    params: TuningParams,
    inputs: Vec<TensorMeta>,
    layout: Layout,
    run: impl Fn() -> Out + Send + Sync + 'static,
) {
    let kernel_name = format!("{}_{config}", template.name);
    let defines = [
        ("BLOCK_M", config.block_m as i64),
        ("BLOCK_N", config.block_n as i64),
        ("BLOCK_K", config.block_k as i64),
    ];

    match render_kernel(template, &kernel_name, inputs.clone(), layout.clone(), &defines) {
        Ok(source) => {
            let bench_request = TemplateBenchRequest::new(
                Some(format!("{kernel_name}.c")),
                Some(kernel_name.clone()),
                Some(kernel_name.clone()),
                None,
                params,
                Some(inputs),
                Some(layout),
            );
            choices.push(Arc::new(TemplateChoice::new(
                kernel_name,
                config.to_string(),
                bench_request,
                Some(source),
                move |_| Ok(run()),
            )));
        }
        Err(err) => {
            log::debug!("Skipping '{}' instantiation: {err}", template.name);
        }
    }
}

/// Run selection over the choices, verifying every candidate against the
/// eager reference; an empty choice list falls back to the reference output.
pub(crate) fn run_selection<K: AutotuneKey, E: Element>(
    selector: &AlgorithmSelector<K, (), Tensor<E>>,
    name: &str,
    key: K,
    choices: Vec<Arc<dyn Choice<(), Tensor<E>>>>,
    reference: Tensor<E>,
    tolerance: Tolerance,
) -> Result<Tensor<E>, AutotuneError> {
    let verify = |output: &Tensor<E>| verify_tensor(&reference, output, tolerance);

    match selector.select(name, key, choices, (), Some(&verify))? {
        Selection::Executed(output) => Ok(output),
        Selection::NothingToSelect => Ok(reference),
    }
}
