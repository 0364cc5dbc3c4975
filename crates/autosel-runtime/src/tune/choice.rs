use core::fmt::Display;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::AutotuneError;
use crate::meta::{Layout, TensorMeta};

/// One concrete way to execute an operation, subject to benchmarking.
pub trait Choice<In, Out>: Send + Sync {
    /// Name of the choice, used in logs and checksums.
    fn name(&self) -> &str;

    /// Execute the choice on the given inputs.
    fn call(&self, inputs: In) -> Result<Out, AutotuneError>;
}

type RunFn<In, Out> = Arc<dyn Fn(In) -> Result<Out, AutotuneError> + Send + Sync>;

/// A choice wrapping the eager/library implementation of an operation.
pub struct FallbackChoice<In, Out> {
    name: String,
    run: RunFn<In, Out>,
}

impl<In, Out> FallbackChoice<In, Out> {
    /// Create a fallback choice from a name and an eager implementation.
    pub fn new(
        name: impl Into<String>,
        run: impl Fn(In) -> Result<Out, AutotuneError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Arc::new(run),
        }
    }
}

impl<In, Out> Choice<In, Out> for FallbackChoice<In, Out>
where
    In: Send + Sync,
    Out: Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, inputs: In) -> Result<Out, AutotuneError> {
        (self.run)(inputs)
    }
}

/// Tuning parameters carried by a template instantiation.
#[derive(new, Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuningParams {
    /// Number of pipeline stages.
    pub num_stages: Option<u32>,
    /// Number of warps.
    pub num_warps: Option<u32>,
    /// Number of consumer groups.
    pub num_consumer_groups: Option<u32>,
    /// Number of buffers for warp specialization.
    pub num_buffers: Option<u32>,
}

/// Descriptor identifying one template benchmark run.
///
/// Every field is optional; a request under construction must still be
/// printable, so all accessors degrade to best-effort text.
#[derive(new, Debug, Default, Clone)]
pub struct TemplateBenchRequest {
    /// Path of the generated kernel module.
    pub module_path: Option<String>,
    /// Cache key of the generated module.
    pub module_cache_key: Option<String>,
    /// Name of the kernel inside the module.
    pub kernel_name: Option<String>,
    /// Extra scalar arguments passed to the kernel.
    pub extra_args: Option<Vec<String>>,
    /// Tuning parameters of this instantiation.
    pub params: TuningParams,
    /// Metadata of the input tensors.
    pub input_meta: Option<Vec<TensorMeta>>,
    /// Layout of the output.
    pub output_layout: Option<Layout>,
}

impl Display for TemplateBenchRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}::{}",
            self.module_path.as_deref().unwrap_or("?"),
            self.kernel_name.as_deref().unwrap_or("?")
        )
    }
}

/// A choice backed by a rendered kernel template instantiation.
pub struct TemplateChoice<In, Out> {
    name: String,
    label: String,
    /// Benchmark request describing this instantiation.
    pub bench_request: TemplateBenchRequest,
    /// Final rendered kernel source, kept for artifact logging.
    pub source: Option<String>,
    run: RunFn<In, Out>,
}

impl<In, Out> TemplateChoice<In, Out> {
    /// Create a template choice from its descriptor and runnable.
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        bench_request: TemplateBenchRequest,
        source: Option<String>,
        run: impl Fn(In) -> Result<Out, AutotuneError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            bench_request,
            source,
            run: Arc::new(run),
        }
    }
}

impl<In, Out> Choice<In, Out> for TemplateChoice<In, Out>
where
    In: Send + Sync,
    Out: Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, inputs: In) -> Result<Out, AutotuneError> {
        (self.run)(inputs)
    }
}

impl<In, Out> Display for TemplateChoice<In, Out> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "TemplateChoice({}, {})",
            self.bench_request.module_path.as_deref().unwrap_or("?"),
            self.label
        )
    }
}

impl<In, Out> core::fmt::Debug for TemplateChoice<In, Out> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TemplateChoice")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("bench_request", &self.bench_request)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_with_all_none_fields() {
        let bench_request = TemplateBenchRequest {
            module_path: Some("abc.py".to_string()),
            ..Default::default()
        };
        let choice: TemplateChoice<(), ()> =
            TemplateChoice::new("tpl", "extra", bench_request, None, |_| Ok(()));

        assert_eq!(choice.to_string(), "TemplateChoice(abc.py, extra)");
    }

    #[test]
    fn test_bench_request_default_is_printable() {
        let request = TemplateBenchRequest::default();
        assert_eq!(request.to_string(), "?::?");
    }
}
