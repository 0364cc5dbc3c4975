use hashbrown::HashMap;
use std::sync::Arc;

use autosel_common::element::ElemType;

use super::{HookTable, KernelTemplate, PartialRender, TemplateError, TemplateValue};
use crate::meta::{Layout, TensorMeta};

/// An extension generator registered by name on a [`TemplateKernel`].
///
/// A generator may emit text directly, or register a resolver in the hook
/// table and return the placeholder token instead.
pub type GeneratorFn =
    Arc<dyn Fn(&mut HookTable, &[TemplateValue]) -> Result<String, TemplateError> + Send + Sync>;

/// Placeholder token emitted by the kernel-definition generator.
pub const DEF_KERNEL_TOKEN: &str = "<DEF_KERNEL>";
/// Placeholder token emitted by the output-store generator.
pub const STORE_OUTPUT_TOKEN: &str = "<STORE_OUTPUT>";

/// Evaluates a [`KernelTemplate`] against an environment of named generators.
///
/// The built-in environment covers the kernel definition, size/stride
/// accessors, input loads, the output store, value modifications and argument
/// definitions. Extensions add further `name → function` entries with
/// [`with_generator`](Self::with_generator); they are capabilities of the
/// renderer instance, not subclass overrides.
pub struct TemplateKernel {
    kernel_name: String,
    inputs: Vec<TensorMeta>,
    layout: Layout,
    defines: Vec<(String, i64)>,
    extensions: HashMap<String, GeneratorFn>,
}

/// State collected while walking the template, consumed by the deferred
/// generators once the whole source has been seen.
#[derive(Default)]
struct RenderState {
    declared_inputs: Vec<String>,
    store: Option<StoreOutput>,
}

struct StoreOutput {
    index: String,
    value: String,
    mask: Option<String>,
}

impl TemplateKernel {
    /// Create a renderer for a kernel over the given inputs and output layout.
    pub fn new(kernel_name: impl Into<String>, inputs: Vec<TensorMeta>, layout: Layout) -> Self {
        Self {
            kernel_name: kernel_name.into(),
            inputs,
            layout,
            defines: Vec::new(),
            extensions: HashMap::new(),
        }
    }

    /// Add a compile-time constant available as `{{NAME}}` and emitted by
    /// `gen_defines`.
    pub fn with_define(mut self, name: impl Into<String>, value: i64) -> Self {
        self.defines.push((name.into(), value));
        self
    }

    /// Register an extension generator callable as `{{name(...)}}`.
    pub fn with_generator(mut self, name: impl Into<String>, generator: GeneratorFn) -> Self {
        self.extensions.insert(name.into(), generator);
        self
    }

    /// Output layout this kernel writes to.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Phase one: evaluate the template and collect pending hooks.
    ///
    /// The returned [`PartialRender`] still contains placeholder tokens;
    /// calling [`PartialRender::finalize_all`] yields the final source.
    pub fn render(&self, template: &KernelTemplate) -> Result<PartialRender, TemplateError> {
        let mut hooks = HookTable::new();
        let mut state = RenderState::default();
        let mut out = String::with_capacity(template.source.len());

        let source = template.source;
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or_else(|| TemplateError::Syntax {
                position: source.len() - rest.len() + open,
                message: "unterminated '{{' block".to_string(),
            })?;

            let inner = after_open[..close].trim();
            let position = source.len() - rest.len() + open;
            let fragment = self.eval_block(inner, position, &mut state, &mut hooks)?;
            out.push_str(&fragment);

            rest = &after_open[close + 2..];
        }
        out.push_str(rest);

        self.register_deferred(&mut hooks, state)?;

        Ok(PartialRender::new(out, hooks))
    }

    fn eval_block(
        &self,
        inner: &str,
        position: usize,
        state: &mut RenderState,
        hooks: &mut HookTable,
    ) -> Result<String, TemplateError> {
        if inner.is_empty() {
            return Err(TemplateError::Syntax {
                position,
                message: "empty block".to_string(),
            });
        }

        let Some(paren) = inner.find('(') else {
            // Bare identifier: parameter substitution.
            return self.lookup_define(inner);
        };

        let name = inner[..paren].trim();
        let args_src = inner[paren..]
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| TemplateError::Syntax {
                position,
                message: format!("malformed call '{inner}'"),
            })?;
        let args = parse_args(args_src).map_err(|message| TemplateError::Syntax {
            position,
            message,
        })?;

        match name {
            "def_kernel" => self.def_kernel(&args, state),
            "size" => self.size(&args),
            "stride" => self.stride(&args),
            "load_input" => self.load_input(&args),
            "make_load" => self.make_load(&args),
            "store_output" => self.store_output(&args, state),
            "modification" => self.modification(&args),
            "gen_argdefs" => Ok(self.argdefs()),
            "gen_defines" => Ok(self.gen_defines()),
            _ => match self.extensions.get(name) {
                Some(generator) => generator(hooks, &args),
                None => Err(TemplateError::UnknownGenerator(name.to_string())),
            },
        }
    }

    fn lookup_define(&self, name: &str) -> Result<String, TemplateError> {
        if name == "KERNEL_NAME" {
            return Ok(self.kernel_name.clone());
        }
        self.defines
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.to_string())
            .ok_or_else(|| TemplateError::UnknownGenerator(name.to_string()))
    }

    /// Declares the kernel inputs and defers the signature to finalize time.
    fn def_kernel(
        &self,
        args: &[TemplateValue],
        state: &mut RenderState,
    ) -> Result<String, TemplateError> {
        for arg in args {
            let name = arg.as_str().ok_or_else(|| invalid("def_kernel", arg))?;
            if !self.inputs.iter().any(|meta| meta.name == name) {
                return Err(TemplateError::InvalidArgs {
                    generator: "def_kernel".to_string(),
                    message: format!("unknown input '{name}'"),
                });
            }
            state.declared_inputs.push(name.to_string());
        }
        Ok(DEF_KERNEL_TOKEN.to_string())
    }

    fn size(&self, args: &[TemplateValue]) -> Result<String, TemplateError> {
        let (shape, dim) = self.shape_arg("size", args)?;
        shape
            .get(dim)
            .map(|size| size.to_string())
            .ok_or_else(|| TemplateError::InvalidArgs {
                generator: "size".to_string(),
                message: format!("dimension {dim} out of range"),
            })
    }

    fn stride(&self, args: &[TemplateValue]) -> Result<String, TemplateError> {
        let (strides, dim) = self.strides_arg("stride", args)?;
        strides
            .get(dim)
            .map(|stride| stride.to_string())
            .ok_or_else(|| TemplateError::InvalidArgs {
                generator: "stride".to_string(),
                message: format!("dimension {dim} out of range"),
            })
    }

    fn load_input(&self, args: &[TemplateValue]) -> Result<String, TemplateError> {
        let [name, index] = args else {
            return Err(TemplateError::InvalidArgs {
                generator: "load_input".to_string(),
                message: "expected (input, index)".to_string(),
            });
        };
        let name = name.as_str().ok_or_else(|| invalid("load_input", name))?;
        let index = index.as_str().ok_or_else(|| invalid("load_input", index))?;
        self.input_meta("load_input", name)?;
        Ok(format!("{name}[{index}]"))
    }

    /// Emits a strided load expression, one index identifier per dimension.
    fn make_load(&self, args: &[TemplateValue]) -> Result<String, TemplateError> {
        let Some((name, indices)) = args.split_first() else {
            return Err(TemplateError::InvalidArgs {
                generator: "make_load".to_string(),
                message: "expected (input, indices...)".to_string(),
            });
        };
        let name = name.as_str().ok_or_else(|| invalid("make_load", name))?;
        let meta = self.input_meta("make_load", name)?;

        if indices.len() != meta.strides.len() {
            return Err(TemplateError::InvalidArgs {
                generator: "make_load".to_string(),
                message: format!(
                    "expected {} indices for '{name}', got {}",
                    meta.strides.len(),
                    indices.len()
                ),
            });
        }

        let terms = indices
            .iter()
            .zip(meta.strides.iter())
            .map(|(index, stride)| {
                index
                    .as_str()
                    .map(|index| format!("{index} * {stride}"))
                    .ok_or_else(|| invalid("make_load", index))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(format!("{name}[{}]", terms.join(" + ")))
    }

    fn store_output(
        &self,
        args: &[TemplateValue],
        state: &mut RenderState,
    ) -> Result<String, TemplateError> {
        let (index, value, mask) = match args {
            [index, value] => (index, value, None),
            [index, value, mask] => (index, value, Some(mask)),
            _ => {
                return Err(TemplateError::InvalidArgs {
                    generator: "store_output".to_string(),
                    message: "expected (index, value) or (index, value, mask)".to_string(),
                });
            }
        };

        if state.store.is_some() {
            return Err(TemplateError::InvalidArgs {
                generator: "store_output".to_string(),
                message: "output stored twice".to_string(),
            });
        }

        state.store = Some(StoreOutput {
            index: required_str("store_output", index)?,
            value: required_str("store_output", value)?,
            mask: match mask {
                Some(mask) => Some(required_str("store_output", mask)?),
                None => None,
            },
        });

        Ok(STORE_OUTPUT_TOKEN.to_string())
    }

    /// Applies a named epilogue to a value expression.
    fn modification(&self, args: &[TemplateValue]) -> Result<String, TemplateError> {
        let Some((op, rest)) = args.split_first() else {
            return Err(TemplateError::InvalidArgs {
                generator: "modification".to_string(),
                message: "expected (op, values...)".to_string(),
            });
        };
        let op = op.as_str().ok_or_else(|| invalid("modification", op))?;

        let values = rest
            .iter()
            .map(|value| required_str("modification", value))
            .collect::<Result<Vec<_>, _>>()?;

        match (op, values.as_slice()) {
            ("relu", [value]) => Ok(format!("max({value}, 0)")),
            ("mul", [lhs, rhs]) => Ok(format!("({lhs} * {rhs})")),
            ("add", [lhs, rhs]) => Ok(format!("({lhs} + {rhs})")),
            _ => Err(TemplateError::InvalidArgs {
                generator: "modification".to_string(),
                message: format!("unsupported modification '{op}' with {} values", values.len()),
            }),
        }
    }

    fn argdefs(&self) -> String {
        let mut defs: Vec<String> = self
            .inputs
            .iter()
            .map(|meta| format!("const {}* {}", c_type(meta.dtype), meta.name))
            .collect();
        defs.push(format!("{}* out", c_type(self.layout.dtype)));
        defs.join(", ")
    }

    fn gen_defines(&self) -> String {
        self.defines
            .iter()
            .map(|(name, value)| format!("constexpr int {name} = {value};"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn register_deferred(
        &self,
        hooks: &mut HookTable,
        state: RenderState,
    ) -> Result<(), TemplateError> {
        if !state.declared_inputs.is_empty() {
            let mut defs: Vec<String> = state
                .declared_inputs
                .iter()
                .filter_map(|name| self.inputs.iter().find(|meta| &meta.name == name))
                .map(|meta| format!("const {}* {}", c_type(meta.dtype), meta.name))
                .collect();
            defs.push(format!("{}* out", c_type(self.layout.dtype)));

            let signature = format!("void {}({})", self.kernel_name, defs.join(", "));
            hooks.register(DEF_KERNEL_TOKEN, move || signature)?;
        }

        if let Some(store) = state.store {
            let fragment = match &store.mask {
                Some(mask) => format!(
                    "if ({mask}) out[{}] = {};",
                    store.index, store.value
                ),
                None => format!("out[{}] = {};", store.index, store.value),
            };
            hooks.register(STORE_OUTPUT_TOKEN, move || fragment)?;
        }

        Ok(())
    }

    fn input_meta(&self, generator: &str, name: &str) -> Result<&TensorMeta, TemplateError> {
        self.inputs
            .iter()
            .find(|meta| meta.name == name)
            .ok_or_else(|| TemplateError::InvalidArgs {
                generator: generator.to_string(),
                message: format!("unknown input '{name}'"),
            })
    }

    fn shape_arg(
        &self,
        generator: &str,
        args: &[TemplateValue],
    ) -> Result<(&[usize], usize), TemplateError> {
        let (name, dim) = self.name_dim_args(generator, args)?;
        if name == "OUT" {
            return Ok((&self.layout.shape, dim));
        }
        Ok((&self.input_meta(generator, name)?.shape, dim))
    }

    fn strides_arg(
        &self,
        generator: &str,
        args: &[TemplateValue],
    ) -> Result<(&[usize], usize), TemplateError> {
        let (name, dim) = self.name_dim_args(generator, args)?;
        if name == "OUT" {
            return Ok((&self.layout.strides, dim));
        }
        Ok((&self.input_meta(generator, name)?.strides, dim))
    }

    fn name_dim_args<'a>(
        &self,
        generator: &str,
        args: &'a [TemplateValue],
    ) -> Result<(&'a str, usize), TemplateError> {
        let [name, dim] = args else {
            return Err(TemplateError::InvalidArgs {
                generator: generator.to_string(),
                message: "expected (tensor, dim)".to_string(),
            });
        };
        let name = name.as_str().ok_or_else(|| invalid(generator, name))?;
        let dim = dim.as_int().ok_or_else(|| invalid(generator, dim))? as usize;
        Ok((name, dim))
    }
}

fn required_str(generator: &str, value: &TemplateValue) -> Result<String, TemplateError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(generator, value))
}

fn invalid(generator: &str, value: &TemplateValue) -> TemplateError {
    TemplateError::InvalidArgs {
        generator: generator.to_string(),
        message: format!("unexpected argument {value:?}"),
    }
}

/// C type name used in rendered source for an element type.
pub fn c_type(elem: ElemType) -> &'static str {
    match elem {
        ElemType::F64 => "double",
        ElemType::F32 => "float",
        ElemType::F16 => "half",
        ElemType::I32 => "int32_t",
        ElemType::I8 => "int8_t",
    }
}

fn parse_args(src: &str) -> Result<Vec<TemplateValue>, String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut chars = src.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if !in_string => {
                in_string = true;
                current.push(c);
            }
            '"' if in_string => {
                in_string = false;
                current.push(c);
            }
            '\\' if in_string => {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ',' if !in_string => {
                push_arg(&mut args, &mut current)?;
            }
            _ => current.push(c),
        }
    }

    if in_string {
        return Err("unterminated string literal".to_string());
    }
    push_arg(&mut args, &mut current)?;

    Ok(args)
}


fn push_arg(args: &mut Vec<TemplateValue>, current: &mut String) -> Result<(), String> {
    let arg = current.trim();
    if arg.is_empty() {
        current.clear();
        return Ok(());
    }

    let value = if let Some(stripped) = arg.strip_prefix('"') {
        let inner = stripped
            .strip_suffix('"')
            .ok_or_else(|| format!("malformed string literal '{arg}'"))?;
        TemplateValue::Str(inner.replace("\\\"", "\""))
    } else if let Ok(int) = arg.parse::<i64>() {
        TemplateValue::Int(int)
    } else if arg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        TemplateValue::Ident(arg.to_string())
    } else {
        return Err(format!("unrecognized argument '{arg}'"));
    };

    args.push(value);
    current.clear();
    Ok(())
}
