//! Kernel source templates for the tuned candidate kernels.
//!
//! The rendered source is an inspection artifact carried on each template
//! choice; execution goes through the blocked kernels in [`crate::kernels`].
//! Rendering still runs the full two-phase hook mechanism, so a template that
//! fails to render excludes its instantiation from the choice set.

use autosel_common::element::ElemType;
use autosel_runtime::meta::{Layout, TensorMeta};
use autosel_runtime::template::{KernelTemplate, TemplateError, TemplateKernel};

/// Tiled matrix multiply.
pub const MATMUL_TEMPLATE: KernelTemplate = KernelTemplate {
    name: "tiled_mm",
    source: r#"
{{def_kernel("A", "B")}} {
    {{gen_defines()}}
    const int M = {{size("A", 0)}};
    const int K = {{size("A", 1)}};
    const int N = {{size("B", 1)}};
    float acc[BLOCK_M * BLOCK_N];
    for (int m0 = 0; m0 < M; m0 += BLOCK_M)
    for (int k0 = 0; k0 < K; k0 += BLOCK_K)
    for (int n0 = 0; n0 < N; n0 += BLOCK_N)
    for (int i = m0; i < min(m0 + BLOCK_M, M); i++)
    for (int p = k0; p < min(k0 + BLOCK_K, K); p++) {
        float lhs = {{make_load("A", "i", "p")}};
        for (int j = n0; j < min(n0 + BLOCK_N, N); j++) {
            acc[(i - m0) * BLOCK_N + (j - n0)] += lhs * {{make_load("B", "p", "j")}};
        }
    }
    int xindex = 0;
    bool xmask = xindex < M * N;
    float acc_val = acc[xindex];
    {{store_output("xindex", "acc_val", "xmask")}}
}
"#,
};

/// Tiled matrix multiply with bias add and relu epilogue.
pub const LINEAR_RELU_TEMPLATE: KernelTemplate = KernelTemplate {
    name: "tiled_linear_relu",
    source: r#"
{{def_kernel("A", "B", "BIAS")}} {
    {{gen_defines()}}
    const int M = {{size("A", 0)}};
    const int K = {{size("A", 1)}};
    const int N = {{size("B", 1)}};
    float acc[BLOCK_M * BLOCK_N];
    for (int m0 = 0; m0 < M; m0 += BLOCK_M)
    for (int k0 = 0; k0 < K; k0 += BLOCK_K)
    for (int n0 = 0; n0 < N; n0 += BLOCK_N)
    for (int i = m0; i < min(m0 + BLOCK_M, M); i++)
    for (int p = k0; p < min(k0 + BLOCK_K, K); p++) {
        float lhs = {{make_load("A", "i", "p")}};
        for (int j = n0; j < min(n0 + BLOCK_N, N); j++) {
            acc[(i - m0) * BLOCK_N + (j - n0)] += lhs * {{make_load("B", "p", "j")}};
        }
    }
    int xindex = 0;
    bool xmask = xindex < M * N;
    float biased = acc[xindex] + {{load_input("BIAS", "xindex % N")}};
    float acc_val = {{modification("relu", "biased")}};
    {{store_output("xindex", "acc_val", "xmask")}}
}
"#,
};

/// Tiled matrix multiply with a multiplicative mask epilogue.
pub const MASKED_MATMUL_TEMPLATE: KernelTemplate = KernelTemplate {
    name: "tiled_masked_mm",
    source: r#"
{{def_kernel("A", "B", "MASK")}} {
    {{gen_defines()}}
    const int M = {{size("A", 0)}};
    const int K = {{size("A", 1)}};
    const int N = {{size("B", 1)}};
    float acc[BLOCK_M * BLOCK_N];
    for (int m0 = 0; m0 < M; m0 += BLOCK_M)
    for (int k0 = 0; k0 < K; k0 += BLOCK_K)
    for (int n0 = 0; n0 < N; n0 += BLOCK_N)
    for (int i = m0; i < min(m0 + BLOCK_M, M); i++)
    for (int p = k0; p < min(k0 + BLOCK_K, K); p++) {
        float lhs = {{make_load("A", "i", "p")}};
        for (int j = n0; j < min(n0 + BLOCK_N, N); j++) {
            acc[(i - m0) * BLOCK_N + (j - n0)] += lhs * {{make_load("B", "p", "j")}};
        }
    }
    int xindex = 0;
    bool xmask = xindex < M * N;
    float raw = acc[xindex];
    float mask_val = {{load_input("MASK", "xindex")}};
    float acc_val = {{modification("mul", "raw", "mask_val")}};
    {{store_output("xindex", "acc_val", "xmask")}}
}
"#,
};

/// Tiled direct 2d convolution.
pub const CONV_TEMPLATE: KernelTemplate = KernelTemplate {
    name: "tiled_conv2d",
    source: r#"
{{def_kernel("X", "W")}} {
    {{gen_defines()}}
    const int C = {{size("X", 1)}};
    const int H = {{size("X", 2)}};
    const int WIDTH = {{size("X", 3)}};
    const int KH = {{size("W", 2)}};
    const int KW = {{size("W", 3)}};
    const int H_OUT = {{size("OUT", 2)}};
    const int W_OUT = {{size("OUT", 3)}};
    for (int oc0 = 0; oc0 < {{size("OUT", 1)}}; oc0 += BLOCK_M)
    for (int ox0 = 0; ox0 < W_OUT; ox0 += BLOCK_N) {
        float acc = 0;
        for (int ic = 0; ic < C; ic++)
        for (int ky = 0; ky < KH; ky++)
        for (int kx = 0; kx < KW; kx++) {
            int iy = oy * STRIDE_H + ky * DILATION_H - PADDING_H;
            int ix = ox * STRIDE_W + kx * DILATION_W - PADDING_W;
            bool in_bounds = iy >= 0 && iy < H && ix >= 0 && ix < WIDTH;
            if (in_bounds) {
                acc += {{make_load("X", "ni", "ic", "iy", "ix")}} * {{make_load("W", "oc", "ic", "ky", "kx")}};
            }
        }
        int xindex = 0;
        bool xmask = xindex < H_OUT * W_OUT;
        {{store_output("xindex", "acc", "xmask")}}
    }
}
"#,
};

/// Whether the tuned template kernels support the given element type.
///
/// The blocked kernels accumulate in `f32`-width units, so 64-bit floats are
/// excluded and fall back to the library path.
pub fn template_supports(elem: ElemType) -> bool {
    !matches!(elem, ElemType::F64)
}

/// Render one template instantiation into final kernel source.
pub fn render_kernel(
    template: &KernelTemplate,
    kernel_name: &str,
    inputs: Vec<TensorMeta>,
    layout: Layout,
    defines: &[(&str, i64)],
) -> Result<String, TemplateError> {
    if !template_supports(layout.dtype) {
        return Err(TemplateError::UnsupportedElemType(layout.dtype));
    }
    for input in &inputs {
        if !template_supports(input.dtype) {
            return Err(TemplateError::UnsupportedElemType(input.dtype));
        }
    }

    let mut kernel = TemplateKernel::new(kernel_name, inputs, layout);
    for (name, value) in defines {
        kernel = kernel.with_define(*name, *value);
    }

    kernel.render(template)?.finalize_all()
}
