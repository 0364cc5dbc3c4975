use core::fmt::Display;
use serde::{Deserialize, Serialize};

use autosel_common::element::ElemType;
use autosel_runtime::tune::{AutotuneKey, anchor};

/// Autotune key representative of one matmul-family operation site.
///
/// Dimensions are anchored to powers of two so nearby shapes share one
/// benchmarking pass.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct MatmulKey {
    /// Operation variant (`mm`, `bmm`, `addmm`, ...).
    pub op: String,
    /// Batch size, 1 for rank-2 problems.
    pub batch: usize,
    /// Anchored output rows.
    pub m: usize,
    /// Anchored output columns.
    pub n: usize,
    /// Anchored reduction size.
    pub k: usize,
    /// Element type of the operands.
    pub elem: ElemType,
    /// Whether the left operand view is contiguous.
    pub lhs_contiguous: bool,
    /// Whether the right operand view is contiguous.
    pub rhs_contiguous: bool,
}

impl MatmulKey {
    /// Build the key from the problem dimensions.
    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        op: &str,
        batch: usize,
        m: usize,
        n: usize,
        k: usize,
        elem: ElemType,
        lhs_contiguous: bool,
        rhs_contiguous: bool,
    ) -> Self {
        Self {
            op: op.to_string(),
            batch,
            m: anchor(m, None),
            n: anchor(n, None),
            k: anchor(k, Some(1024)),
            elem,
            lhs_contiguous,
            rhs_contiguous,
        }
    }
}

impl Display for MatmulKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}-b{}-m{}-n{}-k{}-lhs{}-rhs{}",
            self.op,
            self.elem,
            self.batch,
            self.m,
            self.n,
            self.k,
            if self.lhs_contiguous { "c" } else { "s" },
            if self.rhs_contiguous { "c" } else { "s" },
        )
    }
}

impl AutotuneKey for MatmulKey {}

/// Autotune key representative of one 2d convolution site.
#[derive(Hash, Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ConvKey {
    /// Batch size.
    pub batch: usize,
    /// Input channels.
    pub in_channels: usize,
    /// Output channels.
    pub out_channels: usize,
    /// Anchored input height.
    pub height: usize,
    /// Anchored input width.
    pub width: usize,
    /// Kernel height and width.
    pub kernel: (usize, usize),
    /// Stride.
    pub stride: (usize, usize),
    /// Padding.
    pub padding: (usize, usize),
    /// Dilation.
    pub dilation: (usize, usize),
    /// Whether a bias is applied.
    pub has_bias: bool,
    /// Element type of the operands.
    pub elem: ElemType,
}

impl Display for ConvKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "conv2d-{}-b{}-c{}-co{}-h{}-w{}-k{}x{}-s{}x{}-p{}x{}-d{}x{}{}",
            self.elem,
            self.batch,
            self.in_channels,
            self.out_channels,
            self.height,
            self.width,
            self.kernel.0,
            self.kernel.1,
            self.stride.0,
            self.stride.1,
            self.padding.0,
            self.padding.1,
            self.dilation.0,
            self.dilation.1,
            if self.has_bias { "-bias" } else { "" },
        )
    }
}

impl ConvKey {
    /// Build the key from the problem geometry.
    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        batch: usize,
        in_channels: usize,
        out_channels: usize,
        height: usize,
        width: usize,
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        dilation: (usize, usize),
        has_bias: bool,
        elem: ElemType,
    ) -> Self {
        Self {
            batch,
            in_channels,
            out_channels,
            height: anchor(height, None),
            width: anchor(width, None),
            kernel,
            stride,
            padding,
            dilation,
            has_bias,
            elem,
        }
    }
}

impl AutotuneKey for ConvKey {}
