use autosel_common::element::ElemType;
use half::f16;
use num_traits::ToPrimitive;

/// A storage element of a [tensor](crate::Tensor).
pub trait Element: Copy + Send + Sync + core::fmt::Debug + ToPrimitive + 'static {
    /// The runtime descriptor of this element type.
    const ELEM: ElemType;

    /// Additive identity.
    fn zero() -> Self;

    /// Convert from an `f64`, rounding as needed.
    fn from_f64(value: f64) -> Self;

    /// Convert to an `f64`.
    fn to_f64(self) -> f64;
}

/// A floating point element usable on the tuned kernel paths.
pub trait FloatElement: Element {
    /// Convert from an `f32`, rounding as needed.
    fn from_f32(value: f32) -> Self;

    /// Convert to an `f32`, possibly losing precision.
    fn to_f32(self) -> f32;
}

impl Element for f32 {
    const ELEM: ElemType = ElemType::F32;

    fn zero() -> Self {
        0.0
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl FloatElement for f32 {
    fn from_f32(value: f32) -> Self {
        value
    }

    fn to_f32(self) -> f32 {
        self
    }
}

impl Element for f64 {
    const ELEM: ElemType = ElemType::F64;

    fn zero() -> Self {
        0.0
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

impl FloatElement for f64 {
    fn from_f32(value: f32) -> Self {
        value as f64
    }

    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Element for f16 {
    const ELEM: ElemType = ElemType::F16;

    fn zero() -> Self {
        f16::from_f32(0.0)
    }

    fn from_f64(value: f64) -> Self {
        f16::from_f64(value)
    }

    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
}

impl FloatElement for f16 {
    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }

    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

impl Element for i32 {
    const ELEM: ElemType = ElemType::I32;

    fn zero() -> Self {
        0
    }

    fn from_f64(value: f64) -> Self {
        value as i32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Element for i8 {
    const ELEM: ElemType = ElemType::I8;

    fn zero() -> Self {
        0
    }

    fn from_f64(value: f64) -> Self {
        value as i8
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}
