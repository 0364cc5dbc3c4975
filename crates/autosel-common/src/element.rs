use core::fmt::Display;
use serde::{Deserialize, Serialize};

/// Storage element types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElemType {
    /// 64-bit IEEE float.
    F64,
    /// 32-bit IEEE float.
    F32,
    /// 16-bit IEEE float.
    F16,
    /// 32-bit signed integer.
    I32,
    /// 8-bit signed integer.
    I8,
}

impl ElemType {
    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            ElemType::F64 => 8,
            ElemType::F32 | ElemType::I32 => 4,
            ElemType::F16 => 2,
            ElemType::I8 => 1,
        }
    }

    /// Whether the element is a floating point type.
    pub fn is_float(&self) -> bool {
        matches!(self, ElemType::F64 | ElemType::F32 | ElemType::F16)
    }

    /// Whether the element is an integer type.
    pub fn is_int(&self) -> bool {
        !self.is_float()
    }
}

impl Display for ElemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ElemType::F64 => f.write_str("f64"),
            ElemType::F32 => f.write_str("f32"),
            ElemType::F16 => f.write_str("f16"),
            ElemType::I32 => f.write_str("i32"),
            ElemType::I8 => f.write_str("i8"),
        }
    }
}
