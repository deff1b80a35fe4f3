//! Numeric precision selection

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Floating point precisions a pipeline can be loaded with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DType {
    /// 32-bit floating point (full precision)
    F32,
    /// 16-bit floating point (IEEE 754)
    F16,
    /// 16-bit brain floating point (reduced precision for accelerators)
    BF16,
    /// 64-bit floating point
    F64,
}

impl DType {
    /// Look up a dtype by name in the known-type table
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "float32" | "fp32" | "f32" => Ok(DType::F32),
            "float16" | "fp16" | "f16" | "half" => Ok(DType::F16),
            "bfloat16" | "bf16" => Ok(DType::BF16),
            "float64" | "fp64" | "f64" | "double" => Ok(DType::F64),
            _ => Err(Error::UnsupportedDType(name.to_string())),
        }
    }

    /// Canonical name, as reported in generation records
    pub fn name(&self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::F16 => "float16",
            DType::BF16 => "bfloat16",
            DType::F64 => "float64",
        }
    }

    /// Convert to the inference backend's dtype
    pub fn to_candle(&self) -> candle_core::DType {
        match self {
            DType::F32 => candle_core::DType::F32,
            DType::F16 => candle_core::DType::F16,
            DType::BF16 => candle_core::DType::BF16,
            DType::F64 => candle_core::DType::F64,
        }
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl TryFrom<String> for DType {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::from_name(&s)
    }
}

impl From<DType> for String {
    fn from(dtype: DType) -> Self {
        dtype.name().to_string()
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_table() {
        assert_eq!(DType::from_name("float32").unwrap(), DType::F32);
        assert_eq!(DType::from_name("BF16").unwrap(), DType::BF16);
        assert_eq!(DType::from_name("half").unwrap(), DType::F16);
        assert_eq!(DType::from_name("float64").unwrap(), DType::F64);
    }

    #[test]
    fn test_unknown_name_is_lookup_error() {
        let err = DType::from_name("int4").unwrap_err();
        assert!(matches!(err, Error::UnsupportedDType(name) if name == "int4"));
    }

    #[test]
    fn test_canonical_names_round_trip() {
        for dtype in [DType::F32, DType::F16, DType::BF16, DType::F64] {
            assert_eq!(DType::from_name(dtype.name()).unwrap(), dtype);
        }
    }
}
