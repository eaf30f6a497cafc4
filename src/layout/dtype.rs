use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a variable. `Bins` marks a binned variable whose elements are index ranges
/// into a data-array buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float64,
    Float32,
    Int64,
    Int32,
    Bool,
    String,
    Vector3,
    Bins,
}

impl DType {
    pub fn is_float(self) -> bool {
        matches!(self, DType::Float64 | DType::Float32)
    }

    pub fn is_int(self) -> bool {
        matches!(self, DType::Int64 | DType::Int32)
    }

    pub fn is_numeric(self) -> bool {
        self.is_float() || self.is_int()
    }

    /// Common type for arithmetic between two numeric types.
    pub fn promote(a: DType, b: DType) -> Option<DType> {
        if !a.is_numeric() || !b.is_numeric() {
            return None;
        }
        Some(match (a, b) {
            (DType::Float32, DType::Float32) => DType::Float32,
            (x, y) if x.is_float() || y.is_float() => DType::Float64,
            (DType::Int32, DType::Int32) => DType::Int32,
            _ => DType::Int64,
        })
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Float64 => "float64",
            DType::Float32 => "float32",
            DType::Int64 => "int64",
            DType::Int32 => "int32",
            DType::Bool => "bool",
            DType::String => "string",
            DType::Vector3 => "vector3",
            DType::Bins => "DataArrayView",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DType::Float64, DType::Int64, Some(DType::Float64))]
    #[case(DType::Float32, DType::Float32, Some(DType::Float32))]
    #[case(DType::Float32, DType::Int32, Some(DType::Float64))]
    #[case(DType::Int32, DType::Int64, Some(DType::Int64))]
    #[case(DType::Bool, DType::Int64, None)]
    #[case(DType::String, DType::Float64, None)]
    fn test_promotion(#[case] a: DType, #[case] b: DType, #[case] expected: Option<DType>) {
        assert_eq!(DType::promote(a, b), expected);
    }
}
