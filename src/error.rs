//! Error type shared by every operation of the core.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Dimension mismatch: expected {expected}, got {actual}.")]
    DimensionMismatch { expected: String, actual: String },
    /// `tag` is `<Kind>::<Dim>` (e.g. `Coord::x`); `name` is empty for unnamed defaults.
    #[error("{context}could not find variable with tag {tag} and name `{name}`.")]
    DimensionNotFound {
        context: String,
        tag: String,
        name: String,
    },
    #[error("Expected binned data: {0}")]
    NotBinnedData(String),
    #[error("Unsupported unit as result of {op}: {detail}")]
    UnsupportedUnit { op: String, detail: String },
    #[error("Unit mismatch: expected {expected}, got {actual}.")]
    UnitMismatch { expected: String, actual: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Variances error: {0}")]
    VariancesError(String),
    #[error("Slice out of range: {0}")]
    SliceOutOfRange(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// A dimension label that is absent from `context` (usually a dims summary).
    pub fn dim_not_found(context: impl std::fmt::Display, dim: impl std::fmt::Display) -> Self {
        CoreError::DimensionNotFound {
            context: format!("{} ", context),
            tag: format!("Dim::{}", dim),
            name: String::new(),
        }
    }

    /// A named metadata entry of the given kind (`Coord`, `Mask`, `Attr`) is absent.
    pub fn item_not_found(
        context: impl std::fmt::Display,
        kind: &str,
        key: impl std::fmt::Display,
        name: &str,
    ) -> Self {
        CoreError::DimensionNotFound {
            context: format!("{} ", context),
            tag: format!("{}::{}", kind, key),
            name: name.to_string(),
        }
    }

    pub fn mismatch(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> Self {
        CoreError::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn unit_mismatch(expected: impl std::fmt::Display, actual: impl std::fmt::Display) -> Self {
        CoreError::UnitMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
