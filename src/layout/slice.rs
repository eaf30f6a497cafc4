use super::dims::{Dim, Dimensions};
use crate::error::{CoreError, Result};
use std::fmt;

/// Selects along one dimension: a single index (the dimension is dropped) or a half-open range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    dim: Dim,
    begin: usize,
    end: Option<usize>,
}

impl Slice {
    pub fn point(dim: impl Into<Dim>, index: usize) -> Self {
        Self { dim: dim.into(), begin: index, end: None }
    }

    pub fn range(dim: impl Into<Dim>, begin: usize, end: usize) -> Self {
        Self { dim: dim.into(), begin, end: Some(end) }
    }

    pub fn dim(&self) -> &Dim {
        &self.dim
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    /// `None` for a point slice.
    pub fn end(&self) -> Option<usize> {
        self.end
    }

    pub fn is_point(&self) -> bool {
        self.end.is_none()
    }

    /// Dims of the selection from `dims`. Fails if the index or range lies outside the extent.
    pub fn sliced_dims(&self, dims: &Dimensions) -> Result<Dimensions> {
        let dim = self.dim.as_str();
        let extent = dims.extent(dim)?;
        match self.end {
            None if self.begin >= extent => Err(CoreError::SliceOutOfRange(format!(
                "index {} is out of range for {} in {}",
                self.begin, dim, dims
            ))),
            None => dims.erase(dim),
            Some(end) if self.begin > end || end > extent => Err(CoreError::SliceOutOfRange(format!(
                "range [{}, {}) is out of range for {} in {}",
                self.begin, end, dim, dims
            ))),
            Some(end) => dims.resize(dim, end - self.begin),
        }
    }

    /// The same selection widened by one element, as applied to bin-edge coordinates.
    pub(crate) fn widened(&self) -> Slice {
        match self.end {
            Some(end) => Slice::range(self.dim.clone(), self.begin, end + 1),
            None => Slice::range(self.dim.clone(), self.begin, self.begin + 2),
        }
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}[{}:{}]", self.dim, self.begin, end),
            None => write!(f, "{}[{}]", self.dim, self.begin),
        }
    }
}
