//! Dimension labels and labeled shapes.
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::fmt;

/// A dimension label such as `x` or `tof`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dim(String);

impl Dim {
    pub fn new(label: impl Into<String>) -> Self {
        Dim(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Dim {
    fn from(s: &str) -> Self {
        Dim(s.to_string())
    }
}

impl From<String> for Dim {
    fn from(s: String) -> Self {
        Dim(s)
    }
}

impl From<&Dim> for Dim {
    fn from(d: &Dim) -> Self {
        d.clone()
    }
}

impl Borrow<str> for Dim {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) type Shape = SmallVec<[usize; 4]>;

/// Ordered dimension labels with their extents. Labels are unique.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "DimensionsRecord")]
pub struct Dimensions {
    labels: SmallVec<[Dim; 4]>,
    shape: Shape,
}

/// Wire form of [`Dimensions`], checked on the way in.
#[derive(Deserialize)]
struct DimensionsRecord {
    labels: SmallVec<[Dim; 4]>,
    shape: Shape,
}

impl TryFrom<DimensionsRecord> for Dimensions {
    type Error = CoreError;

    fn try_from(record: DimensionsRecord) -> Result<Self> {
        if record.labels.len() != record.shape.len() {
            return Err(CoreError::InvalidArgument(format!(
                "{} labels given for a shape of {} dimensions",
                record.labels.len(),
                record.shape.len()
            )));
        }
        Self::from_pairs(record.labels.into_iter().zip(record.shape))
    }
}

impl Dimensions {
    pub fn scalar() -> Self {
        Self::default()
    }

    pub fn new(labels: &[&str], shape: &[usize]) -> Result<Self> {
        if labels.len() != shape.len() {
            return Err(CoreError::InvalidArgument(format!(
                "{} labels given for a shape of {} dimensions",
                labels.len(),
                shape.len()
            )));
        }
        Self::from_pairs(labels.iter().map(|l| Dim::from(*l)).zip(shape.iter().copied()))
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (Dim, usize)>) -> Result<Self> {
        let mut dims = Self::scalar();
        for (dim, extent) in pairs {
            dims.push(dim, extent)?;
        }
        Ok(dims)
    }

    /// Appends an innermost dimension.
    pub fn push(&mut self, dim: Dim, extent: usize) -> Result<()> {
        if self.contains(dim.as_str()) {
            return Err(CoreError::InvalidArgument(format!("duplicate dimension {} in {}", dim, self)));
        }
        self.labels.push(dim);
        self.shape.push(extent);
        Ok(())
    }

    pub fn ndim(&self) -> usize {
        self.labels.len()
    }

    pub fn volume(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn labels(&self) -> &[Dim] {
        &self.labels
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Dim, usize)> + '_ {
        self.labels.iter().zip(self.shape.iter().copied())
    }

    pub fn contains(&self, dim: &str) -> bool {
        self.index_of(dim).is_some()
    }

    /// True if the only dimension is `dim`.
    pub fn is_1d_along(&self, dim: &str) -> bool {
        self.ndim() == 1 && self.labels[0].as_str() == dim
    }

    pub fn index_of(&self, dim: &str) -> Option<usize> {
        self.labels.iter().position(|l| l.as_str() == dim)
    }

    pub fn extent(&self, dim: &str) -> Result<usize> {
        self.index_of(dim)
            .map(|i| self.shape[i])
            .ok_or_else(|| CoreError::dim_not_found(format!("Dimensions {}", self), dim))
    }

    /// Removes `dim`, keeping the order of the others.
    pub fn erase(&self, dim: &str) -> Result<Self> {
        let i = self
            .index_of(dim)
            .ok_or_else(|| CoreError::dim_not_found(format!("Dimensions {}", self), dim))?;
        let mut out = self.clone();
        out.labels.remove(i);
        out.shape.remove(i);
        Ok(out)
    }

    /// Changes the extent of an existing dimension.
    pub fn resize(&self, dim: &str, extent: usize) -> Result<Self> {
        let i = self
            .index_of(dim)
            .ok_or_else(|| CoreError::dim_not_found(format!("Dimensions {}", self), dim))?;
        let mut out = self.clone();
        out.shape[i] = extent;
        Ok(out)
    }

    /// True if every dimension of `other` is present here with the same extent.
    pub fn includes(&self, other: &Dimensions) -> bool {
        other.iter().all(|(d, n)| self.extent(d.as_str()).map_or(false, |m| m == n))
    }

    /// Union of labels: `a`'s order followed by the labels only `b` has.
    /// Shared labels must agree in extent.
    pub fn merge(a: &Dimensions, b: &Dimensions) -> Result<Dimensions> {
        let mut out = a.clone();
        for (dim, extent) in b.iter() {
            match a.index_of(dim.as_str()) {
                Some(i) if a.shape[i] != extent => return Err(CoreError::mismatch(a, b)),
                Some(_) => {}
                None => out.push(dim.clone(), extent)?,
            }
        }
        Ok(out)
    }

    /// Row-major strides for a contiguous buffer of this shape.
    pub(crate) fn contiguous_strides(&self) -> Shape {
        let mut strides: Shape = SmallVec::from_elem(1, self.ndim());
        for i in (0..self.ndim().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.shape[i + 1];
        }
        strides
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (dim, extent)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", dim, extent)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_appends_new_labels_and_checks_extents() {
        let a = Dimensions::new(&["x", "y"], &[2, 3]).unwrap();
        let b = Dimensions::new(&["y", "z"], &[3, 4]).unwrap();
        let merged = Dimensions::merge(&a, &b).unwrap();
        assert_eq!(merged.to_string(), "{x: 2, y: 3, z: 4}");

        let c = Dimensions::new(&["y"], &[5]).unwrap();
        assert!(matches!(Dimensions::merge(&a, &c), Err(CoreError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        assert!(Dimensions::new(&["x", "x"], &[1, 2]).is_err());
    }

    #[test]
    fn test_contiguous_strides() {
        let dims = Dimensions::new(&["x", "y", "z"], &[2, 3, 4]).unwrap();
        assert_eq!(dims.contiguous_strides().as_slice(), &[12, 4, 1]);
        assert_eq!(Dimensions::scalar().volume(), 1);
    }

    #[test]
    fn test_missing_dim_error() {
        let dims = Dimensions::new(&["x"], &[2]).unwrap();
        let err = dims.extent("y").unwrap_err();
        assert!(err.to_string().contains("Dim::y"));
    }
}
