//! Offsets of a strided view, iterated in the element order of a target shape.
use super::dims::{Dimensions, Shape};
use crate::error::{CoreError, Result};
use smallvec::SmallVec;

/// Walks the flat buffer offsets of a view with labeled `dims`/`strides` in the row-major
/// order of `target`. Dimensions of `target` the view lacks are broadcast with stride 0,
/// so `target` may also be a transposition of the view's dims.
#[derive(Debug, Clone)]
pub struct ViewIndex {
    shape: Shape,
    strides: Shape,
    counter: Shape,
    current: usize,
    remaining: usize,
}

impl ViewIndex {
    pub fn new(target: &Dimensions, dims: &Dimensions, strides: &[usize], offset: usize) -> Result<Self> {
        if !target.includes(dims) {
            return Err(CoreError::mismatch(target, dims));
        }
        let mapped: Shape = target
            .labels()
            .iter()
            .map(|label| dims.index_of(label.as_str()).map_or(0, |i| strides[i]))
            .collect();
        Ok(Self {
            shape: target.shape().iter().copied().collect(),
            strides: mapped,
            counter: SmallVec::from_elem(0, target.ndim()),
            current: offset,
            remaining: target.volume(),
        })
    }
}

impl Iterator for ViewIndex {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let out = self.current;
        self.remaining -= 1;
        for d in (0..self.shape.len()).rev() {
            self.counter[d] += 1;
            self.current += self.strides[d];
            if self.counter[d] < self.shape[d] {
                break;
            }
            self.current -= self.strides[d] * self.shape[d];
            self.counter[d] = 0;
        }
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ViewIndex {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_iteration() {
        let dims = Dimensions::new(&["x", "y"], &[2, 3]).unwrap();
        let strides = dims.contiguous_strides();
        let offsets: Vec<usize> = ViewIndex::new(&dims, &dims, &strides, 0).unwrap().collect();
        assert_eq!(offsets, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_transposed_iteration() {
        let dims = Dimensions::new(&["x", "y"], &[2, 3]).unwrap();
        let target = Dimensions::new(&["y", "x"], &[3, 2]).unwrap();
        let strides = dims.contiguous_strides();
        let offsets: Vec<usize> = ViewIndex::new(&target, &dims, &strides, 0).unwrap().collect();
        assert_eq!(offsets, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_broadcast_and_offset() {
        let dims = Dimensions::new(&["y"], &[2]).unwrap();
        let target = Dimensions::new(&["x", "y"], &[3, 2]).unwrap();
        let offsets: Vec<usize> = ViewIndex::new(&target, &dims, &[1], 4).unwrap().collect();
        assert_eq!(offsets, vec![4, 5, 4, 5, 4, 5]);
    }

    #[test]
    fn test_scalar_and_empty() {
        let scalar = Dimensions::scalar();
        assert_eq!(ViewIndex::new(&scalar, &scalar, &[], 7).unwrap().collect::<Vec<_>>(), vec![7]);
        let empty = Dimensions::new(&["x"], &[0]).unwrap();
        assert_eq!(ViewIndex::new(&empty, &empty, &[1], 0).unwrap().count(), 0);
    }

    #[test]
    fn test_extent_mismatch_rejected() {
        let dims = Dimensions::new(&["x"], &[2]).unwrap();
        let target = Dimensions::new(&["x"], &[3]).unwrap();
        assert!(ViewIndex::new(&target, &dims, &[1], 0).is_err());
    }
}
