//! Bin-wise concatenation of binned variables and data arrays.
use super::container::{ranges_from_sizes, Bins};
use crate::dataset::DataArray;
use crate::error::{CoreError, Result};
use crate::layout::{Dim, Dimensions};
use crate::variable::variable::{BinnedStorage, Storage};
use crate::variable::{BinRange, Variable};
use log::debug;

impl<'a> Bins<'a> {
    /// Concatenates either with the corresponding bins of `other`, or all bins along `dim`.
    /// Exactly one of the two must be given.
    pub fn concatenate(&self, other: Option<&Variable>, dim: Option<&str>) -> Result<Variable> {
        match (other, dim) {
            (Some(_), Some(_)) => Err(CoreError::InvalidArgument(
                "`other` and `dim` are mutually exclusive".into(),
            )),
            (None, None) => Err(CoreError::InvalidArgument(
                "Reduction along all dims not supported".into(),
            )),
            (Some(other), None) => combine(self.var, other),
            (None, Some(dim)) => concatenate_along(self.var, dim, None),
        }
    }

    /// Concatenates `other` into these bins in place. Every view of the variable observes
    /// the result.
    pub fn append(&self, other: &Variable) -> Result<()> {
        append(self.var, other)
    }
}

/// New binned variable whose bins hold the rows of `a`'s bin followed by `b`'s.
pub(crate) fn combine(a: &Variable, b: &Variable) -> Result<Variable> {
    if !b.is_binned() {
        return Err(CoreError::InvalidArgument(format!(
            "cannot concatenate bins with dense data of dimensions {}",
            b.dims()
        )));
    }
    let dims = Dimensions::merge(a.dims(), b.dims())?;
    let (ra, dim, ba) = a.bins_in(&dims)?;
    let (rb, dim_b, bb) = b.bins_in(&dims)?;
    if dim != dim_b {
        return Err(CoreError::InvalidArgument(format!(
            "bins along {} and {} cannot be concatenated",
            dim, dim_b
        )));
    }
    let shift = ba.dims().extent(dim.as_str())?;
    let joined = DataArray::concat_rows(dim.as_str(), &[ba, bb])?;

    let mut rows = Vec::new();
    let mut sizes = Vec::with_capacity(ra.len());
    for (x, y) in ra.iter().zip(rb.iter()) {
        rows.extend(x.rows());
        rows.extend(y.rows().map(|r| r + shift));
        sizes.push(x.len() + y.len());
    }
    debug!("concatenate bins: {} bins, {} rows", sizes.len(), rows.len());
    let content = joined.take_rows(dim.as_str(), &rows)?;
    Variable::from_bins(dims, ranges_from_sizes(sizes), dim, content)
}

/// Joins all bins along `dim` into one per remaining element. Bins flagged in `skip` (in the
/// order of the remaining dims followed by `dim`) contribute no rows.
pub(crate) fn concatenate_along(var: &Variable, dim: &str, skip: Option<&[bool]>) -> Result<Variable> {
    let extent = var
        .dims()
        .extent(dim)
        .map_err(|_| CoreError::dim_not_found(format!("Variable with dimensions {}", var.dims()), dim))?;
    let out_dims = var.dims().erase(dim)?;
    let mut target = out_dims.clone();
    target.push(Dim::from(dim), extent)?;
    let (ranges, bin_dim, buffer) = var.bins_in(&target)?;
    let kept = |i: usize| skip.map_or(true, |s| !s[i]);

    let mut rows = Vec::new();
    let mut sizes = vec![0usize; out_dims.volume()];
    if extent > 0 {
        for (out, chunk) in ranges.chunks(extent).enumerate() {
            for (j, range) in chunk.iter().enumerate() {
                if kept(out * extent + j) {
                    rows.extend(range.rows());
                    sizes[out] += range.len();
                }
            }
        }
    }
    debug!(
        "concatenate bins along {}: {} -> {} bins, {} rows",
        dim,
        ranges.len(),
        sizes.len(),
        rows.len()
    );
    let content = buffer.take_rows(bin_dim.as_str(), &rows)?;
    Variable::from_bins(out_dims, ranges_from_sizes(sizes), bin_dim, content)
}

fn append(var: &Variable, other: &Variable) -> Result<()> {
    if !var.covers_storage() {
        return Err(CoreError::InvalidArgument(
            "cannot append to bins through a partial view".into(),
        ));
    }
    let combined = combine(var, other)?;
    if combined.dims() != var.dims() {
        return Err(CoreError::mismatch(var.dims(), combined.dims()));
    }
    let (ranges, dim, buffer) = combined.bin_parts()?;
    // The view may be transposed; ranges go back to their storage positions.
    let mut stored = vec![BinRange::default(); ranges.len()];
    for (range, offset) in ranges.into_iter().zip(var.offsets()?) {
        stored[offset] = range;
    }
    var.replace_storage(Storage::Binned(BinnedStorage { ranges: stored, dim, buffer }))
}

impl DataArray {
    /// Bin-wise concatenation of two binned data arrays. Coords are unioned (shared keys must
    /// agree), masks are combined with OR, attrs are kept where both agree.
    pub fn concatenate_bins(&self, other: &DataArray) -> Result<DataArray> {
        let data = combine(self.data(), other.data())?;
        let mut out = DataArray::new(data);
        out.set_name(self.name());
        for (dim, coord) in self.coords() {
            if let Some(theirs) = other.coords().get(dim) {
                if theirs != coord {
                    return Err(CoreError::InvalidArgument(format!("coords for {} do not match", dim)));
                }
            }
            out.set_coord(dim.clone(), coord.clone())?;
        }
        for (dim, coord) in other.coords() {
            if !self.coords().contains_key(dim) {
                out.set_coord(dim.clone(), coord.clone())?;
            }
        }
        for (name, mask) in self.masks() {
            let mask = match other.masks().get(name) {
                Some(theirs) => mask.logical_or(theirs)?,
                None => mask.copy()?,
            };
            out.set_mask(name.clone(), mask)?;
        }
        for (name, mask) in other.masks() {
            if !self.masks().contains_key(name) {
                out.set_mask(name.clone(), mask.copy()?)?;
            }
        }
        for (dim, attr) in self.attrs() {
            if other.attrs().get(dim) == Some(attr) {
                out.set_attr(dim.clone(), attr.clone())?;
            }
        }
        Ok(out)
    }

    /// Joins all bins along `dim`. Bins under an outer mask depending on `dim` are left out;
    /// metadata depending on `dim` is dropped.
    pub fn concatenate_bins_along(&self, dim: &str) -> Result<DataArray> {
        let extent = self.dims().extent(dim)?;
        let mut target = self.dims().erase(dim)?;
        target.push(Dim::from(dim), extent)?;
        let mut skip: Option<Vec<bool>> = None;
        for mask in self.masks().values().filter(|m| m.dims().contains(dim)) {
            let flags = mask.dense_in(&target)?.1.to_bool()?;
            skip = Some(match skip {
                Some(acc) => acc.iter().zip(&flags).map(|(a, b)| *a || *b).collect(),
                None => flags,
            });
        }
        let data = concatenate_along(self.data(), dim, skip.as_deref())?;
        let mut kept = self.clone();
        kept.drop_dependent(dim);
        let mut out = DataArray::new(data);
        out.set_name(self.name());
        *out.coords_mut() = kept.coords().clone();
        *out.masks_mut() = kept.masks().clone();
        *out.attrs_mut() = kept.attrs().clone();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::bins;
    use crate::layout::Slice;
    use crate::units::Unit;
    use crate::variable::creation::{array, array_1d};

    fn table(values: Vec<f64>) -> DataArray {
        let n = values.len();
        DataArray::new(array_1d("row", values, Unit::counts()).unwrap())
            .with_coord("x", array_1d("row", (0..n).map(|i| i as f64).collect::<Vec<_>>(), Unit::m()).unwrap())
            .unwrap()
    }

    fn binned(values: Vec<f64>, begin: Vec<i64>, end: Vec<i64>) -> Variable {
        let b = array_1d("y", begin, Unit::dimensionless()).unwrap();
        let e = array_1d("y", end, Unit::dimensionless()).unwrap();
        bins(Some(&b), Some(&e), "row", &table(values)).unwrap()
    }

    fn bin_values(var: &Variable) -> Vec<Vec<f64>> {
        let b = var.bins().unwrap();
        let data = b.data().unwrap().data().values::<f64>().unwrap();
        let begin = b.begin().unwrap().values::<i64>().unwrap();
        let end = b.end().unwrap().values::<i64>().unwrap();
        begin.iter().zip(&end).map(|(&s, &e)| data[s as usize..e as usize].to_vec()).collect()
    }

    #[test]
    fn test_concatenate_other_interleaves_bins() {
        let a = binned(vec![1.0, 2.0, 3.0], vec![0, 1], vec![1, 3]);
        let b = binned(vec![10.0, 20.0], vec![1, 0], vec![2, 1]);
        let out = a.bins().unwrap().concatenate(Some(&b), None).unwrap();
        assert_eq!(bin_values(&out), vec![vec![1.0, 20.0], vec![2.0, 3.0, 10.0]]);
        assert_eq!(bin_values(&a), vec![vec![1.0], vec![2.0, 3.0]]);
    }

    #[test]
    fn test_concatenate_argument_errors() {
        let a = binned(vec![1.0], vec![0], vec![1]);
        let dense = array_1d("y", vec![1.0], Unit::counts()).unwrap();
        let b = a.bins().unwrap();
        assert!(matches!(b.concatenate(Some(&a), Some("y")), Err(CoreError::InvalidArgument(_))));
        assert!(matches!(b.concatenate(None, None), Err(CoreError::InvalidArgument(_))));
        assert!(matches!(b.concatenate(Some(&dense), None), Err(CoreError::InvalidArgument(_))));
        assert!(matches!(dense.bins(), Err(CoreError::NotBinnedData(_))));
    }

    #[test]
    fn test_concatenate_along_dim() {
        let data = table(vec![1.0, 2.0, 3.0, 4.0]);
        let begin = array(&["x", "y"], &[2, 2], vec![0i64, 1, 2, 3], None, Unit::dimensionless()).unwrap();
        let var = bins(Some(&begin), None, "row", &data).unwrap();
        let along_y = var.bins().unwrap().concatenate(None, Some("y")).unwrap();
        assert_eq!(along_y.dims().to_string(), "{x: 2}");
        assert_eq!(bin_values(&along_y), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let along_x = var.bins().unwrap().concatenate(None, Some("x")).unwrap();
        assert_eq!(bin_values(&along_x), vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
    }

    #[test]
    fn test_append_is_visible_through_aliases() {
        let a = binned(vec![1.0, 2.0], vec![0, 1], vec![1, 2]);
        let alias = a.clone();
        let b = binned(vec![5.0, 6.0], vec![0, 1], vec![1, 2]);
        a.bins().unwrap().append(&b).unwrap();
        assert_eq!(bin_values(&alias), vec![vec![1.0, 5.0], vec![2.0, 6.0]]);

        let partial = a.slice(&Slice::range("y", 0, 1)).unwrap();
        assert!(matches!(partial.bins().unwrap().append(&b), Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_data_array_concatenation_merges_metadata() {
        let mask_a = array_1d("y", vec![true, false], Unit::dimensionless()).unwrap();
        let mask_b = array_1d("y", vec![false, true], Unit::dimensionless()).unwrap();
        let a = DataArray::new(binned(vec![1.0, 2.0], vec![0, 1], vec![1, 2]))
            .with_mask("m", mask_a)
            .unwrap()
            .with_attr("y", array_1d("y", vec![1.0, 2.0], Unit::s()).unwrap())
            .unwrap();
        let b = DataArray::new(binned(vec![3.0, 4.0], vec![0, 1], vec![1, 2]))
            .with_mask("m", mask_b)
            .unwrap()
            .with_coord("y", array_1d("y", vec![0.0, 1.0], Unit::m()).unwrap())
            .unwrap();
        let out = a.concatenate_bins(&b).unwrap();
        assert_eq!(out.mask("m").unwrap().values::<bool>().unwrap(), vec![true, true]);
        assert!(out.coord("y").is_ok());
        assert!(out.attr("y").is_err());
    }

    #[test]
    fn test_data_array_concatenation_along_skips_masked_bins() {
        let da = DataArray::new(binned(vec![1.0, 2.0, 3.0], vec![0, 1, 2], vec![1, 2, 3]))
            .with_mask("m", array_1d("y", vec![false, true, false], Unit::dimensionless()).unwrap())
            .unwrap();
        let out = da.concatenate_bins_along("y").unwrap();
        assert_eq!(out.dims().ndim(), 0);
        assert!(out.masks().is_empty());
        assert_eq!(out.data().bins().unwrap().sum().unwrap().value::<f64>().unwrap(), 4.0);
    }
}
