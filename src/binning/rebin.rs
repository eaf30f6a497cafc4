//! Redistribution of histogrammed data onto new bin edges.
use super::edges::edge_values;
use crate::dataset::DataArray;
use crate::display::summary;
use crate::error::{CoreError, Result};
use crate::layout::{Dim, Dimensions};
use crate::units::UnitPolicy;
use crate::variable::{ElementArray, Variable};
use log::debug;
use rayon::prelude::*;

/// Overlap of old bin `i` with new bin `j` as a fraction of the old bin width, for every
/// overlapping pair in order.
fn overlaps(old: &[f64], new: &[f64]) -> Vec<(usize, usize, f64)> {
    let mut out = Vec::with_capacity(old.len() + new.len());
    let (mut i, mut j) = (0, 0);
    while i + 1 < old.len() && j + 1 < new.len() {
        let lo = old[i].max(new[j]);
        let hi = old[i + 1].min(new[j + 1]);
        if hi > lo {
            out.push((i, j, (hi - lo) / (old[i + 1] - old[i])));
        }
        if old[i + 1] <= new[j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

/// `dims` reordered so that `dim` is innermost.
fn dim_innermost(dims: &Dimensions, dim: &str) -> Result<Dimensions> {
    let extent = dims.extent(dim)?;
    let mut out = dims.erase(dim)?;
    out.push(Dim::from(dim), extent)?;
    Ok(out)
}

/// Maps every line along `dim` (innermost in `inner`) to a new line of `new_len` elements.
fn map_lines<T, F>(inner: &Dimensions, dim: &str, new_len: usize, values: Vec<T>, apply: F) -> Result<(Dimensions, Vec<T>)>
where
    T: Send + Sync + Clone + Default,
    F: Fn(&[T], &mut [T]) + Sync,
{
    let old_len = inner.extent(dim)?;
    let lines = if old_len == 0 { 0 } else { inner.volume() / old_len };
    let mut out = vec![T::default(); lines * new_len];
    if lines > 0 && new_len > 0 {
        out.par_chunks_mut(new_len)
            .zip(values.par_chunks(old_len))
            .for_each(|(new_line, line)| apply(line, new_line));
    }
    Ok((inner.resize(dim, new_len)?, out))
}

/// Restores the original dim order of a result computed with `dim` innermost.
fn restore_order(original: &Dimensions, var: Variable) -> Result<Variable> {
    var.transpose(original.labels())?.copy()
}

fn rebin_values(var: &Variable, dim: &str, pairs: &[(usize, usize, f64)], new_len: usize) -> Result<Variable> {
    let inner = dim_innermost(var.dims(), dim)?;
    let (unit, values, variances) = var.dense_in(&inner)?;
    let dtype = values.dtype();
    let sum_lines = |source: Vec<f64>, squared: bool| {
        map_lines(&inner, dim, new_len, source, |line, new_line| {
            for &(i, j, frac) in pairs {
                new_line[j] += line[i] * if squared { frac * frac } else { frac };
            }
        })
    };
    let (out_dims, new_values) = sum_lines(values.to_f64()?, false)?;
    let new_variances = match variances {
        Some(v) => Some(ElementArray::from_f64(dtype, sum_lines(v.to_f64()?, true)?.1)?),
        None => None,
    };
    let out = Variable::from_values(out_dims, unit, ElementArray::from_f64(dtype, new_values)?, new_variances)?;
    let target = var.dims().resize(dim, new_len)?;
    restore_order(&target, out)
}

fn rebin_mask(mask: &Variable, dim: &str, pairs: &[(usize, usize, f64)], new_len: usize) -> Result<Variable> {
    let inner = dim_innermost(mask.dims(), dim)?;
    let flags = mask.dense_in(&inner)?.1.to_bool()?;
    let (out_dims, new_flags) = map_lines(&inner, dim, new_len, flags, |line, new_line| {
        for &(i, j, _) in pairs {
            new_line[j] |= line[i];
        }
    })?;
    let out = Variable::from_values(out_dims, mask.unit(), ElementArray::Bool(new_flags), None)?;
    restore_order(&mask.dims().resize(dim, new_len)?, out)
}

pub fn rebin(x: &DataArray, dim: &str, edges: &Variable) -> Result<DataArray> {
    rebin_with_policy(x, dim, edges, &UnitPolicy::default())
}

/// Rebins `x` from its bin-edge coord for `dim` onto `edges`, assuming uniform density within
/// each old bin. Variances scale by the square of the overlap fraction. Masks along `dim` are
/// combined with OR; other coords and attrs depending on `dim` are dropped.
pub fn rebin_with_policy(x: &DataArray, dim: &str, edges: &Variable, policy: &UnitPolicy) -> Result<DataArray> {
    if x.is_binned() {
        return Err(CoreError::InvalidArgument(
            "rebin requires dense data; use histogram or bin for binned data".into(),
        ));
    }
    let new = edge_values(edges, dim)?;
    if !x.is_edges(dim)? {
        return Err(CoreError::InvalidArgument(format!(
            "rebin requires a bin-edge coordinate for {}",
            dim
        )));
    }
    let old_coord = x.coord(dim)?;
    let old = edge_values(old_coord, dim)?;
    policy.expect_extensive("rebin", &x.unit())?;
    if old_coord.unit() != edges.unit() {
        return Err(CoreError::unit_mismatch(old_coord.unit(), edges.unit()));
    }
    if !x.dtype().is_float() {
        return Err(CoreError::TypeError(format!("rebin requires float data, got {}", x.dtype())));
    }

    let new_len = new.len() - 1;
    let pairs = overlaps(&old, &new);
    debug!(
        "rebin {} of {}: {} -> {} bins, {} overlaps",
        dim,
        summary(x.data()),
        old.len() - 1,
        new_len,
        pairs.len()
    );

    let data = rebin_values(x.data(), dim, &pairs, new_len)?;
    let mut out = DataArray::new(data);
    out.set_name(x.name());
    out.set_coord(Dim::from(dim), edges.copy()?)?;
    for (key, coord) in x.coords() {
        if !coord.dims().contains(dim) {
            out.set_coord(key.clone(), coord.clone())?;
        }
    }
    for (name, mask) in x.masks() {
        let mask = if mask.dims().contains(dim) { rebin_mask(mask, dim, &pairs, new_len)? } else { mask.clone() };
        out.set_mask(name.clone(), mask)?;
    }
    for (key, attr) in x.attrs() {
        if !attr.dims().contains(dim) {
            out.set_attr(key.clone(), attr.clone())?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;
    use crate::variable::creation::{array, array_1d};
    use rstest::rstest;

    fn unit_bins(n: usize) -> DataArray {
        let data = array(&["x"], &[n], vec![1.0; n], Some(vec![1.0; n].into()), Unit::counts()).unwrap();
        let edges: Vec<f64> = (0..=n).map(|i| i as f64).collect();
        DataArray::new(data).with_coord("x", array_1d("x", edges, Unit::m()).unwrap()).unwrap()
    }

    #[rstest]
    #[case(vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0], vec![2.0; 5])]
    #[case(vec![0.0, 1.5, 10.0], vec![1.5, 8.5])]
    #[case(vec![-5.0, 0.5, 20.0], vec![0.5, 9.5])]
    #[case(vec![2.0, 3.0], vec![1.0])]
    fn test_rebin_conserves_mass(#[case] new_edges: Vec<f64>, #[case] expected: Vec<f64>) {
        let edges = array_1d("x", new_edges, Unit::m()).unwrap();
        let out = rebin(&unit_bins(10), "x", &edges).unwrap();
        let values = out.data().values::<f64>().unwrap();
        assert_eq!(values.len(), expected.len());
        for (got, want) in values.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-12, "{:?} vs {:?}", values, expected);
        }
        assert_eq!(out.coord("x").unwrap(), &edges);
    }

    #[test]
    fn test_rebin_variances_use_squared_fractions() {
        let edges = array_1d("x", vec![0.0, 0.5, 1.0], Unit::m()).unwrap();
        let out = rebin(&unit_bins(1), "x", &edges).unwrap();
        assert_eq!(out.data().values::<f64>().unwrap(), vec![0.5, 0.5]);
        assert_eq!(out.data().variances::<f64>().unwrap(), vec![0.25, 0.25]);
    }

    #[test]
    fn test_rebin_keeps_outer_dims_and_or_masks() {
        let data = array(&["x", "y"], &[2, 2], vec![1.0, 10.0, 2.0, 20.0], None, Unit::counts()).unwrap();
        let da = DataArray::new(data)
            .with_coord("x", array_1d("x", vec![0.0, 1.0, 2.0], Unit::m()).unwrap())
            .unwrap()
            .with_coord("y", array_1d("y", vec![5.0, 6.0], Unit::s()).unwrap())
            .unwrap()
            .with_coord("pos", array_1d("x", vec![7.0, 8.0], Unit::m()).unwrap())
            .unwrap()
            .with_mask("m", array_1d("x", vec![false, true], Unit::dimensionless()).unwrap())
            .unwrap();
        let edges = array_1d("x", vec![0.0, 2.0], Unit::m()).unwrap();
        let out = rebin(&da, "x", &edges).unwrap();
        assert_eq!(out.dims().to_string(), "{x: 1, y: 2}");
        assert_eq!(out.data().values::<f64>().unwrap(), vec![3.0, 30.0]);
        assert_eq!(out.mask("m").unwrap().values::<bool>().unwrap(), vec![true]);
        assert!(out.coord("y").unwrap().is_same(da.coord("y").unwrap()));
        assert!(out.coord("pos").is_err());
    }

    #[test]
    fn test_rebin_errors() {
        let da = unit_bins(4);
        let unsorted = array_1d("x", vec![0.0, 3.0, 2.0], Unit::m()).unwrap();
        assert!(matches!(rebin(&da, "x", &unsorted), Err(CoreError::InvalidArgument(_))));
        let wrong_unit = array_1d("x", vec![0.0, 2.0], Unit::s()).unwrap();
        assert!(matches!(rebin(&da, "x", &wrong_unit), Err(CoreError::UnitMismatch { .. })));

        let per_metre = DataArray::new(array_1d("x", vec![1.0; 4], Unit::m()).unwrap())
            .with_coord("x", array_1d("x", vec![0.0, 1.0, 2.0, 3.0, 4.0], Unit::m()).unwrap())
            .unwrap();
        let edges = array_1d("x", vec![0.0, 4.0], Unit::m()).unwrap();
        assert!(matches!(rebin(&per_metre, "x", &edges), Err(CoreError::UnsupportedUnit { .. })));

        let points = DataArray::new(array_1d("x", vec![1.0; 2], Unit::counts()).unwrap())
            .with_coord("x", array_1d("x", vec![0.0, 1.0], Unit::m()).unwrap())
            .unwrap();
        assert!(matches!(rebin(&points, "x", &edges), Err(CoreError::InvalidArgument(_))));
    }
}
