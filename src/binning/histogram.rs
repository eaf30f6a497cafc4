//! Histogramming: per-bin sums without materializing bins.
use super::bin::{binners, cell, flatten, kept_metadata, output_dims, RowLists};
use super::rebin::rebin;
use crate::dataset::DataArray;
use crate::error::{CoreError, Result};
use crate::layout::Dim;
use crate::variable::{ElementArray, Variable};
use log::debug;
use rayon::prelude::*;

/// Histogram of `x` along the dim of `edges`.
///
/// Dense data with a bin-edge coord for that dim is rebinned. Otherwise `x` is a 1-D table or
/// binned data, and every row adds its value to the bin its coord falls in. The result holds
/// float64 sums with the unit of `x`.
pub fn histogram(x: &DataArray, edges: &Variable) -> Result<DataArray> {
    histogram_nd(x, std::slice::from_ref(edges))
}

/// Histogram along several dims at once, in the order given.
pub fn histogram_nd(x: &DataArray, edges: &[Variable]) -> Result<DataArray> {
    if edges.is_empty() {
        return Err(CoreError::InvalidArgument("histogram needs at least one set of edges".into()));
    }
    let dims: Vec<Dim> = edges
        .iter()
        .map(|e| match e.dims().labels() {
            [dim] => Ok(dim.clone()),
            _ => Err(CoreError::InvalidArgument(format!("bin edges must be 1-D, got {}", e.dims()))),
        })
        .collect::<Result<_>>()?;
    if !x.is_binned() && dims.iter().all(|d| x.is_edges(d.as_str()).unwrap_or(false)) {
        return dims.iter().zip(edges).try_fold(x.clone(), |acc, (dim, e)| rebin(&acc, dim.as_str(), e));
    }
    let content_dtype = if x.is_binned() { x.data().bins()?.data()?.dtype() } else { x.dtype() };
    if !content_dtype.is_numeric() {
        return Err(CoreError::TypeError(format!("cannot histogram data of dtype {}", content_dtype)));
    }

    let erase: Vec<Dim> = if x.is_binned() {
        dims.iter().filter(|d| x.dims().contains(d.as_str())).cloned().collect()
    } else {
        Vec::new()
    };
    let RowLists { kept, row_dim, table, lists } = flatten(x, &erase)?;
    let binners = binners(&table, &row_dim, edges, &[])?;
    let out_dims = output_dims(&kept, &binners)?;
    let cells: usize = binners.iter().map(|b| b.size()).product();

    let content = table.data();
    let mask = table.row_mask(row_dim.as_str())?;
    let (unit, values, variances) = content.dense_in(content.dims())?;
    let values = values.to_f64()?;
    let variances = variances.map(|v| v.to_f64()).transpose()?;

    let accumulate = |rows: &Vec<usize>, source: &[f64]| -> Vec<f64> {
        let mut sums = vec![0.0; cells];
        for &row in rows {
            if mask.as_ref().map_or(false, |m| m[row]) {
                continue;
            }
            if let Some(c) = cell(&binners, row) {
                sums[c] += source[row];
            }
        }
        sums
    };
    let sums: Vec<f64> = lists.par_iter().flat_map_iter(|rows| accumulate(rows, &values)).collect();
    let sum_variances = variances
        .as_ref()
        .map(|v| lists.par_iter().flat_map_iter(|rows| accumulate(rows, v)).collect::<Vec<f64>>());
    debug!(
        "histogram: {} rows into {} bins of {}",
        lists.iter().map(Vec::len).sum::<usize>(),
        out_dims.volume(),
        out_dims
    );

    let data = Variable::from_values(
        out_dims,
        unit,
        ElementArray::Float64(sums),
        sum_variances.map(ElementArray::Float64),
    )?;
    let mut out = DataArray::new(data);
    out.set_name(x.name());
    if x.is_binned() {
        kept_metadata(x, &erase, &mut out)?;
    }
    for (dim, e) in dims.into_iter().zip(edges) {
        out.set_coord(dim, e.copy()?)?;
    }
    Ok(out)
}
