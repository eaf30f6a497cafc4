//! Partitioning table rows into bins by edges or groups.
use super::edges::{edge_values, EdgeIndex};
use crate::bins::container::{expect_row_table, ranges_from_sizes};
use crate::dataset::DataArray;
use crate::error::{CoreError, Result};
use crate::layout::{DType, Dim, Dimensions};
use crate::variable::Variable;
use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;

/// What to bin by. Each edge or group variable is 1-D; its dim names both the output dim and
/// the content coord that is binned.
#[derive(Debug, Clone, Default)]
pub struct BinOptions {
    pub edges: Vec<Variable>,
    pub groups: Vec<Variable>,
    pub erase: Vec<Dim>,
}

impl BinOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edges(mut self, edges: Variable) -> Self {
        self.edges.push(edges);
        self
    }

    pub fn group(mut self, groups: Variable) -> Self {
        self.groups.push(groups);
        self
    }

    pub fn erase(mut self, dim: impl Into<Dim>) -> Self {
        self.erase.push(dim.into());
        self
    }
}

/// Rows of a table grouped by the outer elements that keep their dims.
pub(crate) struct RowLists {
    pub kept: Dimensions,
    pub row_dim: Dim,
    pub table: DataArray,
    pub lists: Vec<Vec<usize>>,
}

/// Flattens `x` into per-outer-element row lists. A dense `x` must be a 1-D table and yields
/// one list of all rows. A binned `x` concatenates the bins along `erase`; bins under an outer
/// mask depending on an erased dim contribute no rows.
pub(crate) fn flatten(x: &DataArray, erase: &[Dim]) -> Result<RowLists> {
    if !x.is_binned() {
        if x.dims().ndim() != 1 {
            return Err(CoreError::InvalidArgument(format!(
                "dense input must be a 1-D table, got {}",
                x.dims()
            )));
        }
        let row_dim = x.dims().labels()[0].clone();
        if let Some(other) = erase.iter().find(|d| **d != row_dim) {
            return Err(CoreError::dim_not_found(format!("DataArray {}", x.dims()), other.as_str()));
        }
        let rows = (0..x.dims().volume()).collect();
        return Ok(RowLists { kept: Dimensions::scalar(), row_dim, table: x.clone(), lists: vec![rows] });
    }

    let mut kept = x.dims().clone();
    let mut erased = Dimensions::scalar();
    for dim in erase {
        let extent = x.dims().extent(dim.as_str())?;
        kept = kept.erase(dim.as_str())?;
        erased.push(dim.clone(), extent)?;
    }
    let mut target = kept.clone();
    for (dim, extent) in erased.iter() {
        target.push(dim.clone(), extent)?;
    }
    let (ranges, row_dim, table) = x.data().bins_in(&target)?;
    expect_row_table(table.data(), &row_dim)?;

    let mut skip = vec![false; target.volume()];
    for mask in x.masks().values().filter(|m| erase.iter().any(|d| m.dims().contains(d.as_str()))) {
        let flags = mask.dense_in(&target)?.1.to_bool()?;
        skip.iter_mut().zip(flags).for_each(|(s, f)| *s |= f);
    }

    let inner = erased.volume();
    let lists = (0..kept.volume())
        .map(|o| {
            (o * inner..(o + 1) * inner)
                .filter(|&t| !skip[t])
                .flat_map(|t| ranges[t].rows())
                .collect()
        })
        .collect();
    Ok(RowLists { kept, row_dim, table, lists })
}

/// Outer metadata of `x` that survives erasing `erase`.
pub(crate) fn kept_metadata(x: &DataArray, erase: &[Dim], out: &mut DataArray) -> Result<()> {
    let independent = |v: &Variable| !erase.iter().any(|d| v.dims().contains(d.as_str()));
    for (dim, coord) in x.coords().iter().filter(|(_, v)| independent(v)) {
        out.set_coord(dim.clone(), coord.clone())?;
    }
    for (name, mask) in x.masks().iter().filter(|(_, v)| independent(v)) {
        out.set_mask(name.clone(), mask.clone())?;
    }
    for (dim, attr) in x.attrs().iter().filter(|(_, v)| independent(v)) {
        out.set_attr(dim.clone(), attr.clone())?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum GroupKey {
    Bits(u64),
    Text(String),
}

fn number_key(x: f64) -> GroupKey {
    // -0.0 and 0.0 are the same group.
    GroupKey::Bits(if x == 0.0 { 0.0f64.to_bits() } else { x.to_bits() })
}

fn group_keys(var: &Variable) -> Result<Vec<GroupKey>> {
    match var.dtype() {
        DType::String => Ok(var.values::<String>()?.into_iter().map(GroupKey::Text).collect()),
        d if d.is_numeric() => Ok(var.values_array()?.to_f64()?.into_iter().map(number_key).collect()),
        other => Err(CoreError::TypeError(format!("cannot group by dtype {}", other))),
    }
}

/// Maps a row's coordinate to its index along one output dim.
pub(crate) enum Binner {
    Edges { dim: Dim, index: EdgeIndex, column: Vec<f64> },
    Groups { dim: Dim, size: usize, index: HashMap<GroupKey, usize>, column: Vec<GroupKey> },
}

impl Binner {
    fn coord_column<'t>(table: &'t DataArray, bounds: &Variable, dim: &str, row_dim: &Dim) -> Result<&'t Variable> {
        let coord = table.coord(dim)?;
        if !coord.dims().is_1d_along(row_dim.as_str()) {
            return Err(CoreError::mismatch(table.dims(), coord.dims()));
        }
        if coord.unit() != bounds.unit() {
            return Err(CoreError::unit_mismatch(bounds.unit(), coord.unit()));
        }
        Ok(coord)
    }

    pub fn edges(table: &DataArray, row_dim: &Dim, edges: &Variable) -> Result<Binner> {
        let dim = single_dim(edges)?;
        let index = EdgeIndex::new(edge_values(edges, dim.as_str())?);
        let coord = Self::coord_column(table, edges, dim.as_str(), row_dim)?;
        if !coord.dtype().is_numeric() {
            return Err(CoreError::TypeError(format!("cannot bin coord {} of dtype {}", dim, coord.dtype())));
        }
        let column = coord.values_array()?.to_f64()?;
        Ok(Binner::Edges { dim, index, column })
    }

    pub fn groups(table: &DataArray, row_dim: &Dim, groups: &Variable) -> Result<Binner> {
        let dim = single_dim(groups)?;
        let keys = group_keys(groups)?;
        let mut index = HashMap::with_capacity(keys.len());
        for (i, key) in keys.into_iter().enumerate() {
            if index.insert(key, i).is_some() {
                return Err(CoreError::InvalidArgument(format!("duplicate group labels along {}", dim)));
            }
        }
        let coord = Self::coord_column(table, groups, dim.as_str(), row_dim)?;
        let column = group_keys(coord)?;
        Ok(Binner::Groups { dim, size: groups.volume(), index, column })
    }

    pub fn dim(&self) -> &Dim {
        match self {
            Binner::Edges { dim, .. } | Binner::Groups { dim, .. } => dim,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Binner::Edges { index, .. } => index.bins(),
            Binner::Groups { size, .. } => *size,
        }
    }

    pub fn find(&self, row: usize) -> Option<usize> {
        match self {
            Binner::Edges { index, column, .. } => index.find(column[row]),
            Binner::Groups { index, column, .. } => index.get(&column[row]).copied(),
        }
    }
}

fn single_dim(var: &Variable) -> Result<Dim> {
    match var.dims().labels() {
        [dim] => Ok(dim.clone()),
        _ => Err(CoreError::InvalidArgument(format!(
            "bin edges and groups must be 1-D, got {}",
            var.dims()
        ))),
    }
}

/// Binners ordered groups first, then edges, as the output dims are.
pub(crate) fn binners(table: &DataArray, row_dim: &Dim, edges: &[Variable], groups: &[Variable]) -> Result<Vec<Binner>> {
    let mut out = Vec::with_capacity(edges.len() + groups.len());
    for g in groups {
        out.push(Binner::groups(table, row_dim, g)?);
    }
    for e in edges {
        out.push(Binner::edges(table, row_dim, e)?);
    }
    Ok(out)
}

/// Row-major cell of `row` across all binners, `None` if any binner rejects it.
pub(crate) fn cell(binners: &[Binner], row: usize) -> Option<usize> {
    binners.iter().try_fold(0, |acc, b| b.find(row).map(|k| acc * b.size() + k))
}

/// Output dims: `kept` followed by one dim per binner.
pub(crate) fn output_dims(kept: &Dimensions, binners: &[Binner]) -> Result<Dimensions> {
    let mut dims = kept.clone();
    for b in binners {
        if dims.contains(b.dim().as_str()) {
            return Err(CoreError::InvalidArgument(format!(
                "cannot bin along {}: the input already has that dim; erase it first",
                b.dim()
            )));
        }
        dims.push(b.dim().clone(), b.size())?;
    }
    Ok(dims)
}

pub fn bin_with(x: &DataArray, options: &BinOptions) -> Result<DataArray> {
    bin(x, &options.edges, &options.groups, &options.erase)
}

/// Partitions the rows of `x` into bins along `groups` and `edges`, after concatenating any
/// existing bins along `erase`. Rows outside the edges or matching no group are dropped. Rows
/// keep their input order within a bin.
pub fn bin(x: &DataArray, edges: &[Variable], groups: &[Variable], erase: &[Dim]) -> Result<DataArray> {
    if edges.is_empty() && groups.is_empty() && erase.is_empty() {
        return Ok(x.clone());
    }
    let RowLists { kept, row_dim, table, lists } = flatten(x, erase)?;
    let binners = binners(&table, &row_dim, edges, groups)?;
    let dims = output_dims(&kept, &binners)?;
    let cells: usize = binners.iter().map(Binner::size).product();

    let entries: Vec<(usize, usize)> = lists
        .iter()
        .enumerate()
        .flat_map(|(o, rows)| rows.iter().map(move |&r| (o, r)))
        .collect();
    let targets: Vec<Option<usize>> = entries
        .par_iter()
        .map(|&(o, row)| cell(&binners, row).map(|c| o * cells + c))
        .collect();

    // Stable counting sort by target bin.
    let mut sizes = vec![0usize; dims.volume()];
    for t in targets.iter().flatten() {
        sizes[*t] += 1;
    }
    let mut cursor: Vec<usize> = ranges_from_sizes(sizes.iter().copied()).iter().map(|r| r.begin).collect();
    let kept_rows = targets.iter().flatten().count();
    let mut sorted = vec![0usize; kept_rows];
    for (&(_, row), target) in entries.iter().zip(&targets) {
        if let Some(t) = target {
            sorted[cursor[*t]] = row;
            cursor[*t] += 1;
        }
    }
    debug!(
        "bin: {} rows in, {} dropped, {} bins of {}",
        entries.len(),
        entries.len() - kept_rows,
        dims.volume(),
        dims
    );

    let content = table.take_rows(row_dim.as_str(), &sorted)?;
    let data = Variable::from_bins(dims, ranges_from_sizes(sizes), row_dim, content)?;
    let mut out = DataArray::new(data);
    out.set_name(x.name());
    if x.is_binned() {
        kept_metadata(x, erase, &mut out)?;
    }
    for bounds in groups.iter().chain(edges) {
        out.set_coord(single_dim(bounds)?, bounds.copy()?)?;
    }
    Ok(out)
}

/// Groups rows by their coord values, e.g. for categorical labels.
pub fn group_by(x: &DataArray, groups: &Variable) -> Result<DataArray> {
    bin(x, &[], std::slice::from_ref(groups), &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Slice;
    use crate::units::Unit;
    use crate::variable::creation::{array, array_1d};

    fn table() -> DataArray {
        let data = array(&["row"], &[6], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], None, Unit::counts()).unwrap();
        DataArray::new(data)
            .with_coord("x", array_1d("row", vec![0.5, -1.0, 2.5, 0.1, 9.0, 1.5], Unit::m()).unwrap())
            .unwrap()
            .with_coord("label", array_1d("row", vec![1i64, 2, 1, 2, 1, 3], Unit::dimensionless()).unwrap())
            .unwrap()
    }

    fn x_edges(values: Vec<f64>) -> Variable {
        array_1d("x", values, Unit::m()).unwrap()
    }

    fn bin_contents(da: &DataArray) -> Vec<Vec<f64>> {
        let b = da.data().bins().unwrap();
        let values = b.data().unwrap().data().values::<f64>().unwrap();
        let begin = b.begin().unwrap().values::<i64>().unwrap();
        let end = b.end().unwrap().values::<i64>().unwrap();
        begin.iter().zip(&end).map(|(&s, &e)| values[s as usize..e as usize].to_vec()).collect()
    }

    #[test]
    fn test_bin_by_edges_drops_outliers_and_keeps_order() {
        let out = bin(&table(), &[x_edges(vec![0.0, 1.0, 2.0, 3.0])], &[], &[]).unwrap();
        assert_eq!(out.dims().to_string(), "{x: 3}");
        assert_eq!(bin_contents(&out), vec![vec![1.0, 4.0], vec![6.0], vec![3.0]]);
        assert!(out.is_edges("x").unwrap());
    }

    #[test]
    fn test_bin_by_groups_and_edges() {
        let labels = array_1d("label", vec![1i64, 2], Unit::dimensionless()).unwrap();
        let options = BinOptions::new().edges(x_edges(vec![0.0, 2.0, 4.0])).group(labels);
        let out = bin_with(&table(), &options).unwrap();
        assert_eq!(out.dims().to_string(), "{label: 2, x: 2}");
        assert_eq!(bin_contents(&out), vec![vec![1.0], vec![3.0], vec![4.0], vec![]]);
    }

    #[test]
    fn test_identity_without_binners() {
        let t = table();
        let out = bin(&t, &[], &[], &[]).unwrap();
        assert!(out.data().is_same(t.data()));
    }

    #[test]
    fn test_rebin_existing_bins_with_erase() {
        let first = bin(&table(), &[x_edges(vec![0.0, 1.0, 2.0, 3.0])], &[], &[]).unwrap();
        let out = bin(&first, &[x_edges(vec![0.0, 3.0])], &[], &[Dim::from("x")]).unwrap();
        assert_eq!(bin_contents(&out), vec![vec![1.0, 4.0, 6.0, 3.0]]);
        let coarse = out.coord("x").unwrap().values::<f64>().unwrap();
        assert_eq!(coarse, vec![0.0, 3.0]);
    }

    #[test]
    fn test_outer_masks_on_erased_dims_drop_rows() {
        let labels = array_1d("label", vec![1i64, 2], Unit::dimensionless()).unwrap();
        let grouped = group_by(&table(), &labels)
            .unwrap()
            .with_mask("bad", array_1d("label", vec![false, true], Unit::dimensionless()).unwrap())
            .unwrap();
        let out = bin(&grouped, &[x_edges(vec![0.0, 10.0])], &[], &[Dim::from("label")]).unwrap();
        assert_eq!(bin_contents(&out), vec![vec![1.0, 3.0, 5.0]]);
        assert!(out.masks().is_empty());

        let kept = bin(&grouped, &[x_edges(vec![0.0, 10.0])], &[], &[]).unwrap();
        assert_eq!(kept.dims().to_string(), "{label: 2, x: 1}");
        assert!(kept.mask("bad").is_ok());
        assert_eq!(bin_contents(&kept), vec![vec![1.0, 3.0, 5.0], vec![4.0]]);
    }

    #[test]
    fn test_bin_errors() {
        let t = table();
        let wrong_unit = array_1d("x", vec![0.0, 1.0], Unit::s()).unwrap();
        assert!(matches!(bin(&t, &[wrong_unit], &[], &[]), Err(CoreError::UnitMismatch { .. })));
        let missing = array_1d("y", vec![0.0, 1.0], Unit::m()).unwrap();
        assert!(matches!(bin(&t, &[missing], &[], &[]), Err(CoreError::DimensionNotFound { .. })));
        let unsorted = x_edges(vec![1.0, 0.0]);
        assert!(matches!(bin(&t, &[unsorted], &[], &[]), Err(CoreError::InvalidArgument(_))));
        let two_d = DataArray::new(array(&["a", "b"], &[1, 1], vec![1.0], None, Unit::counts()).unwrap());
        assert!(matches!(bin(&two_d, &[x_edges(vec![0.0, 1.0])], &[], &[]), Err(CoreError::InvalidArgument(_))));
        let sliced = DataArray::new(t.data().slice(&Slice::range("row", 0, 2)).unwrap());
        assert!(matches!(bin(&sliced, &[x_edges(vec![0.0, 1.0])], &[], &[]), Err(CoreError::DimensionNotFound { .. })));
    }
}
