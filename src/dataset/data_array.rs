//! A variable with named coordinates, masks and attributes aligned to its dimensions.
use crate::error::{CoreError, Result};
use crate::layout::{DType, Dim, Dimensions, Slice};
use crate::units::Unit;
use crate::variable::Variable;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct DataArray {
    name: String,
    data: Variable,
    coords: BTreeMap<Dim, Variable>,
    masks: BTreeMap<String, Variable>,
    attrs: BTreeMap<Dim, Variable>,
}

/// True if `var` is a bin-edge variable for `dims` along `dim` (one element longer).
pub(crate) fn is_edges_along(dims: &Dimensions, var: &Variable, dim: &str) -> bool {
    match (var.dims().extent(dim), dims.extent(dim)) {
        (Ok(n), Ok(m)) => n == m + 1,
        _ => false,
    }
}

/// Metadata must lie within `dims`; along at most one dim it may be one longer (bin edges).
pub(crate) fn validate_aligned(dims: &Dimensions, var: &Variable) -> Result<()> {
    validate_with(dims, var, false)
}

/// Like [`validate_aligned`], but an attr may also keep the two edges of a dim removed by a
/// point slice.
fn validate_attr(dims: &Dimensions, var: &Variable) -> Result<()> {
    validate_with(dims, var, true)
}

fn validate_with(dims: &Dimensions, var: &Variable, allow_point_edges: bool) -> Result<()> {
    let mut edge_dims = 0;
    for (dim, extent) in var.dims().iter() {
        match dims.extent(dim.as_str()) {
            Ok(n) if n == extent => {}
            Ok(n) if n + 1 == extent => edge_dims += 1,
            Err(_) if allow_point_edges && extent == 2 => edge_dims += 1,
            _ => return Err(CoreError::mismatch(dims, var.dims())),
        }
    }
    if edge_dims > 1 {
        return Err(CoreError::InvalidArgument(format!(
            "metadata with dimensions {} can be bin edges along one dimension only",
            var.dims()
        )));
    }
    Ok(())
}

/// Slices one metadata item. Bin-edge items keep one extra element, so a point slice leaves
/// the two edges of the selected bin.
fn slice_item(dims: &Dimensions, var: &Variable, slice: &Slice) -> Result<Variable> {
    let dim = slice.dim().as_str();
    if !var.dims().contains(dim) {
        return Ok(var.clone());
    }
    if is_edges_along(dims, var, dim) {
        var.slice(&slice.widened())
    } else {
        var.slice(slice)
    }
}

fn copy_map<K: Clone + Ord>(items: &BTreeMap<K, Variable>) -> Result<BTreeMap<K, Variable>> {
    items.iter().map(|(k, v)| Ok((k.clone(), v.copy()?))).collect()
}

pub(crate) fn slice_map<K: Clone + Ord>(
    dims: &Dimensions,
    items: &BTreeMap<K, Variable>,
    slice: &Slice,
) -> Result<BTreeMap<K, Variable>> {
    items.iter().map(|(k, v)| Ok((k.clone(), slice_item(dims, v, slice)?))).collect()
}

/// Slices coords, splitting off those a point slice leaves unaligned: the coord keyed by the
/// sliced dim and bin-edge coords along it. Returns `(coords, unaligned)`.
pub(crate) fn slice_coords(
    dims: &Dimensions,
    coords: &BTreeMap<Dim, Variable>,
    slice: &Slice,
) -> Result<(BTreeMap<Dim, Variable>, BTreeMap<Dim, Variable>)> {
    let dim = slice.dim().as_str();
    let mut aligned = BTreeMap::new();
    let mut unaligned = BTreeMap::new();
    for (key, coord) in coords {
        let moves = slice.is_point()
            && coord.dims().contains(dim)
            && (key.as_str() == dim || is_edges_along(dims, coord, dim));
        let sliced = slice_item(dims, coord, slice)?;
        if moves {
            unaligned.insert(key.clone(), sliced);
        } else {
            aligned.insert(key.clone(), sliced);
        }
    }
    Ok((aligned, unaligned))
}

impl DataArray {
    pub fn new(data: Variable) -> Self {
        Self {
            name: String::new(),
            data,
            coords: BTreeMap::new(),
            masks: BTreeMap::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn data(&self) -> &Variable {
        &self.data
    }

    pub fn dims(&self) -> &Dimensions {
        self.data.dims()
    }

    pub fn unit(&self) -> Unit {
        self.data.unit()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn is_binned(&self) -> bool {
        self.data.is_binned()
    }

    pub fn coords(&self) -> &BTreeMap<Dim, Variable> {
        &self.coords
    }

    pub fn masks(&self) -> &BTreeMap<String, Variable> {
        &self.masks
    }

    pub fn attrs(&self) -> &BTreeMap<Dim, Variable> {
        &self.attrs
    }

    fn context(&self) -> String {
        format!("DataArray {}", self.dims())
    }

    pub fn coord(&self, dim: &str) -> Result<&Variable> {
        self.coords
            .get(dim)
            .ok_or_else(|| CoreError::item_not_found(self.context(), "Coord", dim, ""))
    }

    pub fn mask(&self, name: &str) -> Result<&Variable> {
        self.masks
            .get(name)
            .ok_or_else(|| CoreError::item_not_found(self.context(), "Mask", name, ""))
    }

    pub fn attr(&self, dim: &str) -> Result<&Variable> {
        self.attrs
            .get(dim)
            .ok_or_else(|| CoreError::item_not_found(self.context(), "Attr", dim, ""))
    }

    pub fn set_coord(&mut self, dim: impl Into<Dim>, coord: Variable) -> Result<()> {
        validate_aligned(self.dims(), &coord)?;
        self.coords.insert(dim.into(), coord);
        Ok(())
    }

    pub fn set_mask(&mut self, name: impl Into<String>, mask: Variable) -> Result<()> {
        if mask.dtype() != DType::Bool {
            return Err(CoreError::TypeError(format!("masks must have dtype bool, got {}", mask.dtype())));
        }
        validate_aligned(self.dims(), &mask)?;
        self.masks.insert(name.into(), mask);
        Ok(())
    }

    pub fn set_attr(&mut self, dim: impl Into<Dim>, attr: Variable) -> Result<()> {
        validate_attr(self.dims(), &attr)?;
        self.attrs.insert(dim.into(), attr);
        Ok(())
    }

    pub fn with_coord(mut self, dim: impl Into<Dim>, coord: Variable) -> Result<Self> {
        self.set_coord(dim, coord)?;
        Ok(self)
    }

    pub fn with_mask(mut self, name: impl Into<String>, mask: Variable) -> Result<Self> {
        self.set_mask(name, mask)?;
        Ok(self)
    }

    pub fn with_attr(mut self, dim: impl Into<Dim>, attr: Variable) -> Result<Self> {
        self.set_attr(dim, attr)?;
        Ok(self)
    }

    pub fn remove_coord(&mut self, dim: &str) -> Result<Variable> {
        let context = self.context();
        self.coords
            .remove(dim)
            .ok_or_else(|| CoreError::item_not_found(context, "Coord", dim, ""))
    }

    /// True if the coord for `dim` holds bin edges along `dim`.
    pub fn is_edges(&self, dim: &str) -> Result<bool> {
        Ok(is_edges_along(self.dims(), self.coord(dim)?, dim))
    }

    /// Slices data and metadata consistently. Items not depending on the sliced dim are shared
    /// as-is; bin-edge items keep one extra element. A point slice turns the coord of the sliced
    /// dim and bin-edge coords along it into attrs.
    pub fn slice(&self, slice: &Slice) -> Result<DataArray> {
        let dim = slice.dim().as_str();
        if !self.dims().contains(dim) {
            return Err(CoreError::dim_not_found(self.context(), dim));
        }
        let dims = self.dims();
        let (coords, unaligned) = slice_coords(dims, &self.coords, slice)?;
        let mut attrs = slice_map(dims, &self.attrs, slice)?;
        attrs.extend(unaligned);
        Ok(DataArray {
            name: self.name.clone(),
            data: self.data.slice(slice)?,
            coords,
            masks: slice_map(dims, &self.masks, slice)?,
            attrs,
        })
    }

    /// Deep copy of data and all metadata.
    pub fn copy(&self) -> Result<DataArray> {
        Ok(DataArray {
            name: self.name.clone(),
            data: self.data.copy()?,
            coords: copy_map(&self.coords)?,
            masks: copy_map(&self.masks)?,
            attrs: copy_map(&self.attrs)?,
        })
    }

    /// Replaces the data, keeping metadata. The new data must have the same dims.
    pub(crate) fn with_data(&self, data: Variable) -> Result<DataArray> {
        if data.dims() != self.dims() {
            return Err(CoreError::mismatch(self.dims(), data.dims()));
        }
        Ok(DataArray { data, ..self.clone() })
    }

    /// Selects `rows` along `dim` from data and from every item depending on `dim`.
    pub(crate) fn take_rows(&self, dim: &str, rows: &[usize]) -> Result<DataArray> {
        let take = |var: &Variable| -> Result<Variable> {
            if var.dims().contains(dim) { var.take(dim, rows) } else { Ok(var.clone()) }
        };
        Ok(DataArray {
            name: self.name.clone(),
            data: self.data.take(dim, rows)?,
            coords: self.coords.iter().map(|(k, v)| Ok((k.clone(), take(v)?))).collect::<Result<_>>()?,
            masks: self.masks.iter().map(|(k, v)| Ok((k.clone(), take(v)?))).collect::<Result<_>>()?,
            attrs: self.attrs.iter().map(|(k, v)| Ok((k.clone(), take(v)?))).collect::<Result<_>>()?,
        })
    }

    /// Stacks tables along `dim`. Coords and masks must have the same keys in every part;
    /// attrs present in only some parts are dropped.
    pub(crate) fn concat_rows(dim: &str, parts: &[DataArray]) -> Result<DataArray> {
        let first = parts
            .first()
            .ok_or_else(|| CoreError::InvalidArgument("nothing to concatenate".into()))?;
        for p in &parts[1..] {
            if !p.coords.keys().eq(first.coords.keys()) || !p.masks.keys().eq(first.masks.keys()) {
                return Err(CoreError::InvalidArgument(
                    "bin contents must have the same coords and masks to be concatenated".into(),
                ));
            }
        }
        let join = |items: Vec<&Variable>| -> Result<Variable> {
            if items[0].dims().contains(dim) {
                let owned: Vec<Variable> = items.into_iter().cloned().collect();
                Variable::concat(dim, &owned)
            } else {
                Ok(items[0].clone())
            }
        };
        let data = join(parts.iter().map(|p| &p.data).collect())?;
        let mut out = DataArray::new(data);
        out.name = first.name.clone();
        for key in first.coords.keys() {
            let items = parts.iter().filter_map(|p| p.coords.get(key)).collect();
            out.coords.insert(key.clone(), join(items)?);
        }
        for key in first.masks.keys() {
            let items = parts.iter().filter_map(|p| p.masks.get(key)).collect();
            out.masks.insert(key.clone(), join(items)?);
        }
        for key in first.attrs.keys() {
            let items: Vec<&Variable> = parts.iter().filter_map(|p| p.attrs.get(key)).collect();
            if items.len() == parts.len() {
                out.attrs.insert(key.clone(), join(items)?);
            }
        }
        Ok(out)
    }

    /// Per-row flags along `dim`: OR of every mask whose dims are within `{dim}`.
    /// `None` if no mask applies.
    pub(crate) fn row_mask(&self, dim: &str) -> Result<Option<Vec<bool>>> {
        let n = self.dims().extent(dim)?;
        let target = Dimensions::from_pairs([(Dim::from(dim), n)])?;
        let mut combined: Option<Vec<bool>> = None;
        for mask in self.masks.values().filter(|m| target.includes(m.dims())) {
            let flags = mask.dense_in(&target)?.1.to_bool()?;
            combined = Some(match combined {
                Some(acc) => acc.iter().zip(flags.iter()).map(|(a, b)| *a || *b).collect(),
                None => flags,
            });
        }
        Ok(combined)
    }

    /// Removes coords, masks and attrs depending on `dim`.
    pub(crate) fn drop_dependent(&mut self, dim: &str) {
        self.coords.retain(|_, v| !v.dims().contains(dim));
        self.masks.retain(|_, v| !v.dims().contains(dim));
        self.attrs.retain(|_, v| !v.dims().contains(dim));
    }

    pub(crate) fn masks_mut(&mut self) -> &mut BTreeMap<String, Variable> {
        &mut self.masks
    }

    pub(crate) fn coords_mut(&mut self) -> &mut BTreeMap<Dim, Variable> {
        &mut self.coords
    }

    pub(crate) fn attrs_mut(&mut self) -> &mut BTreeMap<Dim, Variable> {
        &mut self.attrs
    }
}

impl PartialEq for DataArray {
    fn eq(&self, other: &DataArray) -> bool {
        self.data == other.data && self.coords == other.coords && self.masks == other.masks && self.attrs == other.attrs
    }
}
