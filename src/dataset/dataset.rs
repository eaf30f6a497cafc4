//! Named data items sharing one coordinate map.
use super::data_array::{slice_coords, slice_map, validate_aligned, DataArray};
use crate::error::{CoreError, Result};
use crate::layout::{Dim, Dimensions, Slice};
use crate::variable::Variable;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Item {
    data: Variable,
    masks: BTreeMap<String, Variable>,
    attrs: BTreeMap<Dim, Variable>,
}

/// Items may have different dims; every coord must be aligned with the union of item dims.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    dims: Dimensions,
    coords: BTreeMap<Dim, Variable>,
    items: BTreeMap<String, Item>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.items.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn coords(&self) -> &BTreeMap<Dim, Variable> {
        &self.coords
    }

    fn context(&self) -> String {
        format!("Dataset {}", self.dims)
    }

    pub fn coord(&self, dim: &str) -> Result<&Variable> {
        self.coords
            .get(dim)
            .ok_or_else(|| CoreError::item_not_found(self.context(), "Coord", dim, ""))
    }

    pub fn set_coord(&mut self, dim: impl Into<Dim>, coord: Variable) -> Result<()> {
        validate_aligned(&self.dims, &coord)?;
        self.coords.insert(dim.into(), coord);
        Ok(())
    }

    /// Adds or replaces an item holding only data.
    pub fn set_data(&mut self, name: impl Into<String>, data: Variable) -> Result<()> {
        self.dims = Dimensions::merge(&self.dims, data.dims())?;
        self.items.insert(
            name.into(),
            Item { data, masks: BTreeMap::new(), attrs: BTreeMap::new() },
        );
        Ok(())
    }

    /// Adds or replaces an item. Coords of `array` join the shared map; a coord already present
    /// must be equal.
    pub fn insert(&mut self, name: impl Into<String>, array: DataArray) -> Result<()> {
        let dims = Dimensions::merge(&self.dims, array.dims())?;
        let mut coords = self.coords.clone();
        for (dim, coord) in array.coords() {
            match self.coords.get(dim) {
                Some(existing) if existing != coord => {
                    return Err(CoreError::InvalidArgument(format!(
                        "coord {} of the new item does not match the dataset",
                        dim
                    )));
                }
                Some(_) => {}
                None => {
                    validate_aligned(&dims, coord)?;
                    coords.insert(dim.clone(), coord.clone());
                }
            }
        }
        self.dims = dims;
        self.coords = coords;
        self.items.insert(
            name.into(),
            Item {
                data: array.data().clone(),
                masks: array.masks().clone(),
                attrs: array.attrs().clone(),
            },
        );
        Ok(())
    }

    /// The item as a data array, with the shared coords that align with its dims.
    pub fn get(&self, name: &str) -> Result<DataArray> {
        let item = self
            .items
            .get(name)
            .ok_or_else(|| CoreError::item_not_found(self.context(), "Item", name, name))?;
        let mut array = DataArray::new(item.data.clone());
        array.set_name(name);
        for (dim, coord) in &self.coords {
            if validate_aligned(item.data.dims(), coord).is_ok() {
                array.set_coord(dim.clone(), coord.clone())?;
            }
        }
        *array.masks_mut() = item.masks.clone();
        *array.attrs_mut() = item.attrs.clone();
        Ok(array)
    }

    pub fn remove(&mut self, name: &str) -> Result<DataArray> {
        let array = self.get(name)?;
        self.items.remove(name);
        Ok(array)
    }

    /// Slices every item and coord consistently. Items not depending on the dim are shared.
    /// Coords a point slice leaves unaligned become attrs of every item depending on the dim.
    pub fn slice(&self, slice: &Slice) -> Result<Dataset> {
        let dim = slice.dim().as_str();
        if !self.dims.contains(dim) {
            return Err(CoreError::dim_not_found(self.context(), dim));
        }
        let dims = slice.sliced_dims(&self.dims)?;
        let (coords, unaligned) = slice_coords(&self.dims, &self.coords, slice)?;
        let mut items = BTreeMap::new();
        for (name, item) in &self.items {
            let depends = item.data.dims().contains(dim);
            let data = if depends { item.data.slice(slice)? } else { item.data.clone() };
            let mut attrs = slice_map(&self.dims, &item.attrs, slice)?;
            if depends {
                attrs.extend(unaligned.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            items.insert(
                name.clone(),
                Item { data, masks: slice_map(&self.dims, &item.masks, slice)?, attrs },
            );
        }
        Ok(Dataset { dims, coords, items })
    }

    /// Rebins every item depending on `dim`; other items are kept.
    pub fn rebin(&self, dim: &str, edges: &Variable) -> Result<Dataset> {
        let mut out = Dataset::new();
        for name in self.items.keys() {
            let array = self.get(name)?;
            let array = if array.dims().contains(dim) { crate::binning::rebin(&array, dim, edges)? } else { array };
            out.insert(name.clone(), array)?;
        }
        Ok(out)
    }
}
