//! Labeled multi-dimensional arrays with a unit and optional variances.
//!
//! A `Variable` is a strided view onto shared storage. Cloning a `Variable` yields another
//! view of the same buffer; slicing narrows the view; `copy` produces independent storage.
use super::element_array::{Element, ElementArray};
use crate::dataset::DataArray;
use crate::error::{CoreError, Result};
use crate::layout::dims::Shape;
use crate::layout::{DType, Dim, Dimensions, Slice, ViewIndex};
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Half-open row range `[begin, end)` of one bin in the buffer of a binned variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BinRange {
    pub begin: usize,
    pub end: usize,
}

impl BinRange {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.begin
    }

    pub fn rows(&self) -> std::ops::Range<usize> {
        self.begin..self.end
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DenseStorage {
    pub unit: Unit,
    pub values: ElementArray,
    pub variances: Option<ElementArray>,
}

/// Ranges into `buffer` along `dim`. Ranges may overlap and need not cover the buffer.
#[derive(Debug, Clone)]
pub(crate) struct BinnedStorage {
    pub ranges: Vec<BinRange>,
    pub dim: Dim,
    pub buffer: DataArray,
}

#[derive(Debug, Clone)]
pub(crate) enum Storage {
    Dense(DenseStorage),
    Binned(BinnedStorage),
}

impl Storage {
    fn len(&self) -> usize {
        match self {
            Storage::Dense(d) => d.values.len(),
            Storage::Binned(b) => b.ranges.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    dims: Dimensions,
    strides: Shape,
    offset: usize,
    storage: Arc<RwLock<Storage>>,
}

impl Variable {
    /// Wraps storage whose length already matches `dims`.
    pub(crate) fn from_storage(dims: Dimensions, storage: Storage) -> Variable {
        Variable {
            strides: dims.contiguous_strides(),
            dims,
            offset: 0,
            storage: Arc::new(RwLock::new(storage)),
        }
    }

    pub fn from_values(
        dims: Dimensions,
        unit: Unit,
        values: ElementArray,
        variances: Option<ElementArray>,
    ) -> Result<Variable> {
        if values.len() != dims.volume() {
            return Err(CoreError::mismatch(
                format!("{} elements for {}", dims.volume(), dims),
                format!("{} elements", values.len()),
            ));
        }
        if let Some(v) = &variances {
            check_variances(&values, v)?;
        }
        Ok(Self::from_storage(dims, Storage::Dense(DenseStorage { unit, values, variances })))
    }

    pub(crate) fn from_bins(dims: Dimensions, ranges: Vec<BinRange>, dim: Dim, buffer: DataArray) -> Result<Variable> {
        let extent = buffer.dims().extent(dim.as_str())?;
        if ranges.len() != dims.volume() {
            return Err(CoreError::mismatch(
                format!("{} bins for {}", dims.volume(), dims),
                format!("{} bins", ranges.len()),
            ));
        }
        if let Some(bad) = ranges.iter().find(|r| r.begin > r.end || r.end > extent) {
            return Err(CoreError::SliceOutOfRange(format!(
                "bin [{}, {}) is invalid for a buffer of {} rows along {}",
                bad.begin, bad.end, extent, dim
            )));
        }
        Ok(Self::from_storage(dims, Storage::Binned(BinnedStorage { ranges, dim, buffer })))
    }

    fn read(&self) -> RwLockReadGuard<'_, Storage> {
        self.storage.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Storage> {
        self.storage.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        self.dims.shape()
    }

    pub fn ndim(&self) -> usize {
        self.dims.ndim()
    }

    pub fn volume(&self) -> usize {
        self.dims.volume()
    }

    pub fn dtype(&self) -> DType {
        match &*self.read() {
            Storage::Dense(d) => d.values.dtype(),
            Storage::Binned(_) => DType::Bins,
        }
    }

    /// For binned variables, the unit of the bin contents.
    pub fn unit(&self) -> Unit {
        match &*self.read() {
            Storage::Dense(d) => d.unit,
            Storage::Binned(b) => b.buffer.unit(),
        }
    }

    pub fn is_binned(&self) -> bool {
        matches!(&*self.read(), Storage::Binned(_))
    }

    pub fn has_variances(&self) -> bool {
        match &*self.read() {
            Storage::Dense(d) => d.variances.is_some(),
            Storage::Binned(b) => b.buffer.data().has_variances(),
        }
    }

    /// Buffer offsets of this view, in the element order of `target`.
    pub(crate) fn offsets_in(&self, target: &Dimensions) -> Result<Vec<usize>> {
        Ok(ViewIndex::new(target, &self.dims, &self.strides, self.offset)?.collect())
    }

    pub(crate) fn offsets(&self) -> Result<Vec<usize>> {
        self.offsets_in(&self.dims)
    }

    /// True if the view addresses every element of its storage.
    pub(crate) fn covers_storage(&self) -> bool {
        self.volume() == self.read().len()
    }

    pub fn values<T: Element>(&self) -> Result<Vec<T>> {
        let offsets = self.offsets()?;
        match &*self.read() {
            Storage::Dense(d) => T::slice(&d.values)
                .map(|s| offsets.iter().map(|&o| s[o].clone()).collect())
                .ok_or_else(|| dtype_error(T::DTYPE, d.values.dtype())),
            Storage::Binned(_) => Err(binned_values_error()),
        }
    }

    pub fn variances<T: Element>(&self) -> Result<Vec<T>> {
        let offsets = self.offsets()?;
        match &*self.read() {
            Storage::Dense(DenseStorage { variances: Some(v), .. }) => T::slice(v)
                .map(|s| offsets.iter().map(|&o| s[o].clone()).collect())
                .ok_or_else(|| dtype_error(T::DTYPE, v.dtype())),
            Storage::Dense(_) => Err(CoreError::VariancesError("variable has no variances".into())),
            Storage::Binned(_) => Err(binned_values_error()),
        }
    }

    /// Value of a 0-D variable.
    pub fn value<T: Element>(&self) -> Result<T> {
        self.expect_scalar()?;
        self.values::<T>()?.into_iter().next().ok_or_else(|| CoreError::mismatch("1 element", "0 elements"))
    }

    pub fn variance<T: Element>(&self) -> Result<T> {
        self.expect_scalar()?;
        self.variances::<T>()?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::mismatch("1 element", "0 elements"))
    }

    fn expect_scalar(&self) -> Result<()> {
        if self.ndim() == 0 {
            Ok(())
        } else {
            Err(CoreError::mismatch("a 0-D variable", &self.dims))
        }
    }

    /// Values and variances gathered in the element order of `target`, broadcasting as needed.
    pub(crate) fn dense_in(&self, target: &Dimensions) -> Result<(Unit, ElementArray, Option<ElementArray>)> {
        let offsets = self.offsets_in(target)?;
        match &*self.read() {
            Storage::Dense(d) => Ok((
                d.unit,
                d.values.gather(&offsets),
                d.variances.as_ref().map(|v| v.gather(&offsets)),
            )),
            Storage::Binned(_) => Err(binned_values_error()),
        }
    }

    pub(crate) fn values_array(&self) -> Result<ElementArray> {
        Ok(self.dense_in(&self.dims)?.1)
    }

    pub(crate) fn variances_array(&self) -> Result<Option<ElementArray>> {
        Ok(self.dense_in(&self.dims)?.2)
    }

    /// Bin ranges in the element order of `target`, with the bin dim and a handle to the buffer.
    pub(crate) fn bins_in(&self, target: &Dimensions) -> Result<(Vec<BinRange>, Dim, DataArray)> {
        let offsets = self.offsets_in(target)?;
        match &*self.read() {
            Storage::Binned(b) => Ok((
                offsets.iter().map(|&o| b.ranges[o]).collect(),
                b.dim.clone(),
                b.buffer.clone(),
            )),
            Storage::Dense(_) => Err(CoreError::NotBinnedData(format!(
                "variable with dimensions {} holds dense data",
                self.dims
            ))),
        }
    }

    pub(crate) fn bin_parts(&self) -> Result<(Vec<BinRange>, Dim, DataArray)> {
        self.bins_in(&self.dims)
    }

    pub fn set_unit(&self, unit: Unit) -> Result<()> {
        if !self.covers_storage() {
            return Err(CoreError::InvalidArgument(
                "Partial view on data of variable cannot be used to change the unit".into(),
            ));
        }
        let buffer = match &*self.read() {
            Storage::Binned(b) => Some(b.buffer.clone()),
            Storage::Dense(_) => None,
        };
        if let Some(buffer) = buffer {
            return buffer.data().set_unit(unit);
        }
        if let Storage::Dense(d) = &mut *self.write() {
            d.unit = unit;
        }
        Ok(())
    }

    /// Whether `set_unit` would succeed on this view.
    pub(crate) fn can_set_unit(&self) -> bool {
        if !self.covers_storage() {
            return false;
        }
        match &*self.read() {
            Storage::Binned(b) => b.buffer.data().can_set_unit(),
            Storage::Dense(_) => true,
        }
    }

    /// Overwrites the elements addressed by this view. Visible through every view of the buffer.
    pub fn set_values(&self, values: ElementArray) -> Result<()> {
        if values.len() != self.volume() {
            return Err(CoreError::mismatch(
                format!("{} elements for {}", self.volume(), self.dims),
                format!("{} elements", values.len()),
            ));
        }
        let offsets = self.offsets()?;
        match &mut *self.write() {
            Storage::Dense(d) => d.values.scatter(&offsets, &values),
            Storage::Binned(_) => Err(binned_values_error()),
        }
    }

    /// Replaces or removes variances. Adding or removing them requires a view of the whole buffer.
    pub fn set_variances(&self, variances: Option<ElementArray>) -> Result<()> {
        let offsets = self.offsets()?;
        let covers = self.covers_storage();
        let mut guard = self.write();
        let d = match &mut *guard {
            Storage::Dense(d) => d,
            Storage::Binned(_) => return Err(binned_values_error()),
        };
        match variances {
            Some(v) => {
                if v.len() != offsets.len() {
                    return Err(CoreError::VariancesError(format!(
                        "expected {} variances, got {}",
                        offsets.len(),
                        v.len()
                    )));
                }
                check_variance_dtype(d.values.dtype(), v.dtype())?;
                match &mut d.variances {
                    Some(existing) => existing.scatter(&offsets, &v),
                    None if covers => {
                        let mut full = ElementArray::zeros(d.values.dtype(), d.values.len())?;
                        full.scatter(&offsets, &v)?;
                        d.variances = Some(full);
                        Ok(())
                    }
                    None => Err(CoreError::InvalidArgument(
                        "cannot add variances through a partial view".into(),
                    )),
                }
            }
            None if d.variances.is_some() && !covers => Err(CoreError::InvalidArgument(
                "cannot remove variances through a partial view".into(),
            )),
            None => {
                d.variances = None;
                Ok(())
            }
        }
    }

    /// Writes values and variances together. Lengths are checked before anything is written.
    pub(crate) fn assign(&self, values: &ElementArray, variances: Option<&ElementArray>) -> Result<()> {
        let offsets = self.offsets()?;
        let mut guard = self.write();
        let d = match &mut *guard {
            Storage::Dense(d) => d,
            Storage::Binned(_) => return Err(binned_values_error()),
        };
        if values.len() != offsets.len() || values.dtype() != d.values.dtype() {
            return Err(CoreError::mismatch(
                format!("{} {} elements", offsets.len(), d.values.dtype()),
                format!("{} {} elements", values.len(), values.dtype()),
            ));
        }
        match (&mut d.variances, variances) {
            (Some(existing), Some(v)) => {
                if v.len() != offsets.len() || v.dtype() != existing.dtype() {
                    return Err(CoreError::VariancesError("variances do not match the target".into()));
                }
                d.values.scatter(&offsets, values)?;
                existing.scatter(&offsets, v)
            }
            (None, Some(_)) => Err(CoreError::VariancesError(
                "cannot write variances to a variable without variances".into(),
            )),
            (_, None) => d.values.scatter(&offsets, values),
        }
    }

    /// Replaces the whole storage of a full view, e.g. after appending to bins.
    pub(crate) fn replace_storage(&self, storage: Storage) -> Result<()> {
        if !self.covers_storage() || storage.len() != self.volume() {
            return Err(CoreError::InvalidArgument(
                "storage can only be replaced through a view of the whole buffer".into(),
            ));
        }
        *self.write() = storage;
        Ok(())
    }

    pub fn slice(&self, slice: &Slice) -> Result<Variable> {
        let dim = slice.dim().as_str();
        let i = self
            .dims
            .index_of(dim)
            .ok_or_else(|| CoreError::dim_not_found(format!("Variable with dimensions {}", self.dims), dim))?;
        let begin = slice.begin();
        let mut out = self.clone();
        out.dims = slice.sliced_dims(&self.dims)?;
        if slice.is_point() {
            out.strides.remove(i);
        }
        out.offset = self.offset + begin * self.strides[i];
        Ok(out)
    }

    /// A view with the dimensions reordered to `order`.
    pub fn transpose(&self, order: &[Dim]) -> Result<Variable> {
        if order.len() != self.ndim() || order.iter().any(|d| !self.dims.contains(d.as_str())) {
            return Err(CoreError::InvalidArgument(format!(
                "cannot transpose {} to {:?}",
                self.dims,
                order.iter().map(Dim::as_str).collect::<Vec<_>>()
            )));
        }
        let mut out = self.clone();
        out.dims = Dimensions::from_pairs(order.iter().map(|d| (d.clone(), self.dims.shape()[self.position(d)])))?;
        out.strides = order.iter().map(|d| self.strides[self.position(d)]).collect();
        Ok(out)
    }

    fn position(&self, dim: &Dim) -> usize {
        self.dims.index_of(dim.as_str()).unwrap_or_default()
    }

    /// True if both views address the same elements of the same buffer.
    pub fn is_same(&self, other: &Variable) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
            && self.dims == other.dims
            && self.strides == other.strides
            && self.offset == other.offset
    }

    pub fn shares_buffer(&self, other: &Variable) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Deep copy into fresh contiguous storage. Binned variables are compacted.
    pub fn copy(&self) -> Result<Variable> {
        if self.is_binned() {
            return crate::bins::container::compact(self);
        }
        let offsets = self.offsets()?;
        let storage = self.gather_storage(&offsets);
        Ok(Variable::from_storage(self.dims.clone(), storage))
    }

    fn gather_storage(&self, offsets: &[usize]) -> Storage {
        match &*self.read() {
            Storage::Dense(d) => Storage::Dense(DenseStorage {
                unit: d.unit,
                values: d.values.gather(offsets),
                variances: d.variances.as_ref().map(|v| v.gather(offsets)),
            }),
            Storage::Binned(b) => Storage::Binned(BinnedStorage {
                ranges: offsets.iter().map(|&o| b.ranges[o]).collect(),
                dim: b.dim.clone(),
                buffer: b.buffer.clone(),
            }),
        }
    }

    /// Selects `indices` along `dim` into new storage. Binned variables keep sharing their buffer.
    pub(crate) fn take(&self, dim: &str, indices: &[usize]) -> Result<Variable> {
        let pos = self
            .dims
            .index_of(dim)
            .ok_or_else(|| CoreError::dim_not_found(format!("Variable with dimensions {}", self.dims), dim))?;
        let extent = self.dims.shape()[pos];
        if let Some(&bad) = indices.iter().find(|&&i| i >= extent) {
            return Err(CoreError::SliceOutOfRange(format!("index {} is out of range for {}", bad, dim)));
        }
        let out_dims = self.dims.resize(dim, indices.len())?;
        let shape = out_dims.shape();
        let mut counter = vec![0usize; shape.len()];
        let mut offsets = Vec::with_capacity(out_dims.volume());
        for _ in 0..out_dims.volume() {
            let offset = counter.iter().enumerate().fold(self.offset, |acc, (d, &c)| {
                let index = if d == pos { indices[c] } else { c };
                acc + index * self.strides[d]
            });
            offsets.push(offset);
            for d in (0..shape.len()).rev() {
                counter[d] += 1;
                if counter[d] < shape[d] {
                    break;
                }
                counter[d] = 0;
            }
        }
        let storage = self.gather_storage(&offsets);
        Ok(Variable::from_storage(out_dims, storage))
    }

    /// Joins dense variables along an existing `dim`. All other dims, the unit and the
    /// presence of variances must agree.
    pub(crate) fn concat(dim: &str, parts: &[Variable]) -> Result<Variable> {
        let first = parts
            .first()
            .ok_or_else(|| CoreError::InvalidArgument("nothing to concatenate".into()))?;
        let pos = first
            .dims
            .index_of(dim)
            .ok_or_else(|| CoreError::dim_not_found(format!("Variable with dimensions {}", first.dims), dim))?;
        let outer: usize = first.shape()[..pos].iter().product();
        let inner: usize = first.shape()[pos + 1..].iter().product();
        let unit = first.unit();
        let mut values = Vec::with_capacity(parts.len());
        let mut variances = Vec::with_capacity(parts.len());
        let mut block_sizes = Vec::with_capacity(parts.len());
        let mut total = 0;
        for p in parts {
            let extent = p.dims.extent(dim)?;
            if p.dims.resize(dim, first.shape()[pos])? != first.dims {
                return Err(CoreError::mismatch(&first.dims, &p.dims));
            }
            if p.unit() != unit {
                return Err(CoreError::unit_mismatch(unit, p.unit()));
            }
            let (_, v, var) = p.dense_in(&p.dims)?;
            values.push(v);
            variances.extend(var);
            block_sizes.push(extent * inner);
            total += extent;
        }
        let variances = match variances.len() {
            0 => None,
            n if n == parts.len() => Some(ElementArray::concat_blocks(&variances, outer, &block_sizes)?),
            _ => {
                return Err(CoreError::VariancesError(
                    "either all or none of the concatenated variables must have variances".into(),
                ))
            }
        };
        let values = ElementArray::concat_blocks(&values, outer, &block_sizes)?;
        Variable::from_values(first.dims.resize(dim, total)?, unit, values, variances)
    }
}

fn check_variance_dtype(values: DType, variances: DType) -> Result<()> {
    if !values.is_float() {
        return Err(CoreError::VariancesError(format!(
            "variances are only supported for float dtypes, got {}",
            values
        )));
    }
    if variances != values {
        return Err(CoreError::VariancesError(format!(
            "variances have dtype {} but values have dtype {}",
            variances, values
        )));
    }
    Ok(())
}

fn check_variances(values: &ElementArray, variances: &ElementArray) -> Result<()> {
    check_variance_dtype(values.dtype(), variances.dtype())?;
    if variances.len() != values.len() {
        return Err(CoreError::VariancesError(format!(
            "expected {} variances, got {}",
            values.len(),
            variances.len()
        )));
    }
    Ok(())
}

fn dtype_error(requested: DType, actual: DType) -> CoreError {
    CoreError::TypeError(format!("requested {} elements from a {} variable", requested, actual))
}

fn binned_values_error() -> CoreError {
    CoreError::TypeError("binned variables have no dense elements; use bins() to access the contents".into())
}

impl PartialEq for Variable {
    fn eq(&self, other: &Variable) -> bool {
        if self.dims != other.dims || self.dtype() != other.dtype() || self.unit() != other.unit() {
            return false;
        }
        if self.is_binned() {
            return crate::bins::container::bins_equal(self, other).unwrap_or(false);
        }
        match (self.dense_in(&self.dims), other.dense_in(&other.dims)) {
            (Ok((_, a, va)), Ok((_, b, vb))) => a == b && va == vb,
            _ => false,
        }
    }
}
