use crate::binning;
use crate::bins;
use crate::dataset::DataArray;
use crate::error::CoreError;
use crate::layout::{Dim, Slice};
use crate::units::Unit;
use crate::variable::{array, DataArrayRecord, ElementArray, Variable};
use pyo3::exceptions::{PyIndexError, PyKeyError, PyTypeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(e: CoreError) -> PyErr {
    match e {
        CoreError::DimensionNotFound { .. } => PyKeyError::new_err(e.to_string()),
        CoreError::TypeError(_) => PyTypeError::new_err(e.to_string()),
        CoreError::SliceOutOfRange(_) => PyIndexError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

fn parse_unit(unit: &str) -> PyResult<Unit> {
    Unit::parse(unit).map_err(to_py_err)
}

#[pyclass(name = "_Variable")]
#[derive(Debug, Clone)]
pub struct PyVariable {
    pub inner: Variable,
}

#[pymethods]
impl PyVariable {
    #[new]
    #[pyo3(signature = (dims, shape, values, variances=None, unit="dimensionless"))]
    pub fn new(dims: Vec<String>, shape: Vec<usize>, values: Vec<f64>, variances: Option<Vec<f64>>, unit: &str) -> PyResult<Self> {
        let labels: Vec<&str> = dims.iter().map(String::as_str).collect();
        let inner = array(&labels, &shape, values, variances.map(ElementArray::from), parse_unit(unit)?)
            .map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[staticmethod]
    #[pyo3(signature = (dim, values, unit="dimensionless"))]
    pub fn from_ints(dim: &str, values: Vec<i64>, unit: &str) -> PyResult<Self> {
        let inner = array(&[dim], &[values.len()], values, None, parse_unit(unit)?).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[getter]
    pub fn dims(&self) -> Vec<String> {
        self.inner.dims().labels().iter().map(|d| d.to_string()).collect()
    }

    #[getter]
    pub fn shape(&self) -> Vec<usize> {
        self.inner.shape().to_vec()
    }

    #[getter]
    pub fn unit(&self) -> String {
        self.inner.unit().to_string()
    }

    #[getter]
    pub fn dtype(&self) -> String {
        self.inner.dtype().to_string()
    }

    #[getter]
    pub fn is_binned(&self) -> bool {
        self.inner.is_binned()
    }

    pub fn values(&self) -> PyResult<Vec<f64>> {
        self.inner.values_array().and_then(|v| v.to_f64()).map_err(to_py_err)
    }

    pub fn variances(&self) -> PyResult<Option<Vec<f64>>> {
        match self.inner.variances_array().map_err(to_py_err)? {
            Some(v) => v.to_f64().map(Some).map_err(to_py_err),
            None => Ok(None),
        }
    }

    #[pyo3(signature = (dim, begin, end=None))]
    pub fn slice(&self, dim: &str, begin: usize, end: Option<usize>) -> PyResult<Self> {
        let slice = match end {
            Some(end) => Slice::range(dim, begin, end),
            None => Slice::point(dim, begin),
        };
        Ok(Self { inner: self.inner.slice(&slice).map_err(to_py_err)? })
    }

    pub fn copy(&self) -> PyResult<Self> {
        Ok(Self { inner: self.inner.copy().map_err(to_py_err)? })
    }

    pub fn to_unit(&self, unit: &str) -> PyResult<Self> {
        Ok(Self { inner: self.inner.to_unit(parse_unit(unit)?).map_err(to_py_err)? })
    }

    pub fn sum(&self, dim: &str) -> PyResult<Self> {
        Ok(Self { inner: self.inner.sum(dim).map_err(to_py_err)? })
    }

    pub fn __add__(&self, other: PyRef<'_, PyVariable>) -> PyResult<Self> {
        Ok(Self { inner: self.inner.add(&other.inner).map_err(to_py_err)? })
    }

    pub fn __sub__(&self, other: PyRef<'_, PyVariable>) -> PyResult<Self> {
        Ok(Self { inner: self.inner.sub(&other.inner).map_err(to_py_err)? })
    }

    pub fn __mul__(&self, other: PyRef<'_, PyVariable>) -> PyResult<Self> {
        Ok(Self { inner: self.inner.mul(&other.inner).map_err(to_py_err)? })
    }

    pub fn __truediv__(&self, other: PyRef<'_, PyVariable>) -> PyResult<Self> {
        Ok(Self { inner: self.inner.div(&other.inner).map_err(to_py_err)? })
    }

    pub fn __eq__(&self, other: PyRef<'_, PyVariable>) -> bool {
        self.inner == other.inner
    }

    pub fn __repr__(&self) -> String {
        self.inner.to_string()
    }

    // Bins accessors. Each fails with ValueError on dense variables.

    pub fn bins_begin(&self) -> PyResult<Self> {
        let bins = self.inner.bins().map_err(to_py_err)?;
        Ok(Self { inner: bins.begin().map_err(to_py_err)? })
    }

    pub fn bins_end(&self) -> PyResult<Self> {
        let bins = self.inner.bins().map_err(to_py_err)?;
        Ok(Self { inner: bins.end().map_err(to_py_err)? })
    }

    pub fn bins_size(&self) -> PyResult<Self> {
        let bins = self.inner.bins().map_err(to_py_err)?;
        Ok(Self { inner: bins.size().map_err(to_py_err)? })
    }

    pub fn bins_dim(&self) -> PyResult<String> {
        let bins = self.inner.bins().map_err(to_py_err)?;
        Ok(bins.dim().map_err(to_py_err)?.to_string())
    }

    pub fn bins_data(&self) -> PyResult<PyDataArray> {
        let bins = self.inner.bins().map_err(to_py_err)?;
        Ok(PyDataArray { inner: bins.data().map_err(to_py_err)? })
    }

    pub fn bins_sum(&self) -> PyResult<Self> {
        let bins = self.inner.bins().map_err(to_py_err)?;
        Ok(Self { inner: bins.sum().map_err(to_py_err)? })
    }

    #[pyo3(signature = (other=None, dim=None))]
    pub fn bins_concatenate(&self, other: Option<PyRef<'_, PyVariable>>, dim: Option<&str>) -> PyResult<Self> {
        let bins = self.inner.bins().map_err(to_py_err)?;
        let other = other.as_ref().map(|o| &o.inner);
        Ok(Self { inner: bins.concatenate(other, dim).map_err(to_py_err)? })
    }

    pub fn bins_append(&self, other: PyRef<'_, PyVariable>) -> PyResult<()> {
        self.inner.bins().and_then(|b| b.append(&other.inner)).map_err(to_py_err)
    }
}

#[pyclass(name = "_DataArray")]
#[derive(Debug, Clone)]
pub struct PyDataArray {
    pub inner: DataArray,
}

#[pymethods]
impl PyDataArray {
    #[new]
    #[pyo3(signature = (data, name=""))]
    pub fn new(data: PyRef<'_, PyVariable>, name: &str) -> Self {
        let mut inner = DataArray::new(data.inner.clone());
        inner.set_name(name);
        Self { inner }
    }

    #[getter]
    pub fn name(&self) -> String {
        self.inner.name().to_string()
    }

    #[getter]
    pub fn data(&self) -> PyVariable {
        PyVariable { inner: self.inner.data().clone() }
    }

    pub fn coord(&self, dim: &str) -> PyResult<PyVariable> {
        Ok(PyVariable { inner: self.inner.coord(dim).map_err(to_py_err)?.clone() })
    }

    pub fn set_coord(&mut self, dim: &str, coord: PyRef<'_, PyVariable>) -> PyResult<()> {
        self.inner.set_coord(dim, coord.inner.clone()).map_err(to_py_err)
    }

    pub fn mask(&self, name: &str) -> PyResult<PyVariable> {
        Ok(PyVariable { inner: self.inner.mask(name).map_err(to_py_err)?.clone() })
    }

    pub fn set_mask(&mut self, name: &str, mask: PyRef<'_, PyVariable>) -> PyResult<()> {
        self.inner.set_mask(name, mask.inner.clone()).map_err(to_py_err)
    }

    #[pyo3(signature = (dim, begin, end=None))]
    pub fn slice(&self, dim: &str, begin: usize, end: Option<usize>) -> PyResult<Self> {
        let slice = match end {
            Some(end) => Slice::range(dim, begin, end),
            None => Slice::point(dim, begin),
        };
        Ok(Self { inner: self.inner.slice(&slice).map_err(to_py_err)? })
    }

    pub fn to_json(&self) -> PyResult<String> {
        DataArrayRecord::from_data_array(&self.inner)
            .and_then(|r| r.to_json())
            .map_err(to_py_err)
    }

    #[staticmethod]
    pub fn from_json(json: &str) -> PyResult<Self> {
        let inner = DataArrayRecord::from_json(json)
            .and_then(|r| r.into_data_array())
            .map_err(to_py_err)?;
        Ok(Self { inner })
    }

    pub fn __repr__(&self) -> String {
        self.inner.to_string()
    }
}

#[pyfunction]
#[pyo3(signature = (dim, data, begin=None, end=None))]
pub fn make_bins(
    dim: &str,
    data: PyRef<'_, PyDataArray>,
    begin: Option<PyRef<'_, PyVariable>>,
    end: Option<PyRef<'_, PyVariable>>,
) -> PyResult<PyVariable> {
    let inner = bins::bins(begin.as_ref().map(|b| &b.inner), end.as_ref().map(|e| &e.inner), dim, &data.inner)
        .map_err(to_py_err)?;
    Ok(PyVariable { inner })
}

#[pyfunction]
#[pyo3(signature = (x, edges, groups=Vec::new(), erase=Vec::new()))]
pub fn bin(
    x: PyRef<'_, PyDataArray>,
    edges: Vec<PyRef<'_, PyVariable>>,
    groups: Vec<PyRef<'_, PyVariable>>,
    erase: Vec<String>,
) -> PyResult<PyDataArray> {
    let edges: Vec<Variable> = edges.iter().map(|e| e.inner.clone()).collect();
    let groups: Vec<Variable> = groups.iter().map(|g| g.inner.clone()).collect();
    let erase: Vec<Dim> = erase.into_iter().map(Dim::from).collect();
    let inner = binning::bin(&x.inner, &edges, &groups, &erase).map_err(to_py_err)?;
    Ok(PyDataArray { inner })
}

#[pyfunction]
pub fn histogram(x: PyRef<'_, PyDataArray>, edges: Vec<PyRef<'_, PyVariable>>) -> PyResult<PyDataArray> {
    let edges: Vec<Variable> = edges.iter().map(|e| e.inner.clone()).collect();
    let inner = binning::histogram_nd(&x.inner, &edges).map_err(to_py_err)?;
    Ok(PyDataArray { inner })
}

#[pyfunction]
pub fn rebin(x: PyRef<'_, PyDataArray>, dim: &str, edges: PyRef<'_, PyVariable>) -> PyResult<PyDataArray> {
    let inner = binning::rebin(&x.inner, dim, &edges.inner).map_err(to_py_err)?;
    Ok(PyDataArray { inner })
}

/// Registers the classes and functions of the `_core` module.
pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyVariable>()?;
    m.add_class::<PyDataArray>()?;
    m.add_function(wrap_pyfunction!(make_bins, m)?)?;
    m.add_function(wrap_pyfunction!(bin, m)?)?;
    m.add_function(wrap_pyfunction!(histogram, m)?)?;
    m.add_function(wrap_pyfunction!(rebin, m)?)?;
    Ok(())
}
