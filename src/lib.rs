// Core of a labeled-array library: units, dims-labeled variables with variances,
// binned data and the bin / histogram / rebin operations built on top of them.
// The optional `python` feature wraps everything in the `_core` extension module.

pub mod binning;
pub mod bins;
pub mod dataset;
pub mod display;
pub mod error;
pub mod layout;
pub mod units;
pub mod variable;

#[cfg(feature = "python")]
pub mod bindings;

pub use binning::{bin, bin_with, group_by, histogram, histogram_nd, rebin, BinOptions};
pub use bins::{bins, Bins, Lookup};
pub use dataset::{DataArray, Dataset};
pub use error::{CoreError, Result};
pub use layout::{DType, Dim, Dimensions, Slice};
pub use units::{Unit, UnitPolicy};
pub use variable::{BinRange, BinaryOp, ElementArray, Variable};

#[cfg(feature = "python")]
use pyo3::prelude::*;

// --- Module Definition ---
/// Defines the `scibin._core` Python module.
#[cfg(feature = "python")]
#[pymodule]
fn _core(_py: Python, m: &Bound<'_, PyModule>) -> PyResult<()> {
    bindings::python::register(m)
}
