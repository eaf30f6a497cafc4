//! Factory functions for dense variables.
use super::element_array::{Element, ElementArray};
use super::variable::Variable;
use crate::error::Result;
use crate::layout::{DType, Dimensions};
use crate::units::Unit;
use serde::{Deserialize, Serialize};

/// Options shared by `zeros`, `ones` and `empty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOptions {
    pub dtype: DType,
    pub unit: Unit,
    pub with_variances: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self { dtype: DType::Float64, unit: Unit::dimensionless(), with_variances: false }
    }
}

impl CreateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_variances(mut self, with_variances: bool) -> Self {
        self.with_variances = with_variances;
        self
    }
}

pub fn scalar<T: Element>(value: T, unit: Unit) -> Variable {
    Variable::from_storage(
        Dimensions::scalar(),
        super::variable::Storage::Dense(super::variable::DenseStorage {
            unit,
            values: T::wrap(vec![value]),
            variances: None,
        }),
    )
}

pub fn scalar_with_variance(value: f64, variance: f64, unit: Unit) -> Variable {
    Variable::from_storage(
        Dimensions::scalar(),
        super::variable::Storage::Dense(super::variable::DenseStorage {
            unit,
            values: ElementArray::Float64(vec![value]),
            variances: Some(ElementArray::Float64(vec![variance])),
        }),
    )
}

fn filled(
    dims: &[&str],
    shape: &[usize],
    options: &CreateOptions,
    fill: fn(DType, usize) -> Result<ElementArray>,
) -> Result<Variable> {
    let dims = Dimensions::new(dims, shape)?;
    let n = dims.volume();
    let variances = if options.with_variances { Some(ElementArray::zeros(options.dtype, n)?) } else { None };
    Variable::from_values(dims, options.unit, fill(options.dtype, n)?, variances)
}

/// Zero values; variances, if requested, are zero as well.
pub fn zeros(dims: &[&str], shape: &[usize], options: &CreateOptions) -> Result<Variable> {
    filled(dims, shape, options, ElementArray::zeros)
}

pub fn ones(dims: &[&str], shape: &[usize], options: &CreateOptions) -> Result<Variable> {
    filled(dims, shape, options, ElementArray::ones)
}

/// A variable whose contents are unspecified and must be written before use.
/// Elements are default-initialized.
pub fn empty(dims: &[&str], shape: &[usize], options: &CreateOptions) -> Result<Variable> {
    filled(dims, shape, options, ElementArray::zeros)
}

pub fn array(
    dims: &[&str],
    shape: &[usize],
    values: impl Into<ElementArray>,
    variances: Option<ElementArray>,
    unit: Unit,
) -> Result<Variable> {
    Variable::from_values(Dimensions::new(dims, shape)?, unit, values.into(), variances)
}

/// 1-D variable; the extent is taken from `values`.
pub fn array_1d(dim: &str, values: impl Into<ElementArray>, unit: Unit) -> Result<Variable> {
    let values = values.into();
    let n = values.len();
    array(&[dim], &[n], values, None, unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[test]
    fn test_zeros_with_variances() {
        let opts = CreateOptions::new().unit(Unit::counts()).with_variances(true);
        let var = zeros(&["x"], &[3], &opts).unwrap();
        assert_eq!(var.values::<f64>().unwrap(), vec![0.0; 3]);
        assert_eq!(var.variances::<f64>().unwrap(), vec![0.0; 3]);
        assert_eq!(var.unit(), Unit::counts());
    }

    #[test]
    fn test_int_variances_rejected() {
        let opts = CreateOptions::new().dtype(DType::Int64).with_variances(true);
        assert!(matches!(zeros(&["x"], &[2], &opts), Err(CoreError::VariancesError(_))));
    }

    #[test]
    fn test_array_shape_mismatch() {
        let err = array(&["x", "y"], &[2, 2], vec![1.0, 2.0, 3.0], None, Unit::m()).unwrap_err();
        assert!(matches!(err, CoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_scalar_accessors() {
        let s = scalar_with_variance(2.0, 0.5, Unit::counts());
        assert_eq!(s.value::<f64>().unwrap(), 2.0);
        assert_eq!(s.variance::<f64>().unwrap(), 0.5);
        assert_eq!(scalar(3i64, Unit::dimensionless()).value::<i64>().unwrap(), 3);
        assert!(array_1d("x", vec![1.0], Unit::m()).unwrap().value::<f64>().is_err());
    }
}
