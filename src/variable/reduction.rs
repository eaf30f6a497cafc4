use super::element_array::ElementArray;
use super::variable::Variable;
use crate::error::{CoreError, Result};
use crate::layout::DType;

/// Dtype of a sum: floats keep their type, integers and bools accumulate into int64.
fn sum_dtype(dtype: DType) -> Result<DType> {
    match dtype {
        DType::Float64 | DType::Float32 => Ok(dtype),
        DType::Int64 | DType::Int32 | DType::Bool => Ok(DType::Int64),
        other => Err(CoreError::TypeError(format!("cannot sum elements of dtype {}", other))),
    }
}

/// Sums consecutive lines of `line` elements. `line` must be non-zero.
fn sum_lines(values: &ElementArray, dtype: DType, line: usize) -> Result<ElementArray> {
    if dtype.is_float() {
        let sums = values.to_f64()?.chunks(line).map(|c| c.iter().sum()).collect();
        return ElementArray::from_f64(dtype, sums);
    }
    match values.cast(DType::Int64)? {
        ElementArray::Int64(v) => Ok(ElementArray::Int64(v.chunks(line).map(|c| c.iter().sum()).collect())),
        other => Err(CoreError::TypeError(format!("cannot sum elements of dtype {}", other.dtype()))),
    }
}

impl Variable {
    /// Sums over `dim`. Variances add.
    pub fn sum(&self, dim: &str) -> Result<Variable> {
        if self.is_binned() {
            return Err(CoreError::TypeError("use bins().sum() to sum the contents of bins".into()));
        }
        let out_dims = self.dims().erase(dim)?;
        let extent = self.dims().extent(dim)?;
        let dtype = sum_dtype(self.dtype())?;
        // Gather with `dim` innermost so every output element reduces one contiguous line.
        let mut target = out_dims.clone();
        target.push(dim.into(), extent)?;
        let (unit, values, variances) = self.dense_in(&target)?;
        let n_out = out_dims.volume();
        let (sums, variances) = if extent == 0 {
            (
                ElementArray::zeros(dtype, n_out)?,
                variances.map(|v| ElementArray::zeros(v.dtype(), n_out)).transpose()?,
            )
        } else {
            (
                sum_lines(&values, dtype, extent)?,
                variances.map(|v| sum_lines(&v, v.dtype(), extent)).transpose()?,
            )
        };
        Variable::from_values(out_dims, unit, sums, variances)
    }

    /// Sums over all dimensions into a 0-D variable.
    pub fn sum_all(&self) -> Result<Variable> {
        let labels: Vec<String> = self.dims().labels().iter().map(|d| d.to_string()).collect();
        labels.iter().try_fold(self.clone(), |acc, dim| acc.sum(dim))
    }

    /// Arithmetic mean over `dim`; the variance of the mean is the summed variance over n².
    pub fn mean(&self, dim: &str) -> Result<Variable> {
        let n = self.dims().extent(dim)? as f64;
        let total = self.sum(dim)?;
        let dtype = if total.dtype().is_float() { total.dtype() } else { DType::Float64 };
        let (unit, values, variances) = total.dense_in(total.dims())?;
        let mean = values.to_f64()?.into_iter().map(|x| x / n).collect();
        let variances = match variances {
            Some(v) => Some(ElementArray::from_f64(dtype, v.to_f64()?.into_iter().map(|x| x / (n * n)).collect())?),
            None => None,
        };
        Variable::from_values(total.dims().clone(), unit, ElementArray::from_f64(dtype, mean)?, variances)
    }
}
