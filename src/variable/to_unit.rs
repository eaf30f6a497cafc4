use super::element_array::ElementArray;
use super::variable::Variable;
use crate::error::{CoreError, Result};
use crate::layout::DType;
use crate::units::Unit;

impl Variable {
    /// Converts to a compatible unit. Values scale by the conversion factor, variances by its
    /// square. Integer input is converted to float64 unless the factor is exactly one.
    pub fn to_unit(&self, unit: Unit) -> Result<Variable> {
        let factor = self
            .unit()
            .conversion_factor(&unit)
            .ok_or_else(|| CoreError::unit_mismatch(unit, self.unit()))?;
        if self.is_binned() {
            return Err(CoreError::TypeError("convert the bin contents with bins().data() instead".into()));
        }
        let (_, values, variances) = self.dense_in(self.dims())?;
        if factor == 1.0 {
            return Variable::from_values(self.dims().clone(), unit, values, variances);
        }
        let dtype = if values.dtype().is_float() { values.dtype() } else { DType::Float64 };
        let scaled = ElementArray::from_f64(dtype, values.to_f64()?.into_iter().map(|x| x * factor).collect())?;
        let variances = match variances {
            Some(v) => Some(ElementArray::from_f64(
                dtype,
                v.to_f64()?.into_iter().map(|x| x * factor * factor).collect(),
            )?),
            None => None,
        };
        Variable::from_values(self.dims().clone(), unit, scaled, variances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::creation::{array, array_1d};

    #[test]
    fn test_microseconds_to_seconds() {
        let var = array(&["x"], &[2], vec![1.0e6, 2.0e6], Some(vec![1.0e12, 4.0e12].into()), Unit::us()).unwrap();
        let seconds = var.to_unit(Unit::s()).unwrap();
        assert_eq!(seconds.unit(), Unit::s());
        let values = seconds.values::<f64>().unwrap();
        assert!((values[0] - 1.0).abs() < 1e-12 && (values[1] - 2.0).abs() < 1e-12);
        let variances = seconds.variances::<f64>().unwrap();
        assert!((variances[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible_units() {
        let var = array_1d("x", vec![1.0], Unit::m()).unwrap();
        assert!(matches!(var.to_unit(Unit::s()), Err(CoreError::UnitMismatch { .. })));
    }

    #[test]
    fn test_identity_conversion_keeps_ints() {
        let var = array_1d("x", vec![3i64], Unit::m()).unwrap();
        let same = var.to_unit(Unit::m()).unwrap();
        assert_eq!(same.dtype(), DType::Int64);
        assert!(!same.shares_buffer(&var));
    }
}
