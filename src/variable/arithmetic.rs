//! Arithmetic between variables: broadcasting by label, unit inference and variance propagation.
use super::creation::scalar;
use super::element_array::ElementArray;
use super::kernel::{self, BinaryOp};
use super::variable::Variable;
use crate::error::{CoreError, Result};
use crate::layout::{DType, Dimensions};
use crate::units::{Ratio, Unit, UnitPolicy};
use log::trace;

fn result_dtype(op: BinaryOp, a: DType, b: DType) -> Result<DType> {
    let dtype = DType::promote(a, b)
        .ok_or_else(|| CoreError::TypeError(format!("cannot apply {} to {} and {}", op.symbol(), a, b)))?;
    Ok(if op == BinaryOp::Div && dtype.is_int() { DType::Float64 } else { dtype })
}

impl Variable {
    pub fn add(&self, other: &Variable) -> Result<Variable> {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(&self, other: &Variable) -> Result<Variable> {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn mul(&self, other: &Variable) -> Result<Variable> {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn div(&self, other: &Variable) -> Result<Variable> {
        self.binary(BinaryOp::Div, other)
    }

    pub fn binary(&self, op: BinaryOp, other: &Variable) -> Result<Variable> {
        self.binary_with_policy(op, other, &UnitPolicy::default())
    }

    /// Out-of-place `self op other`. Dimensions are matched by label; a dimension present in
    /// only one operand is broadcast over.
    pub fn binary_with_policy(&self, op: BinaryOp, other: &Variable, policy: &UnitPolicy) -> Result<Variable> {
        match (self.is_binned(), other.is_binned()) {
            (true, true) => {
                return Err(CoreError::TypeError("arithmetic between two binned variables is not supported".into()))
            }
            (true, false) => return crate::bins::arithmetic::binned_dense(op, self, other, policy),
            (false, true) if matches!(op, BinaryOp::Add | BinaryOp::Mul) => {
                return crate::bins::arithmetic::binned_dense(op, other, self, policy)
            }
            (false, true) => {
                return Err(CoreError::TypeError(format!(
                    "dense {} binned is not supported; the binned operand must come first",
                    op.symbol()
                )))
            }
            (false, false) => {}
        }
        let unit = policy.infer(op, &self.unit(), &other.unit())?;
        let dims = Dimensions::merge(self.dims(), other.dims())?;
        let dtype = result_dtype(op, self.dtype(), other.dtype())?;
        let (_, a, va) = self.dense_in(&dims)?;
        let (_, b, vb) = other.dense_in(&dims)?;
        trace!("{} {} {} -> {} {}", self.dims(), op.symbol(), other.dims(), dims, dtype);
        let (values, variances) = kernel::apply(op, dtype, &a, &b, va.as_ref(), vb.as_ref())?;
        Variable::from_values(dims, unit, values, variances)
    }

    pub fn add_in_place(&self, other: &Variable) -> Result<()> {
        self.binary_in_place(BinaryOp::Add, other)
    }

    pub fn sub_in_place(&self, other: &Variable) -> Result<()> {
        self.binary_in_place(BinaryOp::Sub, other)
    }

    pub fn mul_in_place(&self, other: &Variable) -> Result<()> {
        self.binary_in_place(BinaryOp::Mul, other)
    }

    pub fn div_in_place(&self, other: &Variable) -> Result<()> {
        self.binary_in_place(BinaryOp::Div, other)
    }

    pub fn binary_in_place(&self, op: BinaryOp, other: &Variable) -> Result<()> {
        self.binary_in_place_with_policy(op, other, &UnitPolicy::default())
    }

    /// In-place `self op= other`, written through the shared buffer so every alias observes it.
    /// `other` may not introduce dimensions absent from `self`. Nothing is written on failure.
    pub fn binary_in_place_with_policy(&self, op: BinaryOp, other: &Variable, policy: &UnitPolicy) -> Result<()> {
        if other.is_binned() {
            return Err(CoreError::TypeError("binned operands cannot be applied in place".into()));
        }
        if self.is_binned() {
            return crate::bins::arithmetic::binned_dense_in_place(op, self, other, policy);
        }
        let unit = policy.infer(op, &self.unit(), &other.unit())?;
        if unit != self.unit() && !self.can_set_unit() {
            return Err(CoreError::InvalidArgument(
                "Partial view on data of variable cannot be used to change the unit".into(),
            ));
        }
        if !self.dims().includes(other.dims()) {
            return Err(CoreError::mismatch(self.dims(), other.dims()));
        }
        let dtype = self.dtype();
        if dtype.is_int() && (op == BinaryOp::Div || other.dtype().is_float()) {
            return Err(CoreError::TypeError(format!(
                "cannot store the result of {} {} {} in place",
                dtype,
                op.symbol(),
                other.dtype()
            )));
        }
        // Operands are copied out before the write lock is taken, so `a op= a` is safe.
        let (_, a, va) = self.dense_in(self.dims())?;
        let (_, b, vb) = other.dense_in(self.dims())?;
        if vb.is_some() && va.is_none() {
            return Err(CoreError::VariancesError(
                "the right-hand side has variances but the target has none".into(),
            ));
        }
        let (values, variances) = kernel::apply(op, dtype, &a, &b, va.as_ref(), vb.as_ref())?;
        self.assign(&values, variances.as_ref())?;
        if unit != self.unit() {
            self.set_unit(unit)?;
        }
        Ok(())
    }

    /// `1 / self`; integer input yields float64.
    pub fn reciprocal(&self) -> Result<Variable> {
        scalar(1.0f64, Unit::dimensionless()).div(self)
    }

    /// Element-wise square root of a float variable.
    pub fn sqrt(&self) -> Result<Variable> {
        let unit = UnitPolicy::default().power(&self.unit(), Ratio::HALF)?;
        let dtype = self.dtype();
        if !dtype.is_float() {
            return Err(CoreError::TypeError(format!("sqrt requires a float dtype, got {}", dtype)));
        }
        let (_, values, variances) = self.dense_in(self.dims())?;
        let x: Vec<f64> = values.to_f64()?.into_iter().map(f64::sqrt).collect();
        // d(sqrt x) = dx / (2 sqrt x)
        let variances = match variances {
            Some(v) => Some(ElementArray::from_f64(
                dtype,
                v.to_f64()?.iter().zip(x.iter()).map(|(v, r)| v / (4.0 * r * r)).collect(),
            )?),
            None => None,
        };
        Variable::from_values(self.dims().clone(), unit, ElementArray::from_f64(dtype, x)?, variances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Slice;
    use crate::variable::creation::{array, array_1d, scalar_with_variance};
    use rstest::rstest;

    fn counts(dim: &str, values: Vec<f64>) -> Variable {
        array_1d(dim, values, Unit::counts()).unwrap()
    }

    #[rstest]
    #[case(BinaryOp::Add, vec![11.0, 22.0])]
    #[case(BinaryOp::Sub, vec![-9.0, -18.0])]
    #[case(BinaryOp::Mul, vec![10.0, 40.0])]
    #[case(BinaryOp::Div, vec![0.1, 0.1])]
    fn test_elementwise(#[case] op: BinaryOp, #[case] expected: Vec<f64>) {
        let a = counts("x", vec![1.0, 2.0]);
        let b = counts("x", vec![10.0, 20.0]);
        assert_eq!(a.binary(op, &b).unwrap().values::<f64>().unwrap(), expected);
    }

    #[test]
    fn test_broadcast_by_label() {
        let a = array(&["x"], &[2], vec![1.0, 2.0], None, Unit::m()).unwrap();
        let b = array(&["y"], &[3], vec![10.0, 20.0, 30.0], None, Unit::m()).unwrap();
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.dims().to_string(), "{x: 2, y: 3}");
        assert_eq!(sum.values::<f64>().unwrap(), vec![11.0, 21.0, 31.0, 12.0, 22.0, 32.0]);
    }

    #[test]
    fn test_label_order_does_not_matter() {
        let a = array(&["x", "y"], &[2, 2], vec![1.0, 2.0, 3.0, 4.0], None, Unit::m()).unwrap();
        let b = a.transpose(&["y".into(), "x".into()]).unwrap();
        assert_eq!(a.sub(&b).unwrap().values::<f64>().unwrap(), vec![0.0; 4]);
    }

    #[test]
    fn test_extent_mismatch() {
        let a = counts("x", vec![1.0, 2.0]);
        let b = counts("x", vec![1.0, 2.0, 3.0]);
        assert!(matches!(a.add(&b), Err(CoreError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_unit_errors() {
        let a = counts("x", vec![1.0]);
        let m = array_1d("x", vec![1.0], Unit::m()).unwrap();
        assert!(matches!(a.add(&m), Err(CoreError::UnitMismatch { .. })));
        let c2 = a.mul(&a).unwrap();
        assert_eq!(c2.unit(), Unit::counts().powi(2));
        assert!(matches!(c2.mul(&c2), Err(CoreError::UnsupportedUnit { .. })));
    }

    #[test]
    fn test_variance_propagation_treats_missing_as_exact() {
        let a = scalar_with_variance(3.0, 1.0, Unit::counts());
        let b = scalar(2.0, Unit::dimensionless());
        let product = a.mul(&b).unwrap();
        assert_eq!(product.value::<f64>().unwrap(), 6.0);
        assert_eq!(product.variance::<f64>().unwrap(), 4.0);
    }

    #[test]
    fn test_integer_division_out_of_place_is_float() {
        let a = array_1d("x", vec![1i64, 3], Unit::dimensionless()).unwrap();
        let b = array_1d("x", vec![2i64, 2], Unit::dimensionless()).unwrap();
        let q = a.div(&b).unwrap();
        assert_eq!(q.dtype(), DType::Float64);
        assert_eq!(q.values::<f64>().unwrap(), vec![0.5, 1.5]);
        assert!(matches!(a.div_in_place(&b), Err(CoreError::TypeError(_))));
    }

    #[test]
    fn test_in_place_is_visible_through_aliases() {
        let a = counts("x", vec![1.0, 2.0, 3.0]);
        let alias = a.clone();
        let view = a.slice(&Slice::range("x", 1, 3)).unwrap();
        a.add_in_place(&alias).unwrap();
        assert_eq!(alias.values::<f64>().unwrap(), vec![2.0, 4.0, 6.0]);
        assert_eq!(view.values::<f64>().unwrap(), vec![4.0, 6.0]);
        assert!(a.is_same(&alias));
    }

    #[test]
    fn test_in_place_on_view_writes_base() {
        let a = counts("x", vec![1.0, 2.0, 3.0]);
        let view = a.slice(&Slice::range("x", 0, 2)).unwrap();
        view.mul_in_place(&scalar(10.0, Unit::dimensionless())).unwrap();
        assert_eq!(a.values::<f64>().unwrap(), vec![10.0, 20.0, 3.0]);
        let err = view.mul_in_place(&scalar(1.0, Unit::m())).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        assert_eq!(a.values::<f64>().unwrap(), vec![10.0, 20.0, 3.0]);
    }

    #[test]
    fn test_in_place_rejects_new_dims_and_variances() {
        let a = counts("x", vec![1.0, 2.0]);
        let b = counts("y", vec![1.0]);
        assert!(matches!(a.add_in_place(&b), Err(CoreError::DimensionMismatch { .. })));
        let v = scalar_with_variance(1.0, 1.0, Unit::counts());
        assert!(matches!(a.add_in_place(&v), Err(CoreError::VariancesError(_))));
        assert_eq!(a.values::<f64>().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_reciprocal_and_sqrt() {
        let a = array_1d("x", vec![2.0, 4.0], Unit::m()).unwrap();
        let r = a.reciprocal().unwrap();
        assert_eq!(r.unit(), Unit::m().reciprocal());
        assert_eq!(r.values::<f64>().unwrap(), vec![0.5, 0.25]);
        let area = a.mul(&a).unwrap();
        assert_eq!(area.sqrt().unwrap().unit(), Unit::m());
    }
}
