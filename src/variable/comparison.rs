use super::element_array::ElementArray;
use super::variable::Variable;
use crate::error::{CoreError, Result};
use crate::layout::{DType, Dimensions};
use crate::units::Unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Comparison {
    fn holds<T: PartialOrd>(self, a: &T, b: &T) -> bool {
        match self {
            Comparison::Equal => a == b,
            Comparison::NotEqual => a != b,
            Comparison::Less => a < b,
            Comparison::LessEqual => a <= b,
            Comparison::Greater => a > b,
            Comparison::GreaterEqual => a >= b,
        }
    }

    fn is_ordering(self) -> bool {
        !matches!(self, Comparison::Equal | Comparison::NotEqual)
    }
}

fn zip_with<T: PartialOrd>(cmp: Comparison, a: &[T], b: &[T]) -> Vec<bool> {
    a.iter().zip(b.iter()).map(|(x, y)| cmp.holds(x, y)).collect()
}

impl Variable {
    /// Element-wise comparison producing a bool variable. Units must be identical.
    pub fn compare(&self, cmp: Comparison, other: &Variable) -> Result<Variable> {
        if self.is_binned() || other.is_binned() {
            return Err(CoreError::TypeError("comparison of binned variables is not supported".into()));
        }
        if self.unit() != other.unit() {
            return Err(CoreError::unit_mismatch(self.unit(), other.unit()));
        }
        let dims = Dimensions::merge(self.dims(), other.dims())?;
        let (_, a, _) = self.dense_in(&dims)?;
        let (_, b, _) = other.dense_in(&dims)?;
        let result = match (&a, &b) {
            (ElementArray::Int64(x), ElementArray::Int64(y)) => zip_with(cmp, x, y),
            (ElementArray::Int32(x), ElementArray::Int32(y)) => zip_with(cmp, x, y),
            (ElementArray::Bool(x), ElementArray::Bool(y)) => zip_with(cmp, x, y),
            (ElementArray::String(x), ElementArray::String(y)) => zip_with(cmp, x, y),
            (ElementArray::Vector3(x), ElementArray::Vector3(y)) if !cmp.is_ordering() => zip_with(cmp, x, y),
            _ if a.dtype().is_numeric() && b.dtype().is_numeric() => zip_with(cmp, &a.to_f64()?, &b.to_f64()?),
            _ => {
                return Err(CoreError::TypeError(format!(
                    "cannot compare {} with {}",
                    a.dtype(),
                    b.dtype()
                )))
            }
        };
        Variable::from_values(dims, Unit::dimensionless(), ElementArray::Bool(result), None)
    }

    pub fn equal(&self, other: &Variable) -> Result<Variable> {
        self.compare(Comparison::Equal, other)
    }

    pub fn not_equal(&self, other: &Variable) -> Result<Variable> {
        self.compare(Comparison::NotEqual, other)
    }

    pub fn less(&self, other: &Variable) -> Result<Variable> {
        self.compare(Comparison::Less, other)
    }

    pub fn less_equal(&self, other: &Variable) -> Result<Variable> {
        self.compare(Comparison::LessEqual, other)
    }

    pub fn greater(&self, other: &Variable) -> Result<Variable> {
        self.compare(Comparison::Greater, other)
    }

    pub fn greater_equal(&self, other: &Variable) -> Result<Variable> {
        self.compare(Comparison::GreaterEqual, other)
    }

    fn bools(&self) -> Result<Vec<bool>> {
        if self.dtype() != DType::Bool {
            return Err(CoreError::TypeError(format!("expected a bool variable, got {}", self.dtype())));
        }
        self.values::<bool>()
    }

    /// Scalar `true` if every element is `true`. Empty variables yield `true`.
    pub fn all(&self) -> Result<Variable> {
        let all = self.bools()?.into_iter().all(|b| b);
        Variable::from_values(Dimensions::scalar(), Unit::dimensionless(), ElementArray::Bool(vec![all]), None)
    }

    pub fn any(&self) -> Result<Variable> {
        let any = self.bools()?.into_iter().any(|b| b);
        Variable::from_values(Dimensions::scalar(), Unit::dimensionless(), ElementArray::Bool(vec![any]), None)
    }

    /// Element-wise OR of two bool variables, broadcasting by label.
    pub fn logical_or(&self, other: &Variable) -> Result<Variable> {
        let dims = Dimensions::merge(self.dims(), other.dims())?;
        let (_, a, _) = self.dense_in(&dims)?;
        let (_, b, _) = other.dense_in(&dims)?;
        match (a, b) {
            (ElementArray::Bool(a), ElementArray::Bool(b)) => Variable::from_values(
                dims,
                Unit::dimensionless(),
                ElementArray::Bool(a.iter().zip(b.iter()).map(|(x, y)| *x || *y).collect()),
                None,
            ),
            (a, b) => Err(CoreError::TypeError(format!(
                "logical or requires bool operands, got {} and {}",
                a.dtype(),
                b.dtype()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::creation::{array_1d, scalar};
    use rstest::rstest;

    #[rstest]
    #[case(Comparison::Equal, vec![false, true, false])]
    #[case(Comparison::NotEqual, vec![true, false, true])]
    #[case(Comparison::Less, vec![true, false, false])]
    #[case(Comparison::LessEqual, vec![true, true, false])]
    #[case(Comparison::Greater, vec![false, false, true])]
    #[case(Comparison::GreaterEqual, vec![false, true, true])]
    fn test_compare_against_broadcast_scalar(#[case] cmp: Comparison, #[case] expected: Vec<bool>) {
        let a = array_1d("x", vec![1.0, 2.0, 3.0], Unit::m()).unwrap();
        let out = a.compare(cmp, &scalar(2.0, Unit::m())).unwrap();
        assert_eq!(out.dtype(), DType::Bool);
        assert_eq!(out.values::<bool>().unwrap(), expected);
    }

    #[test]
    fn test_reductions() {
        let a = array_1d("x", vec![1.0, 2.0], Unit::m()).unwrap();
        let b = array_1d("x", vec![1.0, 3.0], Unit::m()).unwrap();
        assert!(!a.equal(&b).unwrap().all().unwrap().value::<bool>().unwrap());
        assert!(a.equal(&b).unwrap().any().unwrap().value::<bool>().unwrap());
        assert!(a.all().is_err());
    }

    #[test]
    fn test_unit_mismatch() {
        let a = array_1d("x", vec![1.0], Unit::m()).unwrap();
        let b = array_1d("x", vec![1.0], Unit::s()).unwrap();
        assert!(matches!(a.less(&b), Err(CoreError::UnitMismatch { .. })));
    }

    #[test]
    fn test_mixed_numeric_dtypes() {
        let a = array_1d("x", vec![1i64, 2], Unit::dimensionless()).unwrap();
        let b = array_1d("x", vec![1.5, 1.5], Unit::dimensionless()).unwrap();
        assert_eq!(a.less(&b).unwrap().values::<bool>().unwrap(), vec![true, false]);
    }
}
