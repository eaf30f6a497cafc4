//! Unit inference for arithmetic and the guard against unsupported results.
use super::unit::{BaseDim, Ratio, Unit};
use crate::error::{CoreError, Result};
use crate::variable::kernel::BinaryOp;
use serde::{Deserialize, Serialize};

/// Which results of unit arithmetic are representable.
///
/// Counts may appear up to `max_counts_power` (squared counts are the unit of
/// variances of counts); every other base dimension up to `max_base_power`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPolicy {
    pub max_counts_power: i32,
    pub max_base_power: i32,
    /// Units that rebin may redistribute by overlap fraction.
    pub extensive: Vec<Unit>,
}

impl Default for UnitPolicy {
    fn default() -> Self {
        Self {
            max_counts_power: 2,
            max_base_power: 4,
            extensive: vec![Unit::counts(), Unit::dimensionless()],
        }
    }
}

impl UnitPolicy {
    pub fn admits(&self, unit: &Unit) -> bool {
        BaseDim::ALL.iter().all(|&dim| {
            let bound = if dim == BaseDim::Counts { self.max_counts_power } else { self.max_base_power };
            !unit.exponent(dim).exceeds(bound)
        })
    }

    /// `None` means an exponent overflowed, which no policy admits.
    fn guard(&self, unit: Option<Unit>, op: &str, detail: impl FnOnce() -> String) -> Result<Unit> {
        match unit {
            Some(unit) if self.admits(&unit) => Ok(unit),
            _ => Err(CoreError::UnsupportedUnit { op: op.to_string(), detail: detail() }),
        }
    }

    /// Infers the result unit of `a op b`.
    pub fn infer(&self, op: BinaryOp, a: &Unit, b: &Unit) -> Result<Unit> {
        match op {
            BinaryOp::Add | BinaryOp::Sub => {
                if a == b {
                    Ok(*a)
                } else {
                    Err(CoreError::unit_mismatch(a, b))
                }
            }
            BinaryOp::Mul => self.guard(a.checked_mul(b), "multiplication", || format!("({}) * ({})", a, b)),
            BinaryOp::Div => self.guard(a.checked_div(b), "division", || format!("({}) / ({})", a, b)),
        }
    }

    pub fn power(&self, a: &Unit, exponent: Ratio) -> Result<Unit> {
        self.guard(a.checked_pow(exponent), "power", || format!("({})^{}", a, exponent))
    }

    pub fn reciprocal(&self, a: &Unit) -> Result<Unit> {
        self.guard(a.checked_reciprocal(), "reciprocal", || format!("1 / ({})", a))
    }

    /// Rebinning redistributes values by overlap, which is only meaningful for extensive units.
    pub fn expect_extensive(&self, op: &str, unit: &Unit) -> Result<()> {
        if self.extensive.contains(unit) {
            Ok(())
        } else {
            Err(CoreError::UnsupportedUnit {
                op: op.to_string(),
                detail: format!("only counts and dimensionless data can be redistributed, got {}", unit),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BinaryOp::Mul, "m", "s", "m*s")]
    #[case(BinaryOp::Div, "m", "s", "m/s")]
    #[case(BinaryOp::Mul, "counts", "counts", "counts^2")]
    #[case(BinaryOp::Div, "counts", "counts", "dimensionless")]
    #[case(BinaryOp::Add, "counts", "counts", "counts")]
    fn test_infer_supported(#[case] op: BinaryOp, #[case] a: &str, #[case] b: &str, #[case] expected: &str) {
        let policy = UnitPolicy::default();
        let a = Unit::parse(a).unwrap();
        let b = Unit::parse(b).unwrap();
        assert_eq!(policy.infer(op, &a, &b).unwrap().to_string(), expected);
    }

    #[test]
    fn test_counts_squared_squared_is_rejected_with_operands_named() {
        let policy = UnitPolicy::default();
        let c2 = Unit::counts().powi(2);
        let err = policy.infer(BinaryOp::Mul, &c2, &c2).unwrap_err();
        match &err {
            CoreError::UnsupportedUnit { detail, .. } => {
                assert_eq!(detail, "(counts^2) * (counts^2)");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.to_string().contains("counts^2"));
    }

    #[test]
    fn test_add_requires_identical_units() {
        let policy = UnitPolicy::default();
        let err = policy.infer(BinaryOp::Add, &Unit::m(), &Unit::s()).unwrap_err();
        assert!(matches!(err, CoreError::UnitMismatch { .. }));
    }

    #[test]
    fn test_extensive_units_for_rebin() {
        let policy = UnitPolicy::default();
        assert!(policy.expect_extensive("rebin", &Unit::counts()).is_ok());
        assert!(policy.expect_extensive("rebin", &Unit::dimensionless()).is_ok());
        assert!(policy.expect_extensive("rebin", &Unit::m()).is_err());
    }

    #[test]
    fn test_power_bounds() {
        let policy = UnitPolicy::default();
        assert!(policy.power(&Unit::m(), Ratio::integer(4)).is_ok());
        assert!(policy.power(&Unit::m(), Ratio::integer(5)).is_err());
        assert!(policy.reciprocal(&Unit::counts().powi(2)).is_ok());
    }

    #[test]
    fn test_exponent_overflow_is_unsupported() {
        let policy = UnitPolicy { max_counts_power: i32::MAX, max_base_power: i32::MAX, ..UnitPolicy::default() };
        let huge = Unit::m().powi(i32::MAX);
        let err = policy.infer(BinaryOp::Mul, &huge, &huge).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedUnit { .. }));
        assert!(policy.power(&huge, Ratio::integer(2)).is_err());
    }
}
