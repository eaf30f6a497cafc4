//! Element-wise arithmetic kernels with first-order variance propagation.
use crate::error::{CoreError, Result};
use crate::layout::DType;
use crate::variable::element_array::ElementArray;
use rayon::prelude::*;
use std::ops::{Add, Div, Mul, Sub};
use wide::f64x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BinaryOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Inputs shorter than this run on the calling thread.
const PAR_THRESHOLD: usize = 1 << 14;
const CHUNK: usize = 4096;

pub trait Numeric:
    Copy + Send + Sync + PartialOrd + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self> + Div<Output = Self>
{
}

impl Numeric for f64 {}
impl Numeric for f32 {}
impl Numeric for i64 {}
impl Numeric for i32 {}

#[inline(always)]
fn execute_scalar<T: Numeric>(op: BinaryOp, dest: &mut [T], lhs: &[T], rhs: &[T]) {
    let lanes = dest.iter_mut().zip(lhs.iter()).zip(rhs.iter());
    match op {
        BinaryOp::Add => lanes.for_each(|((d, &a), &b)| *d = a + b),
        BinaryOp::Sub => lanes.for_each(|((d, &a), &b)| *d = a - b),
        BinaryOp::Mul => lanes.for_each(|((d, &a), &b)| *d = a * b),
        BinaryOp::Div => lanes.for_each(|((d, &a), &b)| *d = a / b),
    }
}

#[inline(always)]
fn execute_f64x4(op: BinaryOp, dest: &mut [f64], lhs: &[f64], rhs: &[f64]) {
    let n4 = dest.len() / 4 * 4;
    let (head, tail) = dest.split_at_mut(n4);
    for ((d, a), b) in head.chunks_exact_mut(4).zip(lhs.chunks_exact(4)).zip(rhs.chunks_exact(4)) {
        let va = f64x4::new([a[0], a[1], a[2], a[3]]);
        let vb = f64x4::new([b[0], b[1], b[2], b[3]]);
        let r = match op {
            BinaryOp::Add => va + vb,
            BinaryOp::Sub => va - vb,
            BinaryOp::Mul => va * vb,
            BinaryOp::Div => va / vb,
        };
        d.copy_from_slice(&r.to_array());
    }
    execute_scalar(op, tail, &lhs[n4..], &rhs[n4..]);
}

/// Runs `kernel` over aligned chunks of the three slices; parallel for large inputs.
fn for_each_chunk<T, F>(dest: &mut [T], lhs: &[T], rhs: &[T], kernel: F)
where
    T: Send + Sync,
    F: Fn(&mut [T], &[T], &[T]) + Sync,
{
    if dest.len() < PAR_THRESHOLD {
        kernel(dest, lhs, rhs);
        return;
    }
    dest.par_chunks_mut(CHUNK)
        .zip(lhs.par_chunks(CHUNK))
        .zip(rhs.par_chunks(CHUNK))
        .for_each(|((d, a), b)| kernel(d, a, b));
}

fn execute<T: Numeric>(op: BinaryOp, lhs: &[T], rhs: &[T]) -> Vec<T> {
    let mut dest = lhs.to_vec();
    for_each_chunk(&mut dest, lhs, rhs, |d, a, b| execute_scalar(op, d, a, b));
    dest
}

fn execute_f64(op: BinaryOp, lhs: &[f64], rhs: &[f64]) -> Vec<f64> {
    let mut dest = lhs.to_vec();
    for_each_chunk(&mut dest, lhs, rhs, |d, a, b| execute_f64x4(op, d, a, b));
    dest
}

/// Variance of `a op b` for uncorrelated operands.
#[inline(always)]
fn variance(op: BinaryOp, a: f64, b: f64, va: f64, vb: f64) -> f64 {
    match op {
        BinaryOp::Add | BinaryOp::Sub => va + vb,
        BinaryOp::Mul => va * b * b + vb * a * a,
        BinaryOp::Div => {
            let b2 = b * b;
            va / b2 + vb * a * a / (b2 * b2)
        }
    }
}

fn propagate_variances(op: BinaryOp, a: &[f64], b: &[f64], va: Option<&[f64]>, vb: Option<&[f64]>) -> Vec<f64> {
    let at = |v: Option<&[f64]>, i: usize| v.map_or(0.0, |v| v[i]);
    let compute = |i: usize| variance(op, a[i], b[i], at(va, i), at(vb, i));
    if a.len() < PAR_THRESHOLD {
        (0..a.len()).map(compute).collect()
    } else {
        (0..a.len()).into_par_iter().map(compute).collect()
    }
}

/// Computes `lhs op rhs` element-wise for equal-length buffers, casting both to `dtype`.
/// Variances are propagated if either side carries them.
pub(crate) fn apply(
    op: BinaryOp,
    dtype: DType,
    lhs: &ElementArray,
    rhs: &ElementArray,
    lhs_var: Option<&ElementArray>,
    rhs_var: Option<&ElementArray>,
) -> Result<(ElementArray, Option<ElementArray>)> {
    // Validate once so the hot loops can zip without truncating.
    if lhs.len() != rhs.len() {
        return Err(CoreError::mismatch(
            format!("{} elements", lhs.len()),
            format!("{} elements", rhs.len()),
        ));
    }
    if dtype.is_int() && op == BinaryOp::Div {
        return Err(CoreError::TypeError("integer division is not supported; use float operands".into()));
    }
    let a = lhs.cast(dtype)?;
    let b = rhs.cast(dtype)?;
    let values = match (&a, &b) {
        (ElementArray::Float64(a), ElementArray::Float64(b)) => ElementArray::Float64(execute_f64(op, a, b)),
        (ElementArray::Float32(a), ElementArray::Float32(b)) => ElementArray::Float32(execute(op, a, b)),
        (ElementArray::Int64(a), ElementArray::Int64(b)) => ElementArray::Int64(execute(op, a, b)),
        (ElementArray::Int32(a), ElementArray::Int32(b)) => ElementArray::Int32(execute(op, a, b)),
        _ => return Err(CoreError::TypeError(format!("arithmetic is not defined for dtype {}", dtype))),
    };

    if lhs_var.is_none() && rhs_var.is_none() {
        return Ok((values, None));
    }
    if !dtype.is_float() {
        return Err(CoreError::VariancesError(format!("dtype {} cannot carry variances", dtype)));
    }
    let va = lhs_var.map(ElementArray::to_f64).transpose()?;
    let vb = rhs_var.map(ElementArray::to_f64).transpose()?;
    let variances = propagate_variances(op, &a.to_f64()?, &b.to_f64()?, va.as_deref(), vb.as_deref());
    Ok((values, Some(ElementArray::from_f64(dtype, variances)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BinaryOp::Add, vec![4.0, 6.0, 8.0, 10.0, 12.0])]
    #[case(BinaryOp::Sub, vec![-2.0, -2.0, -2.0, -2.0, -2.0])]
    #[case(BinaryOp::Mul, vec![3.0, 8.0, 15.0, 24.0, 35.0])]
    fn test_simd_path_with_remainder(#[case] op: BinaryOp, #[case] expected: Vec<f64>) {
        let a = ElementArray::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = ElementArray::from(vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        let (values, variances) = apply(op, DType::Float64, &a, &b, None, None).unwrap();
        assert_eq!(values, ElementArray::from(expected));
        assert!(variances.is_none());
    }

    #[test]
    fn test_parallel_path_matches_sequential() {
        let n = PAR_THRESHOLD * 2 + 3;
        let a: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let b = vec![2.0; n];
        let out = execute_f64(BinaryOp::Mul, &a, &b);
        assert!(out.iter().enumerate().all(|(i, &x)| x == 2.0 * i as f64));
    }

    #[test]
    fn test_variance_propagation() {
        let a = ElementArray::from(vec![2.0]);
        let b = ElementArray::from(vec![4.0]);
        let va = ElementArray::from(vec![1.0]);
        let vb = ElementArray::from(vec![2.0]);

        let (_, v) = apply(BinaryOp::Add, DType::Float64, &a, &b, Some(&va), Some(&vb)).unwrap();
        assert_eq!(v.unwrap(), ElementArray::from(vec![3.0]));

        // va*b^2 + vb*a^2 = 16 + 8
        let (_, v) = apply(BinaryOp::Mul, DType::Float64, &a, &b, Some(&va), Some(&vb)).unwrap();
        assert_eq!(v.unwrap(), ElementArray::from(vec![24.0]));

        // va/b^2 + vb*a^2/b^4 = 1/16 + 8/256
        let (_, v) = apply(BinaryOp::Div, DType::Float64, &a, &b, Some(&va), Some(&vb)).unwrap();
        assert_eq!(v.unwrap(), ElementArray::from(vec![1.0 / 16.0 + 8.0 / 256.0]));
    }

    #[test]
    fn test_integer_division_rejected() {
        let a = ElementArray::from(vec![1i64]);
        let err = apply(BinaryOp::Div, DType::Int64, &a, &a, None, None).unwrap_err();
        assert!(matches!(err, CoreError::TypeError(_)));
    }
}
