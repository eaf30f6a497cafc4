//! Typed contiguous element buffers.
use crate::error::{CoreError, Result};
use crate::layout::DType;
use serde::{Deserialize, Serialize};

/// A flat buffer of elements of one dtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "data")]
pub enum ElementArray {
    Float64(Vec<f64>),
    Float32(Vec<f32>),
    Int64(Vec<i64>),
    Int32(Vec<i32>),
    Bool(Vec<bool>),
    String(Vec<String>),
    Vector3(Vec<[f64; 3]>),
}

/// Applies the same expression to the inner `Vec` of every variant.
macro_rules! map_array {
    ($array:expr, $v:ident => $body:expr) => {
        match $array {
            ElementArray::Float64($v) => ElementArray::Float64($body),
            ElementArray::Float32($v) => ElementArray::Float32($body),
            ElementArray::Int64($v) => ElementArray::Int64($body),
            ElementArray::Int32($v) => ElementArray::Int32($body),
            ElementArray::Bool($v) => ElementArray::Bool($body),
            ElementArray::String($v) => ElementArray::String($body),
            ElementArray::Vector3($v) => ElementArray::Vector3($body),
        }
    };
}

macro_rules! with_array {
    ($array:expr, $v:ident => $body:expr) => {
        match $array {
            ElementArray::Float64($v) => $body,
            ElementArray::Float32($v) => $body,
            ElementArray::Int64($v) => $body,
            ElementArray::Int32($v) => $body,
            ElementArray::Bool($v) => $body,
            ElementArray::String($v) => $body,
            ElementArray::Vector3($v) => $body,
        }
    };
}

fn type_error(expected: DType, actual: DType) -> CoreError {
    CoreError::TypeError(format!("expected dtype {}, got {}", expected, actual))
}

impl ElementArray {
    pub fn dtype(&self) -> DType {
        match self {
            ElementArray::Float64(_) => DType::Float64,
            ElementArray::Float32(_) => DType::Float32,
            ElementArray::Int64(_) => DType::Int64,
            ElementArray::Int32(_) => DType::Int32,
            ElementArray::Bool(_) => DType::Bool,
            ElementArray::String(_) => DType::String,
            ElementArray::Vector3(_) => DType::Vector3,
        }
    }

    pub fn len(&self) -> usize {
        with_array!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Default-initialized buffer: zeros, `false`, empty strings.
    pub fn zeros(dtype: DType, len: usize) -> Result<Self> {
        Ok(match dtype {
            DType::Float64 => ElementArray::Float64(vec![0.0; len]),
            DType::Float32 => ElementArray::Float32(vec![0.0; len]),
            DType::Int64 => ElementArray::Int64(vec![0; len]),
            DType::Int32 => ElementArray::Int32(vec![0; len]),
            DType::Bool => ElementArray::Bool(vec![false; len]),
            DType::String => ElementArray::String(vec![String::new(); len]),
            DType::Vector3 => ElementArray::Vector3(vec![[0.0; 3]; len]),
            DType::Bins => {
                return Err(CoreError::TypeError("binned variables are created with bins()".into()))
            }
        })
    }

    pub fn ones(dtype: DType, len: usize) -> Result<Self> {
        Ok(match dtype {
            DType::Float64 => ElementArray::Float64(vec![1.0; len]),
            DType::Float32 => ElementArray::Float32(vec![1.0; len]),
            DType::Int64 => ElementArray::Int64(vec![1; len]),
            DType::Int32 => ElementArray::Int32(vec![1; len]),
            DType::Bool => ElementArray::Bool(vec![true; len]),
            DType::Vector3 => ElementArray::Vector3(vec![[1.0; 3]; len]),
            other => return Err(CoreError::TypeError(format!("ones is not defined for dtype {}", other))),
        })
    }

    /// Copies the elements at `offsets` into a new contiguous buffer.
    pub fn gather(&self, offsets: &[usize]) -> ElementArray {
        map_array!(self, v => offsets.iter().map(|&o| v[o].clone()).collect())
    }

    /// Writes `src` element-wise to `offsets`. `src` must have the same dtype and length.
    pub fn scatter(&mut self, offsets: &[usize], src: &ElementArray) -> Result<()> {
        if src.len() != offsets.len() {
            return Err(CoreError::mismatch(
                format!("{} elements", offsets.len()),
                format!("{} elements", src.len()),
            ));
        }
        macro_rules! put {
            ($dst:ident, $s:ident) => {{
                for (&o, x) in offsets.iter().zip($s.iter()) {
                    $dst[o] = x.clone();
                }
                Ok(())
            }};
        }
        match (self, src) {
            (ElementArray::Float64(d), ElementArray::Float64(s)) => put!(d, s),
            (ElementArray::Float32(d), ElementArray::Float32(s)) => put!(d, s),
            (ElementArray::Int64(d), ElementArray::Int64(s)) => put!(d, s),
            (ElementArray::Int32(d), ElementArray::Int32(s)) => put!(d, s),
            (ElementArray::Bool(d), ElementArray::Bool(s)) => put!(d, s),
            (ElementArray::String(d), ElementArray::String(s)) => put!(d, s),
            (ElementArray::Vector3(d), ElementArray::Vector3(s)) => put!(d, s),
            (d, s) => Err(type_error(d.dtype(), s.dtype())),
        }
    }

    /// Converts numeric and bool buffers to `f64`.
    pub fn to_f64(&self) -> Result<Vec<f64>> {
        Ok(match self {
            ElementArray::Float64(v) => v.clone(),
            ElementArray::Float32(v) => v.iter().map(|&x| x as f64).collect(),
            ElementArray::Int64(v) => v.iter().map(|&x| x as f64).collect(),
            ElementArray::Int32(v) => v.iter().map(|&x| x as f64).collect(),
            ElementArray::Bool(v) => v.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect(),
            other => {
                return Err(CoreError::TypeError(format!("dtype {} is not numeric", other.dtype())))
            }
        })
    }

    /// Debug rendering of at most `max` leading elements.
    pub(crate) fn preview(&self, max: usize) -> String {
        let mut shown = with_array!(self, v => format!("{:?}", &v[..v.len().min(max)]));
        if self.len() > max {
            shown.pop();
            shown.push_str(", ...]");
        }
        shown
    }

    pub fn to_bool(&self) -> Result<Vec<bool>> {
        match self {
            ElementArray::Bool(v) => Ok(v.clone()),
            other => Err(type_error(DType::Bool, other.dtype())),
        }
    }

    /// Builds a numeric buffer of `dtype` from `f64` values. Integers are truncated.
    pub fn from_f64(dtype: DType, values: Vec<f64>) -> Result<Self> {
        Ok(match dtype {
            DType::Float64 => ElementArray::Float64(values),
            DType::Float32 => ElementArray::Float32(values.into_iter().map(|x| x as f32).collect()),
            DType::Int64 => ElementArray::Int64(values.into_iter().map(|x| x as i64).collect()),
            DType::Int32 => ElementArray::Int32(values.into_iter().map(|x| x as i32).collect()),
            other => return Err(CoreError::TypeError(format!("dtype {} is not numeric", other))),
        })
    }

    /// Numeric conversion. Identity casts return a clone.
    pub fn cast(&self, dtype: DType) -> Result<ElementArray> {
        if self.dtype() == dtype {
            return Ok(self.clone());
        }
        match (self, dtype) {
            (ElementArray::Int32(v), DType::Int64) => {
                Ok(ElementArray::Int64(v.iter().map(|&x| x as i64).collect()))
            }
            (ElementArray::Bool(v), DType::Int64) => {
                Ok(ElementArray::Int64(v.iter().map(|&x| x as i64).collect()))
            }
            _ if dtype.is_numeric() => ElementArray::from_f64(dtype, self.to_f64()?),
            _ => Err(type_error(dtype, self.dtype())),
        }
    }

    /// Joins buffers that each hold `outer` consecutive blocks; block `o` of part `p` has
    /// `block_sizes[p]` elements and the output interleaves them part by part.
    pub(crate) fn concat_blocks(parts: &[ElementArray], outer: usize, block_sizes: &[usize]) -> Result<ElementArray> {
        let first = parts
            .first()
            .ok_or_else(|| CoreError::InvalidArgument("nothing to concatenate".into()))?;
        let mut offsets = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
        let mut bases = Vec::with_capacity(parts.len());
        let mut base = 0;
        for p in parts {
            if p.dtype() != first.dtype() {
                return Err(type_error(first.dtype(), p.dtype()));
            }
            bases.push(base);
            base += p.len();
        }
        for o in 0..outer {
            for (p, &size) in block_sizes.iter().enumerate() {
                offsets.extend((0..size).map(|i| bases[p] + o * size + i));
            }
        }
        let mut joined = first.clone();
        for p in &parts[1..] {
            joined.extend_from(p)?;
        }
        Ok(joined.gather(&offsets))
    }

    fn extend_from(&mut self, other: &ElementArray) -> Result<()> {
        match (self, other) {
            (ElementArray::Float64(a), ElementArray::Float64(b)) => a.extend_from_slice(b),
            (ElementArray::Float32(a), ElementArray::Float32(b)) => a.extend_from_slice(b),
            (ElementArray::Int64(a), ElementArray::Int64(b)) => a.extend_from_slice(b),
            (ElementArray::Int32(a), ElementArray::Int32(b)) => a.extend_from_slice(b),
            (ElementArray::Bool(a), ElementArray::Bool(b)) => a.extend_from_slice(b),
            (ElementArray::String(a), ElementArray::String(b)) => a.extend_from_slice(b),
            (ElementArray::Vector3(a), ElementArray::Vector3(b)) => a.extend_from_slice(b),
            (a, b) => return Err(type_error(a.dtype(), b.dtype())),
        }
        Ok(())
    }
}

/// Rust element types that can live in an [`ElementArray`].
pub trait Element: Clone + Send + Sync + 'static {
    const DTYPE: DType;
    fn slice(array: &ElementArray) -> Option<&[Self]>;
    fn wrap(values: Vec<Self>) -> ElementArray;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn slice(array: &ElementArray) -> Option<&[Self]> {
                match array {
                    ElementArray::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn wrap(values: Vec<Self>) -> ElementArray {
                ElementArray::$variant(values)
            }
        }

        impl From<Vec<$ty>> for ElementArray {
            fn from(values: Vec<$ty>) -> Self {
                ElementArray::$variant(values)
            }
        }
    };
}

impl_element!(f64, Float64);
impl_element!(f32, Float32);
impl_element!(i64, Int64);
impl_element!(i32, Int32);
impl_element!(bool, Bool);
impl_element!(String, String);
impl_element!([f64; 3], Vector3);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_and_scatter() {
        let mut a = ElementArray::from(vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(a.gather(&[3, 0]), ElementArray::from(vec![4.0, 1.0]));
        a.scatter(&[1, 2], &ElementArray::from(vec![9.0, 8.0])).unwrap();
        assert_eq!(a, ElementArray::from(vec![1.0, 9.0, 8.0, 4.0]));
    }

    #[test]
    fn test_scatter_rejects_dtype_mismatch() {
        let mut a = ElementArray::from(vec![1.0, 2.0]);
        let err = a.scatter(&[0], &ElementArray::from(vec![1i64])).unwrap_err();
        assert!(matches!(err, CoreError::TypeError(_)));
    }

    #[test]
    fn test_cast() {
        let a = ElementArray::from(vec![1i32, 2]);
        assert_eq!(a.cast(DType::Float64).unwrap(), ElementArray::from(vec![1.0, 2.0]));
        assert!(ElementArray::from(vec!["a".to_string()]).cast(DType::Float64).is_err());
    }

    #[test]
    fn test_concat_blocks_interleaves_parts() {
        // Two parts with 2 outer blocks each: [a0 a1 | a2 a3] and [b0 | b1].
        let a = ElementArray::from(vec![0i64, 1, 2, 3]);
        let b = ElementArray::from(vec![10i64, 11]);
        let joined = ElementArray::concat_blocks(&[a, b], 2, &[2, 1]).unwrap();
        assert_eq!(joined, ElementArray::from(vec![0i64, 1, 10, 2, 3, 11]));
    }
}
