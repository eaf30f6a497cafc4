//! Construction of binned variables and the per-bin accessor.
use crate::dataset::DataArray;
use crate::error::{CoreError, Result};
use crate::layout::{DType, Dim, Dimensions};
use crate::units::Unit;
use crate::variable::{BinRange, ElementArray, Variable};
use rayon::prelude::*;

/// Contiguous ranges for bins of the given sizes, in order.
pub(crate) fn ranges_from_sizes(sizes: impl IntoIterator<Item = usize>) -> Vec<BinRange> {
    let mut begin = 0;
    sizes
        .into_iter()
        .map(|n| {
            let range = BinRange::new(begin, begin + n);
            begin += n;
            range
        })
        .collect()
}

fn bin_indices(var: &Variable) -> Result<Vec<usize>> {
    let raw: Vec<i64> = match var.dtype() {
        DType::Int64 => var.values::<i64>()?,
        DType::Int32 => var.values::<i32>()?.into_iter().map(i64::from).collect(),
        other => {
            return Err(CoreError::TypeError(format!("bin indices must be integers, got {}", other)))
        }
    };
    raw.into_iter()
        .map(|i| usize::try_from(i).map_err(|_| CoreError::SliceOutOfRange(format!("negative bin index {}", i))))
        .collect()
}

/// Builds a binned variable whose bins are rows `[begin, end)` of a copy of `data` along `dim`.
///
/// Without `end`, every bin holds the single row `begin`. Without both, there is one bin per row
/// and the result has `data`'s extent along `dim`.
pub fn bins(begin: Option<&Variable>, end: Option<&Variable>, dim: &str, data: &DataArray) -> Result<Variable> {
    let rows = data.dims().extent(dim)?;
    let (dims, ranges) = match (begin, end) {
        (None, None) => (
            Dimensions::from_pairs([(Dim::from(dim), rows)])?,
            (0..rows).map(|i| BinRange::new(i, i + 1)).collect(),
        ),
        (None, Some(_)) => {
            return Err(CoreError::InvalidArgument("`end` requires `begin`".into()));
        }
        (Some(b), end) => {
            let begins = bin_indices(b)?;
            let ends = match end {
                Some(e) if e.dims() != b.dims() => return Err(CoreError::mismatch(b.dims(), e.dims())),
                Some(e) => bin_indices(e)?,
                None => begins.iter().map(|&i| i + 1).collect(),
            };
            let ranges = begins.into_iter().zip(ends).map(|(b, e)| BinRange::new(b, e)).collect();
            (b.dims().clone(), ranges)
        }
    };
    Variable::from_bins(dims, ranges, Dim::from(dim), data.copy()?)
}

/// Deep copy of a binned variable holding only the rows its bins reference, bins laid out
/// contiguously in element order.
pub(crate) fn compact(var: &Variable) -> Result<Variable> {
    let (ranges, dim, buffer) = var.bin_parts()?;
    let rows: Vec<usize> = ranges.iter().flat_map(|r| r.rows()).collect();
    let content = buffer.take_rows(dim.as_str(), &rows)?.copy()?;
    Variable::from_bins(var.dims().clone(), ranges_from_sizes(ranges.iter().map(BinRange::len)), dim, content)
}

/// Bin-by-bin equality of contents, independent of buffer layout.
pub(crate) fn bins_equal(a: &Variable, b: &Variable) -> Result<bool> {
    let (ra, da, _) = a.bin_parts()?;
    let (rb, db, _) = b.bin_parts()?;
    if da != db || ra.len() != rb.len() || ra.iter().zip(rb.iter()).any(|(x, y)| x.len() != y.len()) {
        return Ok(false);
    }
    Ok(compact(a)?.bin_parts()?.2 == compact(b)?.bin_parts()?.2)
}

/// Per-bin view of a binned variable.
#[derive(Debug, Clone, Copy)]
pub struct Bins<'a> {
    pub(crate) var: &'a Variable,
}

impl Variable {
    pub fn bins(&self) -> Result<Bins<'_>> {
        if !self.is_binned() {
            return Err(CoreError::NotBinnedData(format!(
                "variable with dimensions {} holds dense data",
                self.dims()
            )));
        }
        Ok(Bins { var: self })
    }
}

impl<'a> Bins<'a> {
    fn index_snapshot(&self, pick: impl Fn(&BinRange) -> usize) -> Result<Variable> {
        let (ranges, _, _) = self.var.bin_parts()?;
        let values: Vec<i64> = ranges.iter().map(|r| pick(r) as i64).collect();
        Variable::from_values(self.var.dims().clone(), Unit::dimensionless(), ElementArray::Int64(values), None)
    }

    /// First row of every bin, as a new int64 variable.
    pub fn begin(&self) -> Result<Variable> {
        self.index_snapshot(|r| r.begin)
    }

    /// One past the last row of every bin.
    pub fn end(&self) -> Result<Variable> {
        self.index_snapshot(|r| r.end)
    }

    /// Number of rows in every bin.
    pub fn size(&self) -> Result<Variable> {
        self.index_snapshot(BinRange::len)
    }

    pub fn dim(&self) -> Result<Dim> {
        Ok(self.var.bin_parts()?.1)
    }

    /// The content buffer. Shares storage with the binned variable.
    pub fn data(&self) -> Result<DataArray> {
        Ok(self.var.bin_parts()?.2)
    }

    /// Sum over the rows of every bin. Masked rows contribute zero; empty bins are zero.
    /// Floats keep their dtype, integers and bools sum to int64.
    pub fn sum(&self) -> Result<Variable> {
        let (ranges, dim, buffer) = self.var.bin_parts()?;
        let content = buffer.data();
        expect_row_table(content, &dim)?;
        let mask = buffer.row_mask(dim.as_str())?;
        let keep = |row: &usize| mask.as_ref().map_or(true, |m| !m[*row]);
        let (unit, values, variances) = content.dense_in(content.dims())?;

        let sum_f64 = |x: &[f64]| -> Vec<f64> {
            ranges
                .par_iter()
                .map(|r| r.rows().filter(keep).fold(0.0, |acc, i| acc + x[i]))
                .collect()
        };
        let dtype = values.dtype();
        let sums = match dtype {
            DType::Float64 | DType::Float32 => ElementArray::from_f64(dtype, sum_f64(&values.to_f64()?))?,
            DType::Int64 | DType::Int32 | DType::Bool => {
                let x = match values.cast(DType::Int64)? {
                    ElementArray::Int64(v) => v,
                    other => return Err(CoreError::TypeError(format!("cannot sum {}", other.dtype()))),
                };
                ElementArray::Int64(
                    ranges
                        .par_iter()
                        .map(|r| r.rows().filter(keep).fold(0i64, |acc, i| acc + x[i]))
                        .collect(),
                )
            }
            other => return Err(CoreError::TypeError(format!("cannot sum bins of dtype {}", other))),
        };
        let variances = match variances {
            Some(v) => Some(ElementArray::from_f64(v.dtype(), sum_f64(&v.to_f64()?))?),
            None => None,
        };
        Variable::from_values(self.var.dims().clone(), unit, sums, variances)
    }
}

/// Bin contents must be a table: data 1-D along the bin dim.
pub(crate) fn expect_row_table(content: &Variable, dim: &Dim) -> Result<()> {
    if !content.dims().is_1d_along(dim.as_str()) {
        return Err(CoreError::InvalidArgument(format!(
            "bin contents must be 1-D along {}, got {}",
            dim,
            content.dims()
        )));
    }
    Ok(())
}
