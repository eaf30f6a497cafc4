//! Scaling of bin contents by a step function of one of their coordinates.
use super::container::{expect_row_table, Bins};
use crate::binning::edges::{edge_values, EdgeIndex};
use crate::dataset::DataArray;
use crate::error::{CoreError, Result};
use crate::layout::Dim;
use crate::units::UnitPolicy;
use crate::variable::{BinaryOp, ElementArray, Variable};
use log::debug;
use rayon::prelude::*;

/// A histogram used as a step function: value `k` applies to coordinates in `[edge_k, edge_{k+1})`.
#[derive(Debug, Clone)]
pub struct Lookup {
    func: DataArray,
    dim: Dim,
}

impl Lookup {
    /// `func` must be dense, 1-D along `dim`, with a bin-edge coord for `dim`.
    pub fn new(func: DataArray, dim: &str) -> Result<Self> {
        if func.is_binned() {
            return Err(CoreError::TypeError("lookup function must hold dense data".into()));
        }
        if !func.dims().is_1d_along(dim) {
            return Err(CoreError::InvalidArgument(format!(
                "lookup function must be 1-D along {}, got {}",
                dim,
                func.dims()
            )));
        }
        if !func.is_edges(dim)? {
            return Err(CoreError::InvalidArgument(format!(
                "lookup function needs bin edges along {}",
                dim
            )));
        }
        edge_values(func.coord(dim)?, dim)?;
        if !func.dtype().is_numeric() {
            return Err(CoreError::TypeError(format!("lookup values must be numeric, got {}", func.dtype())));
        }
        Ok(Self { func, dim: Dim::from(dim) })
    }

    pub fn func(&self) -> &DataArray {
        &self.func
    }

    pub fn dim(&self) -> &Dim {
        &self.dim
    }

    /// Lookup with reciprocal values, used for division.
    pub fn reciprocal(&self) -> Result<Lookup> {
        let func = self.func.with_data(self.func.data().reciprocal()?)?;
        Ok(Lookup { func, dim: self.dim.clone() })
    }
}

/// Multiplies every row referenced by the bins of `var` by the lookup value at the row's
/// coordinate. Rows outside the edges, with NaN coordinates or in masked lookup bins are
/// scaled by zero.
pub(crate) fn scale_in_place(var: &Variable, lookup: &Lookup) -> Result<()> {
    let (ranges, bin_dim, buffer) = var.bin_parts()?;
    let content = buffer.data();
    expect_row_table(content, &bin_dim)?;
    let dim = lookup.dim.as_str();
    let coord = buffer.coord(dim)?;
    let edges_var = lookup.func.coord(dim)?;
    if coord.unit() != edges_var.unit() {
        return Err(CoreError::unit_mismatch(edges_var.unit(), coord.unit()));
    }
    if !coord.dims().is_1d_along(bin_dim.as_str()) {
        return Err(CoreError::mismatch(content.dims(), coord.dims()));
    }
    if !content.dtype().is_float() {
        return Err(CoreError::TypeError(format!("cannot scale bin contents of dtype {}", content.dtype())));
    }
    let unit = UnitPolicy::default().infer(BinaryOp::Mul, &content.unit(), &lookup.func.unit())?;
    if unit != content.unit() && !var.can_set_unit() {
        return Err(CoreError::InvalidArgument(
            "Partial view on data of variable cannot be used to change the unit".into(),
        ));
    }
    let (_, func_values, func_variances) = lookup.func.data().dense_in(lookup.func.dims())?;
    if func_variances.is_some() && !content.has_variances() {
        return Err(CoreError::VariancesError(
            "lookup has variances but the bin contents do not".into(),
        ));
    }

    let index = EdgeIndex::new(edge_values(edges_var, dim)?);
    let mask = lookup.func.row_mask(dim)?;
    let zero_masked = |values: Vec<f64>| -> Vec<f64> {
        match &mask {
            Some(m) => values.into_iter().zip(m).map(|(w, &masked)| if masked { 0.0 } else { w }).collect(),
            None => values,
        }
    };
    let weights = zero_masked(func_values.to_f64()?);
    let weight_vars = func_variances.map(|v| v.to_f64()).transpose()?.map(zero_masked);

    let x = coord.values_array()?.to_f64()?;
    let mut covered = vec![false; x.len()];
    for range in &ranges {
        covered[range.rows()].iter_mut().for_each(|c| *c = true);
    }
    let (_, values, variances) = content.dense_in(content.dims())?;
    let dtype = values.dtype();
    let values = values.to_f64()?;
    let variances = variances.map(|v| v.to_f64()).transpose()?;

    let factor = |i: usize| -> (f64, f64) {
        match index.find(x[i]) {
            Some(k) => (weights[k], weight_vars.as_ref().map_or(0.0, |v| v[k])),
            None => (0.0, 0.0),
        }
    };
    let new_values: Vec<f64> = (0..values.len())
        .into_par_iter()
        .map(|i| if covered[i] { values[i] * factor(i).0 } else { values[i] })
        .collect();
    let new_variances = variances.map(|var| -> Vec<f64> {
        (0..var.len())
            .into_par_iter()
            .map(|i| {
                if !covered[i] {
                    return var[i];
                }
                let (f, vf) = factor(i);
                var[i] * f * f + values[i] * values[i] * vf
            })
            .collect()
    });
    debug!(
        "scale bins: {} rows along {} by lookup with {} bins",
        covered.iter().filter(|c| **c).count(),
        dim,
        index.bins()
    );

    let new_values = ElementArray::from_f64(dtype, new_values)?;
    let new_variances = new_variances.map(|v| ElementArray::from_f64(dtype, v)).transpose()?;
    content.assign(&new_values, new_variances.as_ref())?;
    if unit != content.unit() {
        content.set_unit(unit)?;
    }
    Ok(())
}

impl<'a> Bins<'a> {
    /// Multiplies the bin contents in place. Aliases of the buffer observe the change.
    pub fn mul_in_place(&self, lookup: &Lookup) -> Result<()> {
        scale_in_place(self.var, lookup)
    }

    pub fn div_in_place(&self, lookup: &Lookup) -> Result<()> {
        scale_in_place(self.var, &lookup.reciprocal()?)
    }

    /// Scaled copy; the input is left untouched.
    pub fn mul(&self, lookup: &Lookup) -> Result<Variable> {
        let out = self.var.copy()?;
        scale_in_place(&out, lookup)?;
        Ok(out)
    }

    pub fn div(&self, lookup: &Lookup) -> Result<Variable> {
        let out = self.var.copy()?;
        scale_in_place(&out, &lookup.reciprocal()?)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::bins;
    use crate::units::Unit;
    use crate::variable::creation::{array, array_1d, scalar};

    fn events() -> Variable {
        let data = array(&["event"], &[3], vec![1.0, 1.0, 1.0], Some(vec![1.0, 1.0, 1.0].into()), Unit::counts()).unwrap();
        let table = DataArray::new(data)
            .with_coord("x", array_1d("event", vec![0.5, 1.5, 5.0], Unit::m()).unwrap())
            .unwrap();
        let begin = array_1d("y", vec![0i64], Unit::dimensionless()).unwrap();
        let end = array_1d("y", vec![3i64], Unit::dimensionless()).unwrap();
        bins(Some(&begin), Some(&end), "event", &table).unwrap()
    }

    fn lookup(values: Vec<f64>) -> Lookup {
        let func = DataArray::new(array_1d("x", values, Unit::dimensionless()).unwrap())
            .with_coord("x", array_1d("x", vec![0.0, 1.0, 2.0], Unit::m()).unwrap())
            .unwrap();
        Lookup::new(func, "x").unwrap()
    }

    fn contents(var: &Variable) -> Vec<f64> {
        var.bins().unwrap().data().unwrap().data().values::<f64>().unwrap()
    }

    #[test]
    fn test_mul_and_div_by_lookup() {
        let var = events();
        let scaled = var.bins().unwrap().mul(&lookup(vec![2.0, 3.0])).unwrap();
        assert_eq!(contents(&scaled), vec![2.0, 3.0, 0.0]);
        let variances = scaled.bins().unwrap().data().unwrap().data().variances::<f64>().unwrap();
        assert_eq!(variances, vec![4.0, 9.0, 0.0]);
        assert_eq!(contents(&var), vec![1.0, 1.0, 1.0]);

        let back = scaled.bins().unwrap().div(&lookup(vec![2.0, 3.0])).unwrap();
        for (got, expected) in contents(&back).iter().zip([1.0, 1.0, 0.0]) {
            assert!((got - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_in_place_scale_is_seen_by_aliases() {
        let var = events();
        let alias = var.clone();
        var.bins().unwrap().mul_in_place(&lookup(vec![2.0, 3.0])).unwrap();
        assert_eq!(contents(&alias), vec![2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_masked_lookup_bin_scales_by_zero() {
        let func = lookup(vec![2.0, 3.0])
            .func()
            .clone()
            .with_mask("m", array_1d("x", vec![true, false], Unit::dimensionless()).unwrap())
            .unwrap();
        let scaled = events().bins().unwrap().mul(&Lookup::new(func, "x").unwrap()).unwrap();
        assert_eq!(contents(&scaled), vec![0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_scale_validation() {
        let var = events();
        let func = DataArray::new(array_1d("x", vec![2.0, 3.0], Unit::dimensionless()).unwrap())
            .with_coord("x", array_1d("x", vec![0.0, 1.0, 2.0], Unit::s()).unwrap())
            .unwrap();
        let wrong_unit = Lookup::new(func, "x").unwrap();
        assert!(matches!(var.bins().unwrap().mul(&wrong_unit), Err(CoreError::UnitMismatch { .. })));

        let point_coords = DataArray::new(array_1d("x", vec![2.0, 3.0], Unit::dimensionless()).unwrap())
            .with_coord("x", array_1d("x", vec![0.0, 1.0], Unit::m()).unwrap())
            .unwrap();
        assert!(matches!(Lookup::new(point_coords, "x"), Err(CoreError::InvalidArgument(_))));

        let dense = scalar(1.0, Unit::counts());
        assert!(matches!(dense.bins(), Err(CoreError::NotBinnedData(_))));
    }
}
