//! Bin-edge validation and lookup.
use crate::error::{CoreError, Result};
use crate::variable::Variable;

/// Values of an edge variable: 1-D along `dim`, numeric, at least two, strictly ascending.
pub(crate) fn edge_values(edges: &Variable, dim: &str) -> Result<Vec<f64>> {
    if !edges.dims().is_1d_along(dim) {
        return Err(CoreError::InvalidArgument(format!(
            "bin edges must be 1-D along {}, got {}",
            dim,
            edges.dims()
        )));
    }
    if !edges.dtype().is_numeric() {
        return Err(CoreError::TypeError(format!("bin edges must be numeric, got {}", edges.dtype())));
    }
    let values = edges.values_array()?.to_f64()?;
    if values.len() < 2 {
        return Err(CoreError::InvalidArgument(format!("need at least two bin edges along {}", dim)));
    }
    // `!(a < b)` also rejects NaN.
    if values.windows(2).any(|w| !(w[0] < w[1])) {
        return Err(CoreError::InvalidArgument(format!(
            "bin edges along {} must be sorted in ascending order",
            dim
        )));
    }
    Ok(values)
}

/// Maps a coordinate to the index of the half-open interval `[e_k, e_{k+1})` containing it.
#[derive(Debug, Clone)]
pub(crate) struct EdgeIndex {
    edges: Vec<f64>,
    // (first edge, bins per unit) when the edges are evenly spaced
    linspace: Option<(f64, f64)>,
}

impl EdgeIndex {
    pub fn new(edges: Vec<f64>) -> Self {
        let n = edges.len() - 1;
        let (first, last) = (edges[0], edges[n]);
        let step = (last - first) / n as f64;
        let even = edges
            .windows(2)
            .all(|w| ((w[1] - w[0]) - step).abs() <= 1e-12 * step.abs().max(f64::MIN_POSITIVE));
        let linspace = even.then(|| (first, 1.0 / step));
        Self { edges, linspace }
    }

    pub fn bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// `None` below the first edge, at or above the last edge, and for NaN.
    pub fn find(&self, x: f64) -> Option<usize> {
        let n = self.bins();
        if x.is_nan() || x < self.edges[0] || x >= self.edges[n] {
            return None;
        }
        let k = match self.linspace {
            Some((first, per_unit)) => {
                let mut k = (((x - first) * per_unit) as usize).min(n - 1);
                // Rounding may land one bin off.
                if x < self.edges[k] {
                    k -= 1;
                } else if x >= self.edges[k + 1] {
                    k += 1;
                }
                k
            }
            None => self.edges.partition_point(|e| *e <= x) - 1,
        };
        Some(k)
    }
}
