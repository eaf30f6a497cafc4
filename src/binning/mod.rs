//! Building bins from tables, and reducing bins and histograms onto edges.
pub mod bin;
pub(crate) mod edges;
pub mod histogram;
pub mod rebin;

pub use bin::{bin, bin_with, group_by, BinOptions};
pub use histogram::{histogram, histogram_nd};
pub use rebin::{rebin, rebin_with_policy};
