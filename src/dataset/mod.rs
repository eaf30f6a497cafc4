pub mod data_array;
#[allow(clippy::module_inception)]
pub mod dataset;

pub use data_array::DataArray;
pub use dataset::Dataset;
