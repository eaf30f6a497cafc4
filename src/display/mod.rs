pub mod format;

pub use format::{format_data_array, format_dataset, summary};
