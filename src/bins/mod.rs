//! Binned variables: per-element row ranges into a shared content table.
pub mod arithmetic;
pub mod concatenate;
pub mod container;
pub mod scale;

pub use container::{bins, Bins};
pub use scale::Lookup;
