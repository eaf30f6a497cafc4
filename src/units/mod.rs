pub mod rules;
pub mod unit;

pub use rules::UnitPolicy;
pub use unit::{BaseDim, Ratio, Unit};
