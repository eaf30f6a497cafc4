pub mod arithmetic;
pub mod comparison;
pub mod creation;
pub mod element_array;
pub mod kernel;
pub mod record;
pub mod reduction;
pub mod to_unit;
#[allow(clippy::module_inception)]
pub mod variable;

pub use comparison::Comparison;
pub use creation::{array, array_1d, empty, ones, scalar, scalar_with_variance, zeros, CreateOptions};
pub use element_array::{Element, ElementArray};
pub use kernel::BinaryOp;
pub use record::{DataArrayRecord, VariableRecord};
pub use variable::{BinRange, Variable};
