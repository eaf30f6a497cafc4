pub mod dims;
pub mod dtype;
pub mod slice;
pub mod view_index;

pub use dims::{Dim, Dimensions};
pub use dtype::DType;
pub use slice::Slice;
pub use view_index::ViewIndex;
