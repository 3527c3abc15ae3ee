pub mod convolver;
pub mod loader;

pub use convolver::CabConvolver;
pub use loader::{IrInfo, load_ir};
