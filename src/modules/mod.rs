pub mod firefly;
pub mod storage;

pub use firefly::*;
pub use storage::*;
