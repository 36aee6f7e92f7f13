pub mod error;
pub mod types;

pub use error::{ErrorKind, Result, StudioError, UpstreamError};
pub use types::*;
