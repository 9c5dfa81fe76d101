pub mod core;
pub mod corpus;
pub mod profile;

pub use crate::core::Config;
pub use crate::core::error::{HarnessError, HarnessErrorKind, Result};
