pub mod config;
pub mod energy;
pub mod error;
pub mod output;
pub mod process;
pub mod utils;

pub use config::Config;
pub use error::{HarnessError, HarnessErrorKind, Result};
pub use utils::{format_duration, is_executable};
