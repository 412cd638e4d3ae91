pub mod cli;
pub mod core;
pub mod decompress;
pub mod error;
pub mod http;
pub mod logging;
pub mod matcher;
pub mod progress;

pub use core::driver::{ClientDriver, RunRequest};
pub use core::model::RunReport;
pub use error::{ClientError, Result};
