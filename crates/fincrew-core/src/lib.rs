//! Fincrew Core - job types, configuration, and error handling

pub mod config;
pub mod error;
pub mod types;

pub use config::FincrewConfig;
pub use error::{Error, Result};
pub use types::*;
