//! gembed core: error taxonomy and bridge configuration shared by the
//! registry, backend and SQL crates.

pub mod config;
pub mod error;

pub use config::BridgeConfig;
pub use error::{Error, Result};
