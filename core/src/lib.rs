mod config;
mod error;
pub mod size;

pub use config::{DEFAULT_HYPERVISOR_URI, DEFAULT_STORAGE_POOL, EngineConfig};
pub use error::ConfigError;
