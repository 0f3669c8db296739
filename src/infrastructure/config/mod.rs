//! Configuration loading and environment detection.

pub mod loader;

pub use loader::{is_plugin_hosted, ConfigError, ConfigLoader};
