//! Configuration for the package installer
//!
//! Settings come from an optional YAML file; anything not given there falls
//! back to defaults that match the public package registry.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::ToolfetchError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<ToolfetchConfig, ToolfetchError> {
    ConfigLoader::from_file(path).await
}

/// Validate a configuration
pub fn validate_config(config: &ToolfetchConfig) -> Result<(), ToolfetchError> {
    config.validate()
}
