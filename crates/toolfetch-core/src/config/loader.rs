//! Configuration loader for YAML files and environment resolution

use crate::config::types::*;
use crate::errors::ToolfetchError;
use std::env;
use std::path::Path;
use tokio::fs;

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<ToolfetchConfig, ToolfetchError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            ToolfetchError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<ToolfetchConfig, ToolfetchError> {
        // An empty file deserializes to null, which means "all defaults"
        let mut config: ToolfetchConfig = if content.trim().is_empty() {
            ToolfetchConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                ToolfetchError::ConfigError(format!("Failed to parse YAML config: {}", e))
            })?
        };

        Self::resolve_environment(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Resolve environment references in the configuration
    fn resolve_environment(config: &mut ToolfetchConfig) -> Result<(), ToolfetchError> {
        let registry = &mut config.registry;

        if let Some(token) = registry.access_token.take() {
            registry.access_token = Self::expand_env_reference(&token)?;
        }

        if let Some(env_var) = &registry.access_token_env {
            if let Ok(token) = env::var(env_var) {
                registry.access_token = Some(token);
            }
        }

        registry.access_token = registry
            .access_token
            .take()
            .filter(|token| !token.trim().is_empty());

        Ok(())
    }

    /// `${VAR}` becomes the variable's value (or nothing when unset);
    /// anything else is returned unchanged
    fn expand_env_reference(value: &str) -> Result<Option<String>, ToolfetchError> {
        let trimmed = value.trim();
        let Some(name) = trimmed
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        else {
            return Ok(Some(value.to_string()));
        };

        if name.is_empty() {
            return Err(ToolfetchError::ConfigError(
                "Empty environment reference '${}' in access_token".to_string(),
            ));
        }

        match env::var(name) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(_) => {
                log::warn!("Environment variable {} referenced by access_token is not set", name);
                Ok(None)
            }
        }
    }
}
