//! Layered engine configuration.
//!
//! ```rust,no_run
//! use agent_engine::config::{ConfigBuilder, EngineSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigBuilder::new()
//!     .env()
//!     .file("engine.json")
//!     .build();
//! let settings = EngineSettings::load(&config).await?;
//! # Ok(())
//! # }
//! ```

mod composite;
mod env;
mod file;
mod memory;
mod provider;
mod settings;

pub use composite::CompositeConfigProvider;
pub use env::{DEFAULT_ENV_PREFIX, EnvConfigProvider};
pub use file::FileConfigProvider;
pub use memory::MemoryConfigProvider;
pub use provider::{ConfigProvider, ConfigProviderExt};
pub use settings::{EngineSettings, keys};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Key not found: {key}")]
    NotFound { key: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Provider error: {message}")]
    Provider { message: String },
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Assembles providers in priority order: the first added wins.
#[derive(Default)]
pub struct ConfigBuilder {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment variables under [`DEFAULT_ENV_PREFIX`].
    pub fn env(self) -> Self {
        self.provider(Box::new(EnvConfigProvider::default()))
    }

    pub fn env_with_prefix(self, prefix: &str) -> Self {
        self.provider(Box::new(EnvConfigProvider::prefixed(prefix)))
    }

    /// JSON file; a missing file contributes nothing.
    pub fn file(self, path: impl AsRef<std::path::Path>) -> Self {
        self.provider(Box::new(FileConfigProvider::new(path.as_ref().to_path_buf())))
    }

    pub fn memory(self, provider: MemoryConfigProvider) -> Self {
        self.provider(Box::new(provider))
    }

    pub fn provider(mut self, provider: Box<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> CompositeConfigProvider {
        self.providers
            .into_iter()
            .fold(CompositeConfigProvider::new(), CompositeConfigProvider::provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("max_rounds", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid value for max_rounds: must be at least 1"
        );
    }

    #[test]
    fn test_config_builder_order() {
        let config = ConfigBuilder::new()
            .memory(MemoryConfigProvider::named("overrides"))
            .env()
            .build();
        assert_eq!(config.provider_names(), vec!["overrides", "env"]);
    }
}
