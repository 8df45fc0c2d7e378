//! Environment variable configuration provider.
//!
//! Keys map to variable names by upper-casing and turning each `.` into `__`:
//! `retention.max_terminal_operations` under the default prefix reads
//! `AGENT_ENGINE_RETENTION__MAX_TERMINAL_OPERATIONS`.

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

pub const DEFAULT_ENV_PREFIX: &str = "AGENT_ENGINE_";

/// Read-only; variables are never modified at runtime.
#[derive(Debug, Clone)]
pub struct EnvConfigProvider {
    prefix: String,
}

impl EnvConfigProvider {
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn env_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "__"))
    }

    fn key_from_env(&self, env_name: &str) -> Option<String> {
        env_name
            .strip_prefix(&self.prefix)
            .map(|rest| rest.to_lowercase().replace("__", "."))
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::prefixed(DEFAULT_ENV_PREFIX)
    }
}

#[async_trait::async_trait]
impl ConfigProvider for EnvConfigProvider {
    fn name(&self) -> &str {
        "env"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        match std::env::var(self.env_key(key)) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        let env_prefix = self.env_key(prefix);
        let mut keys: Vec<String> = std::env::vars()
            .filter(|(name, _)| name.starts_with(&env_prefix))
            .filter_map(|(name, _)| self.key_from_env(&name))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
