//! Engine settings loaded from any [`ConfigProvider`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::provider::{ConfigProvider, ConfigProviderExt};
use super::{ConfigError, ConfigResult};
use crate::agent::DEFAULT_MAX_TOOL_STEPS;
use crate::group::DEFAULT_MAX_ROUNDS;
use crate::operation::{DEFAULT_MAX_TERMINAL_OPERATIONS, RetentionPolicy};
use crate::tools::{ExecutionEnvironment, builtin};

/// Configuration keys read by [`EngineSettings::load`].
pub mod keys {
    pub const ENVIRONMENT: &str = "environment";
    pub const MAX_ROUNDS: &str = "max_rounds";
    pub const MAX_TOOL_STEPS: &str = "max_tool_steps";
    pub const DEFAULT_TOOL_IDS: &str = "default_tool_ids";
    pub const MAX_TERMINAL_OPERATIONS: &str = "retention.max_terminal_operations";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    pub environment: ExecutionEnvironment,
    /// Rounds per group orchestration before it stops on its own.
    pub max_rounds: usize,
    /// Tool round trips per agent turn.
    pub max_tool_steps: usize,
    pub max_terminal_operations: usize,
    /// Tools every agent gets in addition to its own plugins.
    pub default_tool_ids: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            environment: ExecutionEnvironment::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
            max_terminal_operations: DEFAULT_MAX_TERMINAL_OPERATIONS,
            default_tool_ids: vec![builtin::WEB_BROWSING.to_string()],
        }
    }
}

impl EngineSettings {
    /// Read every key, keeping the default for missing ones.
    pub async fn load(provider: &dyn ConfigProvider) -> ConfigResult<Self> {
        let mut settings = Self::default();

        if let Some(raw) = provider.get_raw(keys::ENVIRONMENT).await? {
            settings.environment = raw
                .trim()
                .trim_matches('"')
                .parse()
                .map_err(|e: String| ConfigError::invalid(keys::ENVIRONMENT, e))?;
        }
        if let Some(rounds) = provider.get::<usize>(keys::MAX_ROUNDS).await? {
            settings.max_rounds = rounds;
        }
        if let Some(steps) = provider.get::<usize>(keys::MAX_TOOL_STEPS).await? {
            settings.max_tool_steps = steps;
        }
        if let Some(max) = provider
            .get::<usize>(keys::MAX_TERMINAL_OPERATIONS)
            .await?
        {
            settings.max_terminal_operations = max;
        }
        if let Some(raw) = provider.get_raw(keys::DEFAULT_TOOL_IDS).await? {
            settings.default_tool_ids = parse_tool_ids(&raw)?;
        }

        settings.validate()?;
        debug!(provider = provider.name(), ?settings, "Engine settings loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_rounds == 0 {
            return Err(ConfigError::invalid(keys::MAX_ROUNDS, "must be at least 1"));
        }
        if self.default_tool_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(ConfigError::invalid(
                keys::DEFAULT_TOOL_IDS,
                "tool ids must not be empty",
            ));
        }
        Ok(())
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::bounded(self.max_terminal_operations)
    }
}

/// A JSON array, or a comma-separated list as environment variables carry it.
fn parse_tool_ids(raw: &str) -> ConfigResult<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ConfigError::invalid(keys::DEFAULT_TOOL_IDS, e.to_string()));
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigBuilder, MemoryConfigProvider};

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let settings = EngineSettings::load(&MemoryConfigProvider::new())
            .await
            .unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.default_tool_ids, vec!["web-browsing"]);
        assert_eq!(settings.retention(), RetentionPolicy::default());
    }

    #[tokio::test]
    async fn test_load_overrides() {
        let provider = MemoryConfigProvider::from_pairs([
            (keys::ENVIRONMENT, "Desktop"),
            (keys::MAX_ROUNDS, "3"),
            (keys::MAX_TOOL_STEPS, "2"),
            (keys::MAX_TERMINAL_OPERATIONS, "10"),
            (keys::DEFAULT_TOOL_IDS, "web-browsing, local-files"),
        ]);
        let settings = EngineSettings::load(&provider).await.unwrap();

        assert_eq!(settings.environment, ExecutionEnvironment::Desktop);
        assert_eq!(settings.max_rounds, 3);
        assert_eq!(settings.max_tool_steps, 2);
        assert_eq!(settings.retention().max_terminal_operations, 10);
        assert_eq!(settings.default_tool_ids, vec!["web-browsing", "local-files"]);
    }

    #[tokio::test]
    async fn test_json_tool_ids_and_empty_list() {
        let provider = MemoryConfigProvider::from_pairs([(keys::DEFAULT_TOOL_IDS, "[]")]);
        let settings = EngineSettings::load(&provider).await.unwrap();
        assert!(settings.default_tool_ids.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_values() {
        let zero_rounds = MemoryConfigProvider::from_pairs([(keys::MAX_ROUNDS, "0")]);
        assert!(matches!(
            EngineSettings::load(&zero_rounds).await,
            Err(ConfigError::InvalidValue { .. })
        ));

        let bad_env = MemoryConfigProvider::from_pairs([(keys::ENVIRONMENT, "mainframe")]);
        assert!(EngineSettings::load(&bad_env).await.is_err());

        let bad_number = MemoryConfigProvider::from_pairs([(keys::MAX_TOOL_STEPS, "lots")]);
        assert!(EngineSettings::load(&bad_number).await.is_err());
    }

    #[tokio::test]
    async fn test_layered_load() {
        let overrides = MemoryConfigProvider::from_pairs([(keys::MAX_ROUNDS, "2")]);
        let base = MemoryConfigProvider::from_pairs([
            (keys::MAX_ROUNDS, "6"),
            (keys::ENVIRONMENT, "server"),
        ]);
        let config = ConfigBuilder::new().memory(overrides).memory(base).build();

        let settings = EngineSettings::load(&config).await.unwrap();
        assert_eq!(settings.max_rounds, 2);
        assert_eq!(settings.environment, ExecutionEnvironment::Server);
    }
}
