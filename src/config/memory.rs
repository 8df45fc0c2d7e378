//! In-memory configuration provider, for code-defined overrides and tests.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::ConfigResult;
use super::provider::ConfigProvider;

#[derive(Debug, Clone)]
pub struct MemoryConfigProvider {
    data: Arc<RwLock<HashMap<String, String>>>,
    name: String,
}

impl Default for MemoryConfigProvider {
    fn default() -> Self {
        Self::named("memory")
    }
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            name: name.into(),
        }
    }

    /// Seed from key/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let data = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: Arc::new(RwLock::new(data)),
            name: "memory".to_string(),
        }
    }

    pub async fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().await.insert(key.into(), value.into());
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.data.write().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ConfigProvider for MemoryConfigProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: &str) -> ConfigResult<()> {
        self.insert(key, value).await;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        let data = self.data.read().await;
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, ConfigProviderExt};

    #[tokio::test]
    async fn test_memory_provider_basic() {
        let provider = MemoryConfigProvider::new();
        provider.set_raw("max_rounds", "4").await.unwrap();

        assert_eq!(
            provider.get_raw("max_rounds").await.unwrap(),
            Some("4".to_string())
        );
        assert_eq!(provider.get_raw("missing").await.unwrap(), None);
        assert!(provider.remove("max_rounds").await);
        assert!(provider.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_provider_list_keys() {
        let provider = MemoryConfigProvider::from_pairs([
            ("retention.max_terminal_operations", "10"),
            ("retention.other", "x"),
            ("max_rounds", "2"),
        ]);

        let keys = provider.list_keys("retention.").await.unwrap();
        assert_eq!(
            keys,
            vec!["retention.max_terminal_operations", "retention.other"]
        );
    }

    #[tokio::test]
    async fn test_typed_access() {
        let provider = MemoryConfigProvider::new();
        provider.set("max_rounds", &5usize).await.unwrap();

        let rounds: Option<usize> = provider.get("max_rounds").await.unwrap();
        assert_eq!(rounds, Some(5));

        provider.insert("environment", "desktop").await;
        let env: String = provider.require("environment").await.unwrap();
        assert_eq!(env, "desktop");

        let missing = provider.require::<usize>("max_tool_steps").await;
        assert!(matches!(missing, Err(ConfigError::NotFound { .. })));

        provider.insert("max_rounds", "many").await;
        let invalid = provider.get::<usize>("max_rounds").await;
        assert!(matches!(invalid, Err(ConfigError::InvalidValue { .. })));
    }
}
