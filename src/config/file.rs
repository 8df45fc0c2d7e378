//! JSON file configuration provider.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::sync::OnceCell;

use super::{ConfigError, ConfigResult};
use super::provider::ConfigProvider;

/// Reads a JSON object once, lazily. Nested objects are addressed with dotted
/// keys (`retention.max_terminal_operations`). A missing file is empty.
#[derive(Debug)]
pub struct FileConfigProvider {
    path: PathBuf,
    data: OnceCell<Value>,
}

impl FileConfigProvider {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn data(&self) -> ConfigResult<&Value> {
        self.data
            .get_or_try_init(|| async {
                let value = match tokio::fs::read_to_string(&self.path).await {
                    Ok(content) => serde_json::from_str(&content)?,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Value::Object(Default::default())
                    }
                    Err(e) => return Err(ConfigError::Io(e)),
                };
                Ok::<_, ConfigError>(value)
            })
            .await
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(&key, v, out);
            }
        }
        _ => out.push(prefix.to_string()),
    }
}

#[async_trait::async_trait]
impl ConfigProvider for FileConfigProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        let data = self.data().await?;
        let found = key
            .split('.')
            .try_fold(data, |current, part| current.get(part));

        Ok(match found {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(v) => Some(v.to_string()),
        })
    }

    async fn list_keys(&self, prefix: &str) -> ConfigResult<Vec<String>> {
        let mut keys = Vec::new();
        flatten("", self.data().await?, &mut keys);
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn write_config(dir: &TempDir, value: serde_json::Value) -> PathBuf {
        let path = dir.path().join("engine.json");
        tokio::fs::write(&path, value.to_string()).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_file_provider_reads_nested_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            serde_json::json!({
                "environment": "desktop",
                "max_rounds": 3,
                "default_tool_ids": ["web-browsing", "local-files"],
                "retention": { "max_terminal_operations": 16 }
            }),
        )
        .await;

        let provider = FileConfigProvider::new(path);
        assert_eq!(
            provider.get_raw("environment").await.unwrap(),
            Some("desktop".to_string())
        );
        assert_eq!(
            provider.get_raw("max_rounds").await.unwrap(),
            Some("3".to_string())
        );
        assert_eq!(
            provider
                .get_raw("retention.max_terminal_operations")
                .await
                .unwrap(),
            Some("16".to_string())
        );
        assert_eq!(
            provider.get_raw("default_tool_ids").await.unwrap(),
            Some(r#"["web-browsing","local-files"]"#.to_string())
        );
        assert_eq!(provider.get_raw("retention.missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_provider_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let provider = FileConfigProvider::new(dir.path().join("nope.json"));

        assert_eq!(provider.get_raw("max_rounds").await.unwrap(), None);
        assert!(provider.list_keys("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_provider_list_keys() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            serde_json::json!({
                "retention": { "max_terminal_operations": 16 },
                "max_rounds": 3
            }),
        )
        .await;

        let provider = FileConfigProvider::new(path);
        assert_eq!(
            provider.list_keys("retention.").await.unwrap(),
            vec!["retention.max_terminal_operations"]
        );
        assert!(provider.set_raw("max_rounds", "4").await.is_err());
    }

    #[tokio::test]
    async fn test_file_provider_invalid_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let provider = FileConfigProvider::new(path);
        assert!(provider.get_raw("max_rounds").await.is_err());
    }
}
