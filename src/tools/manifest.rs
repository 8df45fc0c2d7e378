//! Tool manifests and the source they are loaded from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How a tool is reached at execution time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    /// Executed in-process by a registered [`BuiltinToolExecutor`](super::BuiltinToolExecutor).
    #[default]
    Builtin,
    /// Remote HTTP endpoint.
    Http,
    /// Local child process over stdio; needs the desktop runtime.
    Stdio,
    /// Installed from the marketplace.
    Market,
    /// Anything else installed without a dedicated connector.
    Default,
}

impl ConnectorType {
    pub fn requires_desktop(&self) -> bool {
        matches!(self, Self::Stdio)
    }
}

/// One callable entry point of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolApi {
    pub name: String,
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ToolApi {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Static description of a tool: its APIs and optional prompt contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolManifest {
    pub identifier: String,
    #[serde(default)]
    pub api: Vec<ToolApi>,
    /// Text injected into the system prompt when the tool is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_role: Option<String>,
    #[serde(default)]
    pub connector_type: ConnectorType,
    /// Disambiguates identical identifiers coming from different connectors.
    pub source: String,
}

impl ToolManifest {
    pub fn new(identifier: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            api: Vec::new(),
            system_role: None,
            connector_type: ConnectorType::Builtin,
            source: source.into(),
        }
    }

    /// A builtin manifest with `source = "builtin"`.
    pub fn builtin(identifier: impl Into<String>) -> Self {
        Self::new(identifier, "builtin")
    }

    pub fn with_api(mut self, api: ToolApi) -> Self {
        self.api.push(api);
        self
    }

    pub fn with_system_role(mut self, system_role: impl Into<String>) -> Self {
        self.system_role = Some(system_role.into());
        self
    }

    pub fn with_connector(mut self, connector_type: ConnectorType) -> Self {
        self.connector_type = connector_type;
        self
    }

    pub fn has_system_role(&self) -> bool {
        self.system_role
            .as_deref()
            .is_some_and(|role| !role.trim().is_empty())
    }
}

/// Where installed and builtin tool manifests come from.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Manifests for the given ids. Unknown ids are simply absent.
    async fn list_manifests(&self, tool_ids: &[String]) -> Vec<ToolManifest>;
}

/// Fixed in-memory manifest list.
#[derive(Debug, Clone, Default)]
pub struct StaticManifestSource {
    manifests: Vec<ToolManifest>,
}

impl StaticManifestSource {
    pub fn new(manifests: impl IntoIterator<Item = ToolManifest>) -> Self {
        Self {
            manifests: manifests.into_iter().collect(),
        }
    }

    pub fn with_manifest(mut self, manifest: ToolManifest) -> Self {
        self.manifests.push(manifest);
        self
    }

    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}

#[async_trait]
impl ManifestSource for StaticManifestSource {
    async fn list_manifests(&self, tool_ids: &[String]) -> Vec<ToolManifest> {
        self.manifests
            .iter()
            .filter(|manifest| tool_ids.iter().any(|id| *id == manifest.identifier))
            .cloned()
            .collect()
    }
}
