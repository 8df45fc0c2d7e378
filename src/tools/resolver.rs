//! Turns requested tool ids into callable, environment-filtered schemas.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::builtin::WEB_BROWSING;
use super::capabilities::Capabilities;
use super::manifest::ToolManifest;
use crate::types::ToolSchema;

/// Separator between the parts of a generated tool schema name.
pub const SEPARATOR: &str = "____";

/// Builds `<api_name>____<identifier>____<source>`.
pub fn tool_schema_name(api_name: &str, identifier: &str, source: &str) -> String {
    format!("{api_name}{SEPARATOR}{identifier}{SEPARATOR}{source}")
}

/// Parts of a generated tool schema name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolNameParts<'a> {
    pub api_name: &'a str,
    pub identifier: &'a str,
    pub source: &'a str,
}

/// Splits a generated schema name; `None` if it was not produced by [`tool_schema_name`].
pub fn parse_tool_name(name: &str) -> Option<ToolNameParts<'_>> {
    let mut parts = name.splitn(3, SEPARATOR);
    let api_name = parts.next().filter(|s| !s.is_empty())?;
    let identifier = parts.next().filter(|s| !s.is_empty())?;
    let source = parts.next().filter(|s| !s.is_empty())?;
    Some(ToolNameParts {
        api_name,
        identifier,
        source,
    })
}

/// Why a tool id did not make it into the enabled set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterReason {
    /// No manifest with this identifier.
    NotFound,
    /// Connector cannot run in the current environment.
    Incompatible,
    /// Rejected by the resolver's enable checker.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredTool {
    pub id: String,
    pub reason: FilterReason,
}

/// Output of [`ToolResolver::resolve`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedToolSet {
    pub enabled_tool_ids: Vec<String>,
    pub filtered_tools: Vec<FilteredTool>,
    /// `None` means no function calling is offered to the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSchema>>,
    /// Manifests backing `enabled_tool_ids`, in resolution order.
    #[serde(skip)]
    pub manifests: Vec<ToolManifest>,
}

impl ResolvedToolSet {
    pub fn tool_count(&self) -> usize {
        self.tools.as_ref().map_or(0, Vec::len)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled_tool_ids.iter().any(|enabled| enabled == id)
    }

    pub fn filter_reason(&self, id: &str) -> Option<FilterReason> {
        self.filtered_tools
            .iter()
            .find(|filtered| filtered.id == id)
            .map(|filtered| filtered.reason)
    }
}

pub type EnableChecker = Arc<dyn Fn(&ToolManifest) -> bool + Send + Sync>;

/// Stateless tool resolution.
///
/// Agent resolution appends the always-available default tools; bare
/// resolution uses only what the caller requested.
#[derive(Clone)]
pub struct ToolResolver {
    default_tool_ids: Vec<String>,
    enable_checker: Option<EnableChecker>,
}

impl std::fmt::Debug for ToolResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolResolver")
            .field("default_tool_ids", &self.default_tool_ids)
            .field("enable_checker", &self.enable_checker.is_some())
            .finish()
    }
}

impl Default for ToolResolver {
    fn default() -> Self {
        Self::agent()
    }
}

impl ToolResolver {
    /// Agent-level resolver with `web-browsing` as the implicit default.
    pub fn agent() -> Self {
        Self {
            default_tool_ids: vec![WEB_BROWSING.to_string()],
            enable_checker: None,
        }
    }

    /// Resolver without implicit defaults.
    pub fn bare() -> Self {
        Self {
            default_tool_ids: Vec::new(),
            enable_checker: None,
        }
    }

    pub fn with_default_tool_ids(
        mut self,
        ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.default_tool_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_enable_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn(&ToolManifest) -> bool + Send + Sync + 'static,
    {
        self.enable_checker = Some(Arc::new(checker));
        self
    }

    pub fn default_tool_ids(&self) -> &[String] {
        &self.default_tool_ids
    }

    fn is_enabled(&self, manifest: &ToolManifest) -> bool {
        self.enable_checker
            .as_ref()
            .is_none_or(|checker| checker(manifest))
    }

    pub fn resolve(
        &self,
        requested_tool_ids: &[String],
        model: &str,
        provider: &str,
        manifests: &[ToolManifest],
        capabilities: &Capabilities,
    ) -> ResolvedToolSet {
        let mut seen = HashSet::new();
        let mut candidates: Vec<(&str, bool)> = Vec::new();
        for id in requested_tool_ids {
            if seen.insert(id.as_str()) {
                candidates.push((id.as_str(), true));
            }
        }
        for id in &self.default_tool_ids {
            if seen.insert(id.as_str()) {
                candidates.push((id.as_str(), false));
            }
        }

        let desktop = capabilities.environment.is_desktop();
        let mut resolved = ResolvedToolSet::default();

        for (id, requested) in candidates {
            let matching: Vec<&ToolManifest> =
                manifests.iter().filter(|m| m.identifier == id).collect();

            if matching.is_empty() {
                if requested {
                    resolved.filtered_tools.push(FilteredTool {
                        id: id.to_string(),
                        reason: FilterReason::NotFound,
                    });
                } else {
                    tracing::debug!(tool_id = %id, "default tool has no manifest");
                }
                continue;
            }

            let compatible: Vec<&ToolManifest> = matching
                .into_iter()
                .filter(|m| desktop || !m.connector_type.requires_desktop())
                .collect();
            if compatible.is_empty() {
                resolved.filtered_tools.push(FilteredTool {
                    id: id.to_string(),
                    reason: FilterReason::Incompatible,
                });
                continue;
            }

            if !compatible.iter().any(|m| self.is_enabled(m)) {
                resolved.filtered_tools.push(FilteredTool {
                    id: id.to_string(),
                    reason: FilterReason::Disabled,
                });
                continue;
            }

            resolved.enabled_tool_ids.push(id.to_string());
            for manifest in compatible {
                if self.is_enabled(manifest) {
                    resolved.manifests.push(manifest.clone());
                }
            }
        }

        if capabilities.can_use_function_calling(model, provider) {
            let schemas = build_schemas(&resolved.manifests);
            resolved.tools = (!schemas.is_empty()).then_some(schemas);
        }

        tracing::debug!(
            model,
            provider,
            enabled = resolved.enabled_tool_ids.len(),
            filtered = resolved.filtered_tools.len(),
            tools = resolved.tool_count(),
            "resolved tools"
        );

        resolved
    }
}

fn build_schemas(manifests: &[ToolManifest]) -> Vec<ToolSchema> {
    let mut names = HashSet::new();
    let mut schemas = Vec::new();

    for manifest in manifests {
        for api in &manifest.api {
            let name = tool_schema_name(&api.name, &manifest.identifier, &manifest.source);
            if !names.insert(name.clone()) {
                tracing::debug!(tool = %name, "duplicate tool schema dropped");
                continue;
            }
            schemas.push(ToolSchema::function(
                name,
                api.description.clone(),
                api.parameters.clone(),
            ));
        }
    }

    schemas
}
