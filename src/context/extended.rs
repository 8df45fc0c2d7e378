//! Structured context blocks for specialised editing surfaces.

use serde::{Deserialize, Serialize};

use super::{ContextError, ContextResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExtendedContext {
    /// Agent being edited in the agent builder.
    #[serde(rename_all = "camelCase")]
    AgentBuilder {
        config: serde_json::Value,
        #[serde(default)]
        metadata: serde_json::Value,
    },
    /// Document open in the page editor.
    #[serde(rename_all = "camelCase")]
    PageEditor {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        content: String,
    },
}

impl ExtendedContext {
    pub fn agent_builder(config: serde_json::Value, metadata: serde_json::Value) -> Self {
        Self::AgentBuilder { config, metadata }
    }

    pub fn page_editor(title: Option<String>, content: impl Into<String>) -> Self {
        Self::PageEditor {
            title,
            content: content.into(),
        }
    }

    pub fn render(&self) -> ContextResult<String> {
        match self {
            Self::AgentBuilder { config, metadata } => {
                if !config.is_object() {
                    return Err(ContextError::InvalidExtendedContext {
                        message: "agent builder config must be an object".into(),
                    });
                }
                let mut out = String::from("<agent_builder_context>\n<current_config>\n");
                out.push_str(&serde_json::to_string_pretty(config)?);
                out.push_str("\n</current_config>\n");
                if !metadata.is_null() {
                    out.push_str("<current_meta>\n");
                    out.push_str(&serde_json::to_string_pretty(metadata)?);
                    out.push_str("\n</current_meta>\n");
                }
                out.push_str("</agent_builder_context>");
                Ok(out)
            }
            Self::PageEditor { title, content } => Ok(match title {
                Some(title) => format!(
                    "<current_page title=\"{}\">\n{}\n</current_page>",
                    title, content
                ),
                None => format!("<current_page>\n{}\n</current_page>", content),
            }),
        }
    }
}
