//! Knowledge material injected into the system message.

use serde::{Deserialize, Serialize};

use super::{ContextError, ContextResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeFile {
    pub id: String,
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Files and knowledge bases attached to an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeContext {
    #[serde(default)]
    pub files: Vec<KnowledgeFile>,
    #[serde(default)]
    pub knowledge_bases: Vec<KnowledgeBase>,
}

impl KnowledgeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.files.push(KnowledgeFile {
            id: id.into(),
            name: name.into(),
            content: content.into(),
        });
        self
    }

    pub fn with_knowledge_base(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        self.knowledge_bases.push(KnowledgeBase {
            id: id.into(),
            name: name.into(),
            description,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.knowledge_bases.is_empty()
    }

    pub fn validate(&self) -> ContextResult<()> {
        for file in &self.files {
            if file.id.trim().is_empty() || file.name.trim().is_empty() {
                return Err(ContextError::InvalidKnowledge {
                    message: format!("file entry missing id or name: {:?}", file.id),
                });
            }
        }
        for kb in &self.knowledge_bases {
            if kb.id.trim().is_empty() {
                return Err(ContextError::InvalidKnowledge {
                    message: format!("knowledge base '{}' has no id", kb.name),
                });
            }
        }
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = String::from("<knowledge>\n");

        if !self.files.is_empty() {
            out.push_str("<files>\n");
            for file in &self.files {
                out.push_str(&format!(
                    "<file id=\"{}\" name=\"{}\">\n{}\n</file>\n",
                    file.id, file.name, file.content
                ));
            }
            out.push_str("</files>\n");
        }

        if !self.knowledge_bases.is_empty() {
            out.push_str("<knowledge_bases>\n");
            for kb in &self.knowledge_bases {
                match &kb.description {
                    Some(desc) => out.push_str(&format!(
                        "<knowledge_base id=\"{}\" name=\"{}\">{}</knowledge_base>\n",
                        kb.id, kb.name, desc
                    )),
                    None => out.push_str(&format!(
                        "<knowledge_base id=\"{}\" name=\"{}\" />\n",
                        kb.id, kb.name
                    )),
                }
            }
            out.push_str("</knowledge_bases>\n");
        }

        out.push_str("</knowledge>");
        out
    }
}
