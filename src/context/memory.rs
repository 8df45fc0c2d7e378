//! User memory snapshot rendered as conversational grounding.

use serde::{Deserialize, Serialize};

use super::{ContextError, ContextResult};

pub const USER_MEMORY_OPEN: &str = "<user_memory>";
pub const USER_MEMORY_CLOSE: &str = "</user_memory>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub category: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub entries: Vec<MemoryEntry>,
}

impl UserMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_entry(mut self, category: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.push(MemoryEntry {
            category: category.into(),
            content: content.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.summary.as_deref().is_none_or(|s| s.trim().is_empty()) && self.entries.is_empty()
    }

    pub fn validate(&self) -> ContextResult<()> {
        match self.entries.iter().position(|e| e.content.trim().is_empty()) {
            Some(index) => Err(ContextError::InvalidMemory {
                message: format!("entry {} has empty content", index),
            }),
            None => Ok(()),
        }
    }

    pub fn render(&self) -> String {
        let mut lines = vec![USER_MEMORY_OPEN.to_string()];
        if let Some(summary) = self.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            lines.push(summary.trim().to_string());
        }
        for entry in &self.entries {
            lines.push(format!("- [{}] {}", entry.category, entry.content.trim()));
        }
        lines.push(USER_MEMORY_CLOSE.to_string());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_memory() {
        assert!(UserMemory::new().is_empty());
        assert!(UserMemory::new().with_summary("  ").is_empty());
        assert!(!UserMemory::new().with_entry("pref", "tea").is_empty());
    }

    #[test]
    fn test_render_is_wrapped() {
        let rendered = UserMemory::new()
            .with_summary("Likes Rust")
            .with_entry("preference", "prefers tea")
            .render();
        assert_eq!(
            rendered,
            "<user_memory>\nLikes Rust\n- [preference] prefers tea\n</user_memory>"
        );
    }

    #[test]
    fn test_validate_empty_entry() {
        let memory = UserMemory::new().with_entry("x", " ");
        assert!(memory.validate().is_err());
    }
}
