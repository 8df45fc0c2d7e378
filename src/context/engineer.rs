//! The message engineering pipeline.
//!
//! Stages run in a fixed order, and later stages may address the output of
//! earlier ones:
//!
//! 1. base system role
//! 2. tool system roles (only when function calling is enabled)
//! 3. knowledge
//! 4. extended contexts
//! 5. history summary
//! 6. user memory (standalone `user` message before the first user turn)
//! 7. input template
//! 8. cleanup to [`Message`]

use std::sync::Arc;

use serde::Serialize;

use super::extended::ExtendedContext;
use super::knowledge::KnowledgeContext;
use super::memory::UserMemory;
use super::template::{apply_input_template, has_text_placeholder};
use crate::tools::{Capabilities, ResolvedToolSet};
use crate::types::{ConversationMessage, Message, Role};

pub type SummaryFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Tool system-role contributions, in resolution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolsContext {
    pub system_roles: Vec<(String, String)>,
}

impl ToolsContext {
    pub fn from_resolved(resolved: &ResolvedToolSet) -> Self {
        let mut system_roles: Vec<(String, String)> = Vec::new();
        for manifest in &resolved.manifests {
            if !manifest.has_system_role()
                || system_roles.iter().any(|(id, _)| *id == manifest.identifier)
            {
                continue;
            }
            if let Some(role) = &manifest.system_role {
                system_roles.push((manifest.identifier.clone(), role.trim().to_string()));
            }
        }
        Self { system_roles }
    }

    pub fn is_empty(&self) -> bool {
        self.system_roles.is_empty()
    }

    fn render(&self) -> String {
        let mut out = String::from("<tools>\n");
        for (identifier, role) in &self.system_roles {
            out.push_str(&format!(
                "<tool identifier=\"{}\">\n{}\n</tool>\n",
                identifier, role
            ));
        }
        out.push_str("</tools>");
        out
    }
}

/// Final, ordered messages handed to inference. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EngineeredMessageSet {
    messages: Vec<Message>,
}

impl EngineeredMessageSet {
    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn system(&self) -> Option<&Message> {
        self.messages.first().filter(|m| m.role == Role::System)
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl<'a> IntoIterator for &'a EngineeredMessageSet {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Inputs of one engineering pass.
#[derive(Clone)]
pub struct ContextEngineer {
    model: String,
    provider: String,
    system_role: Option<String>,
    tools: Option<ToolsContext>,
    knowledge: Option<KnowledgeContext>,
    capabilities: Option<Capabilities>,
    user_memory: Option<UserMemory>,
    history_summary: Option<String>,
    summary_formatter: Option<SummaryFormatter>,
    extended_contexts: Vec<ExtendedContext>,
    input_template: Option<String>,
    history_count: Option<usize>,
}

impl std::fmt::Debug for ContextEngineer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEngineer")
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("system_role", &self.system_role.is_some())
            .field("tools", &self.tools)
            .field("knowledge", &self.knowledge.is_some())
            .field("user_memory", &self.user_memory.is_some())
            .field("history_summary", &self.history_summary.is_some())
            .field("extended_contexts", &self.extended_contexts.len())
            .field("input_template", &self.input_template)
            .field("history_count", &self.history_count)
            .finish()
    }
}

struct Draft {
    message: Message,
    user_authored: bool,
}

impl ContextEngineer {
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
            system_role: None,
            tools: None,
            knowledge: None,
            capabilities: None,
            user_memory: None,
            history_summary: None,
            summary_formatter: None,
            extended_contexts: Vec::new(),
            input_template: None,
            history_count: None,
        }
    }

    pub fn system_role(mut self, role: impl Into<String>) -> Self {
        self.system_role = Some(role.into());
        self
    }

    pub fn system_role_opt(mut self, role: Option<String>) -> Self {
        self.system_role = role;
        self
    }

    pub fn tools(mut self, tools: ToolsContext) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn resolved_tools(self, resolved: &ResolvedToolSet) -> Self {
        self.tools(ToolsContext::from_resolved(resolved))
    }

    pub fn knowledge(mut self, knowledge: KnowledgeContext) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn user_memory(mut self, memory: UserMemory) -> Self {
        self.user_memory = Some(memory);
        self
    }

    pub fn history_summary(mut self, summary: impl Into<String>) -> Self {
        self.history_summary = Some(summary.into());
        self
    }

    pub fn summary_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.summary_formatter = Some(Arc::new(formatter));
        self
    }

    pub fn extended_context(mut self, context: ExtendedContext) -> Self {
        self.extended_contexts.push(context);
        self
    }

    pub fn input_template(mut self, template: impl Into<String>) -> Self {
        self.input_template = Some(template.into());
        self
    }

    /// Keep only the last `count` conversation messages.
    pub fn history_count(mut self, count: usize) -> Self {
        self.history_count = Some(count);
        self
    }

    fn function_calling_enabled(&self) -> bool {
        self.capabilities
            .as_ref()
            .is_none_or(|caps| caps.can_use_function_calling(&self.model, &self.provider))
    }

    fn system_parts(&self) -> Vec<String> {
        let mut parts = Vec::new();

        if let Some(role) = self.system_role.as_deref().filter(|r| !r.trim().is_empty()) {
            parts.push(role.to_string());
        }

        if let Some(tools) = self.tools.as_ref().filter(|t| !t.is_empty())
            && self.function_calling_enabled()
        {
            parts.push(tools.render());
        }

        if let Some(knowledge) = self.knowledge.as_ref().filter(|k| !k.is_empty()) {
            match knowledge.validate() {
                Ok(()) => parts.push(knowledge.render()),
                Err(e) => tracing::warn!(error = %e, "skipping knowledge injection"),
            }
        }

        for context in &self.extended_contexts {
            match context.render() {
                Ok(block) => parts.push(block),
                Err(e) => tracing::warn!(error = %e, "skipping extended context"),
            }
        }

        if let Some(summary) = self.history_summary.as_deref().filter(|s| !s.trim().is_empty()) {
            let rendered = match &self.summary_formatter {
                Some(format) => format(summary),
                None => summary.to_string(),
            };
            if !rendered.is_empty() {
                parts.push(rendered);
            }
        }

        parts
    }

    fn memory_message(&self) -> Option<Message> {
        let memory = self.user_memory.as_ref().filter(|m| !m.is_empty())?;
        match memory.validate() {
            Ok(()) => Some(Message::user(memory.render())),
            Err(e) => {
                tracing::warn!(error = %e, "skipping user memory injection");
                None
            }
        }
    }

    /// Run every stage over `messages`. Inputs are never modified.
    pub fn engineer(&self, messages: &[ConversationMessage]) -> EngineeredMessageSet {
        let history = match self.history_count {
            Some(count) if messages.len() > count => &messages[messages.len() - count..],
            _ => messages,
        };

        let mut drafts: Vec<Draft> = Vec::with_capacity(history.len() + 2);

        let system = self.system_parts();
        if !system.is_empty() {
            drafts.push(Draft {
                message: Message::system(system.join("\n\n")),
                user_authored: false,
            });
        }

        for stored in history {
            drafts.push(Draft {
                message: stored.to_model_message(),
                user_authored: stored.role == Role::User,
            });
        }

        if let Some(memory) = self.memory_message() {
            let position = drafts
                .iter()
                .position(|d| d.user_authored)
                .unwrap_or(drafts.len());
            drafts.insert(
                position,
                Draft {
                    message: memory,
                    user_authored: false,
                },
            );
        }

        if let Some(template) = self.input_template.as_deref().filter(|t| has_text_placeholder(t)) {
            for draft in drafts.iter_mut().filter(|d| d.user_authored) {
                draft.message.content = apply_input_template(template, &draft.message.content);
            }
        }

        let messages: Vec<Message> = drafts.into_iter().map(|d| d.message).collect();

        tracing::debug!(
            model = %self.model,
            input = history.len(),
            output = messages.len(),
            "engineered messages"
        );

        EngineeredMessageSet { messages }
    }
}
