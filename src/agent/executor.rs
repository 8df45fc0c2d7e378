//! The operation body of an agent turn.

use std::sync::Arc;

use tracing::{Instrument, debug, info, warn};

use super::turn::{AgentTurn, TurnHandle, TurnOutcome};
use crate::config::EngineSettings;
use crate::context::ContextEngineer;
use crate::observability::{inference_span, operation_span, tool_span};
use crate::operation::{
    OperationContext, OperationKind, OperationRegistry, OperationSpec, OperationStatus,
    StartedOperation,
};
use crate::provider::{InferenceProvider, infer_cancellable};
use crate::store::{ConversationTarget, MessageContext, MessagePatch, PersistenceStore};
use crate::tools::{
    BuiltinToolRegistry, Capabilities, ManifestSource, StaticManifestSource, ToolExecutionContext,
    ToolResolver, ToolResult, operation_kind_for, parse_tool_name,
};
use crate::types::{ConversationMessage, Message, Role, ToolCall};
use crate::{Error, Result};

/// Default number of tool round trips before the model must answer in text.
pub const DEFAULT_MAX_TOOL_STEPS: usize = 8;

struct TurnOutput {
    message_id: String,
    content: String,
}

struct ExecutorInner {
    registry: OperationRegistry,
    store: Arc<dyn PersistenceStore>,
    provider: Arc<dyn InferenceProvider>,
    manifests: Arc<dyn ManifestSource>,
    builtins: BuiltinToolRegistry,
    capabilities: Capabilities,
    resolver: ToolResolver,
    max_tool_steps: usize,
}

/// Runs agent turns as registry operations.
///
/// Each turn resolves tools, engineers the context, calls the provider and
/// executes requested builtin tools until the model answers in text. The
/// operation is always finished on exit: completed, failed with the error
/// attached, or cancelled.
#[derive(Clone)]
pub struct AgentExecutor {
    inner: Arc<ExecutorInner>,
}

impl std::fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("store", &self.inner.store.name())
            .field("capabilities", &self.inner.capabilities)
            .field("resolver", &self.inner.resolver)
            .field("max_tool_steps", &self.inner.max_tool_steps)
            .finish()
    }
}

pub struct AgentExecutorBuilder {
    registry: OperationRegistry,
    store: Arc<dyn PersistenceStore>,
    provider: Arc<dyn InferenceProvider>,
    manifests: Arc<dyn ManifestSource>,
    builtins: BuiltinToolRegistry,
    capabilities: Capabilities,
    resolver: ToolResolver,
    max_tool_steps: usize,
}

impl AgentExecutorBuilder {
    pub fn manifests(mut self, manifests: Arc<dyn ManifestSource>) -> Self {
        self.manifests = manifests;
        self
    }

    pub fn builtins(mut self, builtins: BuiltinToolRegistry) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn resolver(mut self, resolver: ToolResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn max_tool_steps(mut self, steps: usize) -> Self {
        self.max_tool_steps = steps;
        self
    }

    /// Apply environment, default tools and step limit from loaded settings.
    pub fn settings(mut self, settings: &EngineSettings) -> Self {
        self.capabilities.environment = settings.environment;
        self.resolver = self
            .resolver
            .with_default_tool_ids(settings.default_tool_ids.iter().cloned());
        self.max_tool_steps = settings.max_tool_steps;
        self
    }

    pub fn build(self) -> AgentExecutor {
        AgentExecutor {
            inner: Arc::new(ExecutorInner {
                registry: self.registry,
                store: self.store,
                provider: self.provider,
                manifests: self.manifests,
                builtins: self.builtins,
                capabilities: self.capabilities,
                resolver: self.resolver,
                max_tool_steps: self.max_tool_steps,
            }),
        }
    }
}

impl AgentExecutor {
    pub fn builder(
        registry: OperationRegistry,
        store: Arc<dyn PersistenceStore>,
        provider: Arc<dyn InferenceProvider>,
    ) -> AgentExecutorBuilder {
        AgentExecutorBuilder {
            registry,
            store,
            provider,
            manifests: Arc::new(StaticManifestSource::default()),
            builtins: BuiltinToolRegistry::new(),
            capabilities: Capabilities::default(),
            resolver: ToolResolver::agent(),
            max_tool_steps: DEFAULT_MAX_TOOL_STEPS,
        }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &Arc<dyn PersistenceStore> {
        &self.inner.store
    }

    pub fn provider(&self) -> &Arc<dyn InferenceProvider> {
        &self.inner.provider
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    /// Open the turn's operation, then run its body on a new task.
    ///
    /// The operation exists in the registry when this returns.
    pub async fn spawn_turn(&self, turn: AgentTurn) -> TurnHandle {
        let started = self.open(&turn).await;
        let operation_id = started.operation_id.clone();
        let executor = self.clone();
        let handle = tokio::spawn(async move { executor.drive(started, turn).await });
        TurnHandle {
            operation_id,
            handle,
        }
    }

    /// Run a turn on the current task.
    pub async fn run_turn(&self, turn: AgentTurn) -> TurnOutcome {
        let started = self.open(&turn).await;
        self.drive(started, turn).await
    }

    async fn open(&self, turn: &AgentTurn) -> StartedOperation {
        let label = turn
            .label
            .clone()
            .unwrap_or_else(|| format!("agent:{}", turn.agent_id()));
        let spec = OperationSpec::new(OperationKind::AgentExecution, turn.context.clone())
            .label(label)
            .parent_opt(turn.parent_id.clone());
        self.inner.registry.start(spec).await
    }

    async fn drive(&self, started: StartedOperation, turn: AgentTurn) -> TurnOutcome {
        let span = operation_span(
            &started.operation_id,
            OperationKind::AgentExecution,
            &turn.context,
        );
        let mut message_id = None;
        let result = self
            .execute_body(&started, &turn, &mut message_id)
            .instrument(span)
            .await;

        let registry = &self.inner.registry;
        let id = &started.operation_id;
        let mut outcome = TurnOutcome {
            operation_id: id.clone(),
            agent_id: turn.context.agent_id.clone(),
            status: OperationStatus::Completed,
            message_id,
            content: None,
            error: None,
        };

        match result {
            Ok(output) => {
                registry.complete(id).await;
                outcome.message_id = Some(output.message_id);
                outcome.content = Some(output.content);
            }
            Err(_) if started.cancellation_token.is_cancelled() => {
                registry.complete_cancelled(id).await;
                outcome.status = OperationStatus::Cancelled;
            }
            Err(Error::Cancelled) => {
                registry.complete_cancelled(id).await;
                outcome.status = OperationStatus::Cancelled;
            }
            Err(e) => {
                let message = e.to_string();
                warn!(operation_id = %id, error = %message, "Agent turn failed");
                if let Some(message_id) = &outcome.message_id
                    && let Err(store_err) = self
                        .inner
                        .store
                        .update_message(message_id, MessagePatch::error(message.clone()))
                        .await
                {
                    warn!(error = %store_err, "Failed to record turn error on message");
                }
                registry.fail(id, message.clone()).await;
                outcome.status = OperationStatus::Failed;
                outcome.error = Some(message);
            }
        }

        outcome
    }

    async fn execute_body(
        &self,
        started: &StartedOperation,
        turn: &AgentTurn,
        message_id: &mut Option<String>,
    ) -> Result<TurnOutput> {
        let inner = &self.inner;
        let ctx = &turn.context;
        let token = &started.cancellation_token;

        let config = inner.store.agent_config(&ctx.agent_id).await?;

        let mut lookup_ids = config.plugins.clone();
        for id in inner.resolver.default_tool_ids() {
            if !lookup_ids.contains(id) {
                lookup_ids.push(id.clone());
            }
        }
        let manifests = inner.manifests.list_manifests(&lookup_ids).await;
        let resolved = inner.resolver.resolve(
            &config.plugins,
            &config.model,
            &config.provider,
            &manifests,
            &inner.capabilities,
        );

        let history = match ConversationTarget::from_ids(
            ctx.topic_id.as_deref(),
            ctx.thread_id.as_deref(),
        ) {
            Some(target) => self.settled_history(&target).await?,
            None => Vec::new(),
        };

        let system_role =
            compose_system_role(config.system_role.as_deref(), turn.instruction.as_deref());
        let mut engineer = ContextEngineer::new(&config.model, &config.provider)
            .system_role_opt(system_role)
            .resolved_tools(&resolved)
            .capabilities(inner.capabilities.clone());
        if let Some(count) = config.history_count {
            engineer = engineer.history_count(count);
        }
        if let Some(template) = &config.input_template {
            engineer = engineer.input_template(template.clone());
        }
        let mut messages = engineer.engineer(&history).into_messages();

        let message_ctx = MessageContext::from_operation(ctx);
        let mut current = self
            .open_assistant_message(&message_ctx, &started.operation_id)
            .await?;
        *message_id = Some(current.clone());

        for step in 0..=inner.max_tool_steps {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            // Last step withholds tools so the model has to answer.
            let tools = if step < inner.max_tool_steps {
                resolved.tools.as_deref()
            } else {
                None
            };

            let reply = infer_cancellable(
                inner.provider.as_ref(),
                &config.model,
                &config.provider,
                &messages,
                tools,
                token.clone(),
            )
            .instrument(inference_span(
                &config.model,
                &config.provider,
                messages.len(),
                tools.map_or(0, |tools| tools.len()),
            ))
            .await;
            inner.registry.metrics().inference_calls.inc();
            let reply = reply?;

            if !reply.has_tool_calls() {
                inner
                    .store
                    .update_message(&current, MessagePatch::content(reply.content.clone()))
                    .await?;
                debug!(message_id = %current, steps = step + 1, "Agent turn answered");
                return Ok(TurnOutput {
                    message_id: current,
                    content: reply.content,
                });
            }
            if step == inner.max_tool_steps {
                break;
            }

            inner
                .store
                .update_message(
                    &current,
                    MessagePatch::content(reply.content.clone())
                        .with_tool_calls(reply.tool_calls.clone()),
                )
                .await?;
            messages.push(Message {
                tool_calls: reply.tool_calls.clone(),
                ..Message::assistant(reply.content.clone())
            });

            for call in &reply.tool_calls {
                let content = self.execute_tool_call(started, ctx, call).await?;
                messages.push(Message::tool_result(call.id.clone(), content));
            }

            current = self
                .open_assistant_message(&message_ctx, &started.operation_id)
                .await?;
            *message_id = Some(current.clone());
        }

        Err(Error::Tool(format!(
            "no answer after {} tool steps",
            inner.max_tool_steps
        )))
    }

    /// Conversation history without messages still owned by a running
    /// operation or left empty by a failed one.
    pub(crate) async fn settled_history(
        &self,
        target: &ConversationTarget,
    ) -> Result<Vec<ConversationMessage>> {
        let mut messages = self.inner.store.list_messages(target).await?;
        let in_flight = self
            .inner
            .registry
            .running_messages(messages.iter().map(|m| m.id.as_str()))
            .await;
        let before = messages.len();
        messages.retain(|m| !in_flight.contains(&m.id) && !m.is_failed_placeholder());
        if messages.len() < before {
            debug!(
                skipped = before - messages.len(),
                "Skipped unsettled messages in history"
            );
        }
        Ok(messages)
    }

    async fn open_assistant_message(
        &self,
        message_ctx: &MessageContext,
        operation_id: &str,
    ) -> Result<String> {
        let id = self
            .inner
            .store
            .create_message(Role::Assistant, "", message_ctx)
            .await?;
        self.inner.registry.associate(id.clone(), operation_id).await;
        Ok(id)
    }

    /// Runs one tool call as a child operation owning its tool message.
    async fn execute_tool_call(
        &self,
        parent: &StartedOperation,
        ctx: &OperationContext,
        call: &ToolCall,
    ) -> Result<String> {
        let inner = &self.inner;
        let identifier = parse_tool_name(&call.name)
            .map(|parts| parts.identifier)
            .unwrap_or(call.name.as_str());

        let started = inner
            .registry
            .start(
                OperationSpec::new(operation_kind_for(identifier), ctx.clone())
                    .label(call.name.clone())
                    .parent(parent.operation_id.clone()),
            )
            .await;

        let result = self
            .run_tool(&started, ctx, call)
            .instrument(tool_span(&call.name, &call.id))
            .await;
        inner.registry.metrics().tool_calls.inc();

        match result {
            Ok(ToolResult::Error(message)) => {
                inner.registry.fail(&started.operation_id, message.clone()).await;
                Ok(message)
            }
            Ok(result) => {
                inner.registry.complete(&started.operation_id).await;
                Ok(result.content().to_string())
            }
            Err(Error::Cancelled) => {
                inner.registry.complete_cancelled(&started.operation_id).await;
                Err(Error::Cancelled)
            }
            Err(e) => {
                inner.registry.fail(&started.operation_id, e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn run_tool(
        &self,
        started: &StartedOperation,
        ctx: &OperationContext,
        call: &ToolCall,
    ) -> Result<ToolResult> {
        let inner = &self.inner;
        let message_ctx =
            MessageContext::from_operation(ctx).with_tool_call(call.id.clone(), call.name.clone());
        let message_id = inner
            .store
            .create_message(Role::Tool, "", &message_ctx)
            .await?;
        inner
            .registry
            .associate(message_id.clone(), started.operation_id.clone())
            .await;

        let result = match call.parsed_arguments() {
            Ok(params) => {
                let exec_ctx =
                    ToolExecutionContext::new(started.operation_id.clone(), ctx.agent_id.clone())
                        .with_topic(ctx.topic_id.clone())
                        .with_cancellation_token(started.cancellation_token.clone());
                tokio::select! {
                    biased;
                    _ = started.cancellation_token.cancelled() => return Err(Error::Cancelled),
                    result = inner.builtins.execute_call(&call.name, params, &exec_ctx) => result,
                }
            }
            Err(e) => ToolResult::error(format!("Invalid tool arguments: {}", e)),
        };

        let patch = match &result {
            ToolResult::Error(message) => MessagePatch {
                content: Some(message.clone()),
                error: Some(message.clone()),
                ..Default::default()
            },
            other => MessagePatch::content(other.content()),
        };
        inner.store.update_message(&message_id, patch).await?;

        info!(
            tool = %call.name,
            is_error = result.is_error(),
            "Tool call finished"
        );
        Ok(result)
    }
}

fn compose_system_role(base: Option<&str>, instruction: Option<&str>) -> Option<String> {
    let base = base.map(str::trim).filter(|s| !s.is_empty());
    match (base, instruction) {
        (base, Some(instruction)) => {
            let block = format!(
                "<supervisor_instruction>\n{}\n</supervisor_instruction>",
                instruction.trim()
            );
            Some(match base {
                Some(base) => format!("{}\n\n{}", base, block),
                None => block,
            })
        }
        (Some(base), None) => Some(base.to_string()),
        (None, None) => None,
    }
}
