//! Supervisor invocation: one inference producing the next [`GroupDecision`].

use tracing::{Instrument, debug, warn};

use super::decision::{GroupDecision, decision_schema};
use super::orchestrator::GroupChat;
use crate::agent::AgentExecutor;
use crate::context::ContextEngineer;
use crate::observability::{inference_span, operation_span};
use crate::operation::{OperationContext, OperationId, OperationKind, OperationSpec};
use crate::provider::infer_cancellable;
use crate::store::ConversationTarget;
use crate::{Error, Result};

/// What the supervisor is told about one member.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberProfile {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl MemberProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
        }
    }
}

/// System block listing the members and the decision format.
pub fn roster_prompt(members: &[MemberProfile]) -> String {
    let mut out = String::from(
        "You coordinate a group conversation. Decide who responds next.\n<members>\n",
    );
    for member in members {
        out.push_str(&format!("<member id=\"{}\"", member.id));
        if let Some(title) = &member.title {
            out.push_str(&format!(" name=\"{}\"", title));
        }
        match &member.description {
            Some(description) => out.push_str(&format!(">{}</member>\n", description)),
            None => out.push_str(" />\n"),
        }
    }
    out.push_str("</members>\n");
    out.push_str(
        "Reply with exactly one JSON object matching this schema. Use \"finish\" when the \
         conversation needs no further response.\n",
    );
    out.push_str(&decision_schema().to_string());
    out
}

async fn member_profiles(executor: &AgentExecutor, members: &[String]) -> Vec<MemberProfile> {
    let mut profiles = Vec::with_capacity(members.len());
    for id in members {
        let mut profile = MemberProfile::new(id.clone());
        match executor.store().agent_config(id).await {
            Ok(config) => {
                profile.title = config.title;
                profile.description = config.description;
            }
            Err(e) => debug!(agent_id = %id, error = %e, "member config unavailable"),
        }
        profiles.push(profile);
    }
    profiles
}

/// Ask the supervisor for the next decision.
///
/// Runs as a `GroupOrchestration` operation under `parent`. Any failure
/// (inference error, unparseable output, unknown member) fails that
/// operation and is returned to the caller.
pub(crate) async fn decide(
    executor: &AgentExecutor,
    chat: &GroupChat,
    parent: Option<&OperationId>,
) -> Result<GroupDecision> {
    let registry = executor.registry();
    let context = OperationContext::group(&chat.group_id, &chat.topic_id, &chat.supervisor_id);
    let started = registry
        .start(
            OperationSpec::new(OperationKind::GroupOrchestration, context.clone())
                .label(format!("supervisor:{}", chat.supervisor_id))
                .parent_opt(parent.cloned()),
        )
        .await;
    registry.metrics().supervisor_invocations.inc();

    let span = operation_span(
        &started.operation_id,
        OperationKind::GroupOrchestration,
        &context,
    );
    let token = started.cancellation_token.clone();
    let result = async {
        let members = executor.store().group_members(&chat.group_id).await?;
        let profiles = member_profiles(executor, &members).await;
        let config = executor.store().agent_config(&chat.supervisor_id).await?;
        let history = executor
            .settled_history(&ConversationTarget::Topic(chat.topic_id.clone()))
            .await?;

        let system_role = match config.system_role.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => format!("{}\n\n{}", base, roster_prompt(&profiles)),
            _ => roster_prompt(&profiles),
        };
        let messages = ContextEngineer::new(&config.model, &config.provider)
            .system_role(system_role)
            .capabilities(executor.capabilities().clone())
            .engineer(&history)
            .into_messages();

        let reply = infer_cancellable(
            executor.provider().as_ref(),
            &config.model,
            &config.provider,
            &messages,
            None,
            token.clone(),
        )
        .instrument(inference_span(&config.model, &config.provider, messages.len(), 0))
        .await;
        registry.metrics().inference_calls.inc();
        let reply = reply?;

        let mut decision = GroupDecision::from_supervisor_output(&reply.content)?;
        let rejected = decision.retain_members(&members);
        if !rejected.is_empty() {
            warn!(group_id = %chat.group_id, rejected = ?rejected, "Supervisor addressed non-members");
        }
        decision.validate(&members)?;
        Ok::<_, Error>(decision)
    }
    .instrument(span)
    .await;

    match &result {
        Ok(decision) => {
            debug!(decision = decision.kind(), "Supervisor decided");
            registry.complete(&started.operation_id).await;
        }
        Err(_) if token.is_cancelled() => {
            registry.complete_cancelled(&started.operation_id).await;
        }
        Err(e) => {
            warn!(supervisor_id = %chat.supervisor_id, error = %e, "Supervisor failed");
            registry.fail(&started.operation_id, e.to_string()).await;
        }
    }
    result
}
