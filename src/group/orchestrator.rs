//! Supervised turn-taking among the members of a group.

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use super::decision::GroupDecision;
use super::supervisor;
use crate::agent::{AgentExecutor, AgentTurn, TurnHandle, TurnOutcome};
use crate::config::EngineSettings;
use crate::observability::{operation_span, round_span};
use crate::operation::{
    OperationContext, OperationId, OperationKind, OperationSpec, OperationStatus,
    StartedOperation,
};

/// Default bound on rounds per [`GroupOrchestrator::run`].
pub const DEFAULT_MAX_ROUNDS: usize = 8;

/// The conversation a group orchestration runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChat {
    pub group_id: String,
    pub topic_id: String,
    pub supervisor_id: String,
}

impl GroupChat {
    pub fn new(
        group_id: impl Into<String>,
        topic_id: impl Into<String>,
        supervisor_id: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            topic_id: topic_id.into(),
            supervisor_id: supervisor_id.into(),
        }
    }

    fn member_context(&self, agent_id: &str) -> OperationContext {
        OperationContext::group(&self.group_id, &self.topic_id, agent_id)
    }
}

/// Where a round is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    AwaitingSupervisorDecision,
    Dispatching,
    Terminal,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingSupervisorDecision => "awaiting_supervisor_decision",
            Self::Dispatching => "dispatching",
            Self::Terminal => "terminal",
        }
    }
}

/// Why the orchestration loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// A `finish` decision.
    Finished,
    /// The decision asked not to call the supervisor again.
    SkipSupervisor,
    /// The supervisor errored or produced no usable decision.
    SupervisorFailed,
    /// The decision addressed no one or a non-member.
    InvalidDecision,
    Cancelled,
    MaxRounds,
}

/// Result of one dispatch round.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub decision: GroupDecision,
    /// Member operations started this round, in dispatch order.
    pub dispatched: Vec<OperationId>,
    pub outcomes: Vec<TurnOutcome>,
    /// The supervisor's next decision, when it was invoked and succeeded.
    pub next: Option<GroupDecision>,
    pub stop: Option<StopReason>,
}

impl RoundOutcome {
    fn new(decision: GroupDecision) -> Self {
        Self {
            decision,
            dispatched: Vec::new(),
            outcomes: Vec::new(),
            next: None,
            stop: None,
        }
    }

    fn stop(mut self, reason: StopReason) -> Self {
        self.stop = Some(reason);
        self
    }
}

/// Summary of a full [`GroupOrchestrator::run`].
#[derive(Debug, Clone)]
pub struct OrchestrationReport {
    pub operation_id: OperationId,
    pub rounds: usize,
    pub dispatched: Vec<OperationId>,
    pub decisions: Vec<GroupDecision>,
    pub stop_reason: StopReason,
}

/// An orchestration running on its own task.
#[derive(Debug)]
pub struct OrchestrationHandle {
    pub operation_id: OperationId,
    pub handle: JoinHandle<OrchestrationReport>,
}

/// Drives group rounds: dispatch members, wait for them to settle, ask the
/// supervisor what happens next.
///
/// Member turns never surface errors here; the orchestrator only reads their
/// terminal status.
#[derive(Debug, Clone)]
pub struct GroupOrchestrator {
    executor: AgentExecutor,
    max_rounds: usize,
}

impl GroupOrchestrator {
    pub fn new(executor: AgentExecutor) -> Self {
        Self {
            executor,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn settings(self, settings: &EngineSettings) -> Self {
        self.with_max_rounds(settings.max_rounds)
    }

    pub fn executor(&self) -> &AgentExecutor {
        &self.executor
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Dispatch one decision and, unless it says otherwise, ask the supervisor
    /// for the next one once every dispatched turn is terminal.
    pub async fn run_round(
        &self,
        group_id: &str,
        topic_id: &str,
        supervisor_id: &str,
        decision: GroupDecision,
    ) -> RoundOutcome {
        let chat = GroupChat::new(group_id, topic_id, supervisor_id);
        self.round(&chat, decision, None, false).await
    }

    /// Run rounds until a stop condition, as one `GroupOrchestration` operation.
    ///
    /// Without an `initial` decision the supervisor is asked first.
    pub async fn run(
        &self,
        group_id: &str,
        topic_id: &str,
        supervisor_id: &str,
        initial: Option<GroupDecision>,
    ) -> OrchestrationReport {
        let chat = GroupChat::new(group_id, topic_id, supervisor_id);
        let started = self.open(&chat).await;
        self.drive(chat, started, initial).await
    }

    /// Like [`run`](Self::run) on a new task. The operation is registered
    /// before this returns, so it can be cancelled immediately.
    pub async fn spawn(&self, chat: GroupChat, initial: Option<GroupDecision>) -> OrchestrationHandle {
        let started = self.open(&chat).await;
        let operation_id = started.operation_id.clone();
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move { orchestrator.drive(chat, started, initial).await });
        OrchestrationHandle {
            operation_id,
            handle,
        }
    }

    /// Cancel a running orchestration and every turn it dispatched.
    pub async fn cancel(&self, operation_id: &str) -> bool {
        self.executor.registry().cancel(operation_id).await
    }

    async fn open(&self, chat: &GroupChat) -> StartedOperation {
        let spec = OperationSpec::new(
            OperationKind::GroupOrchestration,
            OperationContext::group(&chat.group_id, &chat.topic_id, &chat.supervisor_id),
        )
        .label(format!("group:{}", chat.group_id));
        self.executor.registry().start(spec).await
    }

    async fn drive(
        &self,
        chat: GroupChat,
        started: StartedOperation,
        initial: Option<GroupDecision>,
    ) -> OrchestrationReport {
        let context =
            OperationContext::group(&chat.group_id, &chat.topic_id, &chat.supervisor_id);
        let span = operation_span(
            &started.operation_id,
            OperationKind::GroupOrchestration,
            &context,
        );
        let report = self.round_loop(&chat, &started, initial).instrument(span).await;

        let registry = self.executor.registry();
        match report.stop_reason {
            StopReason::Cancelled => registry.complete_cancelled(&started.operation_id).await,
            _ => registry.complete(&started.operation_id).await,
        };
        info!(
            operation_id = %started.operation_id,
            group_id = %chat.group_id,
            rounds = report.rounds,
            stop_reason = ?report.stop_reason,
            "Group orchestration finished"
        );
        report
    }

    async fn round_loop(
        &self,
        chat: &GroupChat,
        started: &StartedOperation,
        initial: Option<GroupDecision>,
    ) -> OrchestrationReport {
        let mut report = OrchestrationReport {
            operation_id: started.operation_id.clone(),
            rounds: 0,
            dispatched: Vec::new(),
            decisions: Vec::new(),
            stop_reason: StopReason::Finished,
        };

        let mut decision = match initial {
            Some(decision) => decision,
            None => match self.ask_supervisor(chat, started).await {
                Ok(decision) => decision,
                Err(reason) => {
                    report.stop_reason = reason;
                    return report;
                }
            },
        };

        loop {
            report.rounds += 1;
            report.decisions.push(decision.clone());
            let last_round = report.rounds >= self.max_rounds;
            let outcome = self
                .round(chat, decision, Some(started), last_round)
                .instrument(round_span(&chat.group_id, &chat.topic_id, report.rounds))
                .await;
            report.dispatched.extend(outcome.dispatched);

            if let Some(reason) = outcome.stop {
                report.stop_reason = reason;
                return report;
            }
            let Some(next) = outcome.next else {
                report.stop_reason = StopReason::SupervisorFailed;
                return report;
            };
            decision = next;
        }
    }

    async fn ask_supervisor(
        &self,
        chat: &GroupChat,
        parent: &StartedOperation,
    ) -> Result<GroupDecision, StopReason> {
        if parent.cancellation_token.is_cancelled() {
            return Err(StopReason::Cancelled);
        }
        match supervisor::decide(&self.executor, chat, Some(&parent.operation_id)).await {
            Ok(decision) => Ok(decision),
            Err(_) if parent.cancellation_token.is_cancelled() => Err(StopReason::Cancelled),
            Err(_) => Err(StopReason::SupervisorFailed),
        }
    }

    async fn round(
        &self,
        chat: &GroupChat,
        mut decision: GroupDecision,
        parent: Option<&StartedOperation>,
        last_round: bool,
    ) -> RoundOutcome {
        self.executor.registry().metrics().group_rounds.inc();
        let mut outcome = RoundOutcome::new(decision.clone());
        let is_cancelled = || parent.is_some_and(|p| p.cancellation_token.is_cancelled());

        if is_cancelled() {
            return outcome.stop(StopReason::Cancelled);
        }

        debug!(
            state = RoundState::Dispatching.as_str(),
            decision = decision.kind(),
            "Group round"
        );

        if !decision.is_finish() {
            let members = match self.executor.store().group_members(&chat.group_id).await {
                Ok(members) => members,
                Err(e) => {
                    warn!(group_id = %chat.group_id, error = %e, "Group members unavailable");
                    return outcome.stop(StopReason::InvalidDecision);
                }
            };
            let rejected = decision.retain_members(&members);
            if !rejected.is_empty() {
                warn!(group_id = %chat.group_id, rejected = ?rejected, "Skipping non-member broadcast targets");
                outcome.decision = decision.clone();
            }
            if let Err(e) = decision.validate(&members) {
                warn!(group_id = %chat.group_id, error = %e, "Rejected group decision");
                return outcome.stop(StopReason::InvalidDecision);
            }
        }

        match &decision {
            GroupDecision::Finish { .. } => {
                debug!(state = RoundState::Terminal.as_str(), "Group finished");
                return outcome.stop(StopReason::Finished);
            }
            GroupDecision::Broadcast { agent_ids, .. } => {
                let mut handles = Vec::with_capacity(agent_ids.len());
                for agent_id in agent_ids {
                    handles.push(self.dispatch(chat, agent_id, &decision, parent).await);
                }
                outcome.dispatched = handles.iter().map(|h| h.operation_id.clone()).collect();
                outcome.outcomes = self.settle(handles).await;
            }
            GroupDecision::Speak { agent_id, .. } => {
                let handle = self.dispatch(chat, agent_id, &decision, parent).await;
                outcome.dispatched = vec![handle.operation_id.clone()];
                outcome.outcomes = self.settle(vec![handle]).await;
            }
            GroupDecision::Delegate {
                agent_id, reason, ..
            } => {
                info!(topic_id = %chat.topic_id, agent_id = %agent_id, reason = %reason, "Delegating topic");
                if let Err(e) = self
                    .executor
                    .store()
                    .assign_topic_owner(&chat.topic_id, agent_id)
                    .await
                {
                    warn!(topic_id = %chat.topic_id, error = %e, "Failed to reassign topic");
                }
            }
        }

        if decision.skip_call_supervisor() {
            return outcome.stop(StopReason::SkipSupervisor);
        }
        if is_cancelled() {
            return outcome.stop(StopReason::Cancelled);
        }
        if last_round {
            debug!(max_rounds = self.max_rounds, "Round limit reached");
            return outcome.stop(StopReason::MaxRounds);
        }

        debug!(
            state = RoundState::AwaitingSupervisorDecision.as_str(),
            "Round settled"
        );
        let parent_id = parent.map(|p| &p.operation_id);
        match supervisor::decide(&self.executor, chat, parent_id).await {
            Ok(next) => outcome.next = Some(next),
            Err(_) if is_cancelled() => outcome.stop = Some(StopReason::Cancelled),
            Err(_) => outcome.stop = Some(StopReason::SupervisorFailed),
        }
        outcome
    }

    async fn dispatch(
        &self,
        chat: &GroupChat,
        agent_id: &str,
        decision: &GroupDecision,
        parent: Option<&StartedOperation>,
    ) -> TurnHandle {
        let mut turn = AgentTurn::new(chat.member_context(agent_id));
        if let Some(instruction) = decision.instruction() {
            turn = turn.instruction(instruction);
        }
        if let Some(parent) = parent {
            turn = turn.parent(parent.operation_id.clone());
        }
        self.executor.spawn_turn(turn).await
    }

    /// Wait for every dispatched turn to reach a terminal state.
    async fn settle(&self, handles: Vec<TurnHandle>) -> Vec<TurnOutcome> {
        let (ids, joins): (Vec<_>, Vec<_>) = handles
            .into_iter()
            .map(|h| (h.operation_id, h.handle))
            .unzip();
        let results = join_all(joins).await;

        let registry = self.executor.registry();
        let mut outcomes = Vec::with_capacity(results.len());
        for (operation_id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(operation_id = %operation_id, error = %e, "Member turn task aborted");
                    registry.fail(&operation_id, e.to_string()).await;
                    let agent_id = registry
                        .get(&operation_id)
                        .await
                        .map(|op| op.context.agent_id)
                        .unwrap_or_default();
                    outcomes.push(TurnOutcome {
                        operation_id,
                        agent_id,
                        status: OperationStatus::Failed,
                        message_id: None,
                        content: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        outcomes
    }
}
