//! Operation registry: lifecycle, cancellation and message ownership.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::retention::RetentionPolicy;
use super::types::{
    Operation, OperationId, OperationKind, OperationSpec, OperationStatus, StartedOperation,
};
use crate::observability::EngineMetrics;

struct Entry {
    operation: Operation,
    status_tx: watch::Sender<OperationStatus>,
}

#[derive(Default)]
struct RegistryState {
    operations: HashMap<OperationId, Entry>,
    associations: HashMap<String, OperationId>,
    /// Reverse of `associations`. May hold stale ids after an overwrite.
    owned_messages: HashMap<OperationId, Vec<String>>,
    terminal_order: VecDeque<OperationId>,
}

impl RegistryState {
    fn evict(&mut self, retention: &RetentionPolicy) -> usize {
        let mut evicted = 0;
        while self.terminal_order.len() > retention.max_terminal_operations {
            let Some(id) = self.terminal_order.pop_front() else {
                break;
            };
            self.operations.remove(&id);
            for message_id in self.owned_messages.remove(&id).unwrap_or_default() {
                if self.associations.get(&message_id) == Some(&id) {
                    self.associations.remove(&message_id);
                }
            }
            evicted += 1;
        }
        evicted
    }
}

/// Tracks every in-flight or finished operation.
///
/// All mutations go through one write lock, so starting, finishing and
/// associating are serialized. Lookups of unknown ids never error; they
/// return `false`, `None` or do nothing.
#[derive(Clone)]
pub struct OperationRegistry {
    state: Arc<RwLock<RegistryState>>,
    retention: RetentionPolicy,
    metrics: Arc<EngineMetrics>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            retention: RetentionPolicy::default(),
            metrics: Arc::new(EngineMetrics::new()),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Open a running operation.
    ///
    /// When `spec.parent_id` names a known operation the new token is a child
    /// of the parent's token, so cancelling the parent reaches this one too.
    pub async fn start(&self, spec: OperationSpec) -> StartedOperation {
        let mut state = self.state.write().await;

        let token = match spec
            .parent_id
            .as_ref()
            .and_then(|parent| state.operations.get(parent))
        {
            Some(parent) => parent.operation.cancellation_token.child_token(),
            None => CancellationToken::new(),
        };

        let id = uuid::Uuid::new_v4().to_string();
        let (status_tx, _) = watch::channel(OperationStatus::Running);

        debug!(
            operation_id = %id,
            kind = spec.kind.as_str(),
            agent_id = %spec.context.agent_id,
            label = %spec.label,
            "Operation started"
        );

        state.operations.insert(
            id.clone(),
            Entry {
                operation: Operation {
                    id: id.clone(),
                    kind: spec.kind,
                    status: OperationStatus::Running,
                    context: spec.context,
                    label: spec.label,
                    parent_id: spec.parent_id,
                    error: None,
                    cancellation_token: token.clone(),
                    created_at: Utc::now(),
                    finished_at: None,
                },
                status_tx,
            },
        );
        self.metrics.record_started();

        StartedOperation {
            operation_id: id,
            cancellation_token: token,
        }
    }

    pub async fn complete(&self, id: &str) -> bool {
        self.finish(id, OperationStatus::Completed, None).await
    }

    pub async fn fail(&self, id: &str, error: impl Into<String>) -> bool {
        self.finish(id, OperationStatus::Failed, Some(error.into()))
            .await
    }

    /// Terminal transition for bodies that observed their cancellation token.
    pub async fn complete_cancelled(&self, id: &str) -> bool {
        self.finish(id, OperationStatus::Cancelled, None).await
    }

    /// Move to a terminal state exactly once. Returns whether a transition happened.
    async fn finish(&self, id: &str, status: OperationStatus, error: Option<String>) -> bool {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(entry) = state.operations.get_mut(id) else {
            debug!(operation_id = id, "Ignoring transition for unknown operation");
            return false;
        };
        if entry.operation.status.is_terminal() {
            debug!(
                operation_id = id,
                current = ?entry.operation.status,
                requested = ?status,
                "Operation already terminal"
            );
            return false;
        }

        entry.operation.status = status;
        entry.operation.error = error;
        entry.operation.finished_at = Some(Utc::now());
        entry.status_tx.send_replace(status);

        match status {
            OperationStatus::Failed => warn!(
                operation_id = id,
                error = entry.operation.error.as_deref().unwrap_or_default(),
                "Operation failed"
            ),
            _ => debug!(operation_id = id, status = ?status, "Operation finished"),
        }

        state.terminal_order.push_back(id.to_string());
        self.metrics.record_finished(status);

        let evicted = state.evict(&self.retention);
        if evicted > 0 {
            self.metrics.operations_evicted.add(evicted as u64);
            debug!(evicted, "Evicted terminal operations");
        }
        true
    }

    /// Record that `message_id` is owned by `operation_id`, replacing any
    /// previous owner. The previous owner is not cancelled.
    pub async fn associate(&self, message_id: impl Into<String>, operation_id: impl Into<String>) {
        let message_id = message_id.into();
        let operation_id = operation_id.into();
        let mut state = self.state.write().await;
        state
            .owned_messages
            .entry(operation_id.clone())
            .or_default()
            .push(message_id.clone());
        if let Some(previous) = state
            .associations
            .insert(message_id.clone(), operation_id.clone())
            && previous != operation_id
        {
            debug!(
                message_id = %message_id,
                previous = %previous,
                operation_id = %operation_id,
                "Message association overwritten"
            );
        }
    }

    /// True only if the message's current operation exists, matches
    /// `predicate` and is still running.
    pub async fn is_running<F>(&self, predicate: F, message_id: &str) -> bool
    where
        F: Fn(OperationKind) -> bool,
    {
        let state = self.state.read().await;
        state
            .associations
            .get(message_id)
            .and_then(|id| state.operations.get(id))
            .is_some_and(|entry| {
                entry.operation.is_running() && predicate(entry.operation.kind)
            })
    }

    /// The subset of `message_ids` whose owning operation is still running.
    pub async fn running_messages<'a, I>(&self, message_ids: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let state = self.state.read().await;
        message_ids
            .into_iter()
            .filter(|message_id| {
                state
                    .associations
                    .get(*message_id)
                    .and_then(|id| state.operations.get(id))
                    .is_some_and(|entry| entry.operation.is_running())
            })
            .map(str::to_string)
            .collect()
    }

    /// Signal the operation's token. Status is left to the operation body.
    pub async fn cancel(&self, id: &str) -> bool {
        let state = self.state.read().await;
        match state.operations.get(id) {
            Some(entry) if entry.operation.is_running() => {
                info!(operation_id = id, "Cancelling operation");
                entry.operation.cancellation_token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every running operation matching `filter`. Returns how many were signalled.
    pub async fn cancel_where<F>(&self, filter: F) -> usize
    where
        F: Fn(&Operation) -> bool,
    {
        let state = self.state.read().await;
        let mut cancelled = 0;
        for entry in state.operations.values() {
            if entry.operation.is_running() && filter(&entry.operation) {
                entry.operation.cancellation_token.cancel();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(cancelled, "Cancelled matching operations");
        }
        cancelled
    }

    pub async fn get(&self, id: &str) -> Option<Operation> {
        let state = self.state.read().await;
        state.operations.get(id).map(|entry| entry.operation.clone())
    }

    pub async fn status(&self, id: &str) -> Option<OperationStatus> {
        let state = self.state.read().await;
        state.operations.get(id).map(|entry| entry.operation.status)
    }

    pub async fn operation_for_message(&self, message_id: &str) -> Option<OperationId> {
        self.state.read().await.associations.get(message_id).cloned()
    }

    pub async fn running<F>(&self, filter: F) -> Vec<Operation>
    where
        F: Fn(&Operation) -> bool,
    {
        let state = self.state.read().await;
        let mut running: Vec<Operation> = state
            .operations
            .values()
            .filter(|entry| entry.operation.is_running() && filter(&entry.operation))
            .map(|entry| entry.operation.clone())
            .collect();
        running.sort_by_key(|op| op.created_at);
        running
    }

    pub async fn running_count(&self) -> usize {
        let state = self.state.read().await;
        state
            .operations
            .values()
            .filter(|entry| entry.operation.is_running())
            .count()
    }

    /// Number of operations currently retained, running or terminal.
    pub async fn len(&self) -> usize {
        self.state.read().await.operations.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.operations.is_empty()
    }

    /// Wait until the operation reaches a terminal state.
    ///
    /// Returns `None` for unknown ids.
    pub async fn wait(&self, id: &str) -> Option<OperationStatus> {
        let mut rx = {
            let state = self.state.read().await;
            state.operations.get(id)?.status_tx.subscribe()
        };
        let status = rx.wait_for(|status| status.is_terminal()).await.ok()?;
        Some(*status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationContext;
    use std::time::Duration;

    fn spec(kind: OperationKind) -> OperationSpec {
        OperationSpec::new(kind, OperationContext::agent("agent-1").with_topic("topic-1"))
    }

    #[tokio::test]
    async fn test_start_is_running() {
        let registry = OperationRegistry::new();
        let started = registry.start(spec(OperationKind::AgentExecution)).await;

        let op = registry.get(&started.operation_id).await.unwrap();
        assert_eq!(op.status, OperationStatus::Running);
        assert_eq!(op.label, "agentExecution");
        assert!(!started.cancellation_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let registry = OperationRegistry::new();
        let started = registry.start(spec(OperationKind::AgentExecution)).await;
        let id = &started.operation_id;

        assert!(registry.complete(id).await);
        assert!(!registry.complete(id).await);
        assert!(!registry.fail(id, "late failure").await);

        let op = registry.get(id).await.unwrap();
        assert_eq!(op.status, OperationStatus::Completed);
        assert!(op.error.is_none());
        assert_eq!(registry.metrics().operations_completed.get(), 1);
        assert_eq!(registry.metrics().operations_failed.get(), 0);
    }

    #[tokio::test]
    async fn test_fail_records_error() {
        let registry = OperationRegistry::new();
        let started = registry.start(spec(OperationKind::AgentExecution)).await;

        assert!(registry.fail(&started.operation_id, "boom").await);
        assert!(!registry.fail(&started.operation_id, "again").await);

        let op = registry.get(&started.operation_id).await.unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(op.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_unknown_ids_are_noops() {
        let registry = OperationRegistry::new();
        assert!(!registry.complete("missing").await);
        assert!(!registry.fail("missing", "x").await);
        assert!(!registry.cancel("missing").await);
        assert!(registry.get("missing").await.is_none());
        assert!(registry.wait("missing").await.is_none());
        assert!(!registry.is_running(|_| true, "no-message").await);
    }

    #[tokio::test]
    async fn test_associate_overwrites() {
        let registry = OperationRegistry::new();
        let first = registry.start(spec(OperationKind::ToolSearch)).await;
        let second = registry.start(spec(OperationKind::ToolInterpreter)).await;

        registry.associate("msg-1", &first.operation_id).await;
        assert!(registry.is_running(|kind| kind.is_tool(), "msg-1").await);

        registry.associate("msg-1", &second.operation_id).await;
        assert_eq!(
            registry.operation_for_message("msg-1").await.as_deref(),
            Some(second.operation_id.as_str())
        );

        // The replaced operation is neither cancelled nor consulted anymore.
        assert!(!first.cancellation_token.is_cancelled());
        registry.complete(&second.operation_id).await;
        assert!(!registry.is_running(|_| true, "msg-1").await);
        assert_eq!(
            registry.status(&first.operation_id).await,
            Some(OperationStatus::Running)
        );
    }

    #[tokio::test]
    async fn test_is_running_respects_predicate() {
        let registry = OperationRegistry::new();
        let started = registry.start(spec(OperationKind::ToolSearch)).await;
        registry.associate("msg-1", &started.operation_id).await;

        assert!(
            registry
                .is_running(|kind| kind == OperationKind::ToolSearch, "msg-1")
                .await
        );
        assert!(
            !registry
                .is_running(|kind| kind == OperationKind::ToolInterpreter, "msg-1")
                .await
        );
    }

    #[tokio::test]
    async fn test_cancel_signals_without_changing_status() {
        let registry = OperationRegistry::new();
        let started = registry.start(spec(OperationKind::AgentExecution)).await;

        assert!(registry.cancel(&started.operation_id).await);
        assert!(started.cancellation_token.is_cancelled());
        assert_eq!(
            registry.status(&started.operation_id).await,
            Some(OperationStatus::Running)
        );

        assert!(registry.complete_cancelled(&started.operation_id).await);
        assert!(!registry.cancel(&started.operation_id).await);
        assert_eq!(
            registry.status(&started.operation_id).await,
            Some(OperationStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_children() {
        let registry = OperationRegistry::new();
        let parent = registry.start(spec(OperationKind::GroupOrchestration)).await;
        let child = registry
            .start(spec(OperationKind::AgentExecution).parent(parent.operation_id.clone()))
            .await;
        let unrelated = registry.start(spec(OperationKind::AgentExecution)).await;

        registry.cancel(&parent.operation_id).await;

        assert!(child.cancellation_token.is_cancelled());
        assert!(!unrelated.cancellation_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_where() {
        let registry = OperationRegistry::new();
        let a = registry.start(spec(OperationKind::ToolSearch)).await;
        let b = registry.start(spec(OperationKind::AgentExecution)).await;

        let count = registry.cancel_where(|op| op.kind.is_tool()).await;
        assert_eq!(count, 1);
        assert!(a.cancellation_token.is_cancelled());
        assert!(!b.cancellation_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_resolves_on_terminal() {
        let registry = OperationRegistry::new();
        let started = registry.start(spec(OperationKind::AgentExecution)).await;

        let waiter = {
            let registry = registry.clone();
            let id = started.operation_id.clone();
            tokio::spawn(async move { registry.wait(&id).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.fail(&started.operation_id, "provider down").await;

        let status = waiter.await.unwrap();
        assert_eq!(status, Some(OperationStatus::Failed));

        // Already terminal: resolves immediately.
        assert_eq!(
            registry.wait(&started.operation_id).await,
            Some(OperationStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest_terminal() {
        let registry =
            OperationRegistry::new().with_retention(RetentionPolicy::bounded(2));

        let running = registry.start(spec(OperationKind::AgentExecution)).await;
        let mut finished = Vec::new();
        for i in 0..3 {
            let op = registry.start(spec(OperationKind::ToolSearch)).await;
            registry
                .associate(format!("msg-{i}"), &op.operation_id)
                .await;
            registry.complete(&op.operation_id).await;
            finished.push(op.operation_id);
        }

        assert!(registry.get(&finished[0]).await.is_none());
        assert!(registry.operation_for_message("msg-0").await.is_none());
        assert!(registry.get(&finished[1]).await.is_some());
        assert!(registry.get(&finished[2]).await.is_some());
        assert!(registry.get(&running.operation_id).await.is_some());
        assert_eq!(registry.len().await, 3);
        assert_eq!(registry.metrics().operations_evicted.get(), 1);
    }

    #[tokio::test]
    async fn test_eviction_keeps_reassigned_message() {
        let registry =
            OperationRegistry::new().with_retention(RetentionPolicy::bounded(1));

        let first = registry.start(spec(OperationKind::AgentExecution)).await;
        let second = registry.start(spec(OperationKind::AgentExecution)).await;
        registry.associate("msg-1", &first.operation_id).await;
        registry.associate("msg-2", &first.operation_id).await;
        registry.associate("msg-1", &second.operation_id).await;

        registry.complete(&first.operation_id).await;
        registry.complete(&second.operation_id).await;

        assert!(registry.get(&first.operation_id).await.is_none());
        assert!(registry.operation_for_message("msg-2").await.is_none());
        assert_eq!(
            registry.operation_for_message("msg-1").await.as_deref(),
            Some(second.operation_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_running_messages() {
        let registry = OperationRegistry::new();
        let live = registry.start(spec(OperationKind::AgentExecution)).await;
        let done = registry.start(spec(OperationKind::AgentExecution)).await;
        registry.associate("msg-live", &live.operation_id).await;
        registry.associate("msg-done", &done.operation_id).await;
        registry.complete(&done.operation_id).await;

        let running = registry
            .running_messages(["msg-live", "msg-done", "msg-unknown"])
            .await;
        assert_eq!(running.len(), 1);
        assert!(running.contains("msg-live"));
    }

    #[tokio::test]
    async fn test_running_listing() {
        let registry = OperationRegistry::new();
        let a = registry.start(spec(OperationKind::AgentExecution)).await;
        let b = registry.start(spec(OperationKind::ToolSearch)).await;
        registry.complete(&b.operation_id).await;

        let running = registry.running(|_| true).await;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, a.operation_id);
        assert_eq!(registry.running_count().await, 1);
    }
}
