//! Metrics collection.
//!
//! Built-in atomic metrics for local tracking of operation lifecycle and
//! group orchestration activity.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::operation::OperationStatus;

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe atomic gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Engine-wide counters shared by the registry and the orchestrator.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub operations_started: Counter,
    pub operations_completed: Counter,
    pub operations_failed: Counter,
    pub operations_cancelled: Counter,
    pub operations_running: Gauge,
    pub operations_evicted: Counter,
    pub inference_calls: Counter,
    pub tool_calls: Counter,
    pub group_rounds: Counter,
    pub supervisor_invocations: Counter,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_started(&self) {
        self.operations_started.inc();
        self.operations_running.inc();
    }

    pub fn record_finished(&self, status: OperationStatus) {
        match status {
            OperationStatus::Completed => self.operations_completed.inc(),
            OperationStatus::Failed => self.operations_failed.inc(),
            OperationStatus::Cancelled => self.operations_cancelled.inc(),
            OperationStatus::Running => return,
        }
        self.operations_running.dec();
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            operations_started: self.operations_started.get(),
            operations_completed: self.operations_completed.get(),
            operations_failed: self.operations_failed.get(),
            operations_cancelled: self.operations_cancelled.get(),
            operations_running: self.operations_running.get(),
            inference_calls: self.inference_calls.get(),
            tool_calls: self.tool_calls.get(),
            group_rounds: self.group_rounds.get(),
            supervisor_invocations: self.supervisor_invocations.get(),
        }
    }
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSummary {
    pub operations_started: u64,
    pub operations_completed: u64,
    pub operations_failed: u64,
    pub operations_cancelled: u64,
    pub operations_running: i64,
    pub inference_calls: u64,
    pub tool_calls: u64,
    pub group_rounds: u64,
    pub supervisor_invocations: u64,
}
