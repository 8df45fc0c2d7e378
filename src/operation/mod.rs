//! Operation lifecycle and cancellation registry.
//!
//! Every unit of agent or tool work is an [`Operation`]: opened by
//! [`OperationRegistry::start`], finished exactly once by `complete`, `fail` or
//! `complete_cancelled`, and optionally owning one conversation message.

mod registry;
mod retention;
mod types;

pub use registry::OperationRegistry;
pub use retention::{DEFAULT_MAX_TERMINAL_OPERATIONS, RetentionPolicy};
pub use types::{
    Operation, OperationContext, OperationId, OperationKind, OperationScope, OperationSpec,
    OperationStatus, StartedOperation,
};
