//! Retention of finished operations.

/// Default number of terminal operations kept for diagnostics.
pub const DEFAULT_MAX_TERMINAL_OPERATIONS: usize = 1024;

/// Bounds how many terminal operations the registry keeps.
///
/// Oldest-finished operations are evicted first, together with any message
/// association still pointing at them. Running operations are never evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_terminal_operations: usize,
}

impl RetentionPolicy {
    pub fn bounded(max_terminal_operations: usize) -> Self {
        Self {
            max_terminal_operations,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            max_terminal_operations: usize::MAX,
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::bounded(DEFAULT_MAX_TERMINAL_OPERATIONS)
    }
}
