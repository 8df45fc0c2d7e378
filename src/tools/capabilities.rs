//! Model and environment capability flags consulted during resolution.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Where the engine is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionEnvironment {
    /// Desktop runtime; local processes can be spawned.
    Desktop,
    /// Browser context.
    #[default]
    Web,
    /// Headless server.
    Server,
}

impl ExecutionEnvironment {
    pub fn is_desktop(&self) -> bool {
        matches!(self, Self::Desktop)
    }
}

impl std::str::FromStr for ExecutionEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "desktop" => Ok(Self::Desktop),
            "web" | "browser" => Ok(Self::Web),
            "server" => Ok(Self::Server),
            other => Err(format!("unknown execution environment: {}", other)),
        }
    }
}

/// Which models may be offered function calling.
///
/// Entries match either a bare model id (`gpt-4o`) or `provider/model`.
#[derive(Debug, Clone, Default)]
pub enum FunctionCalling {
    /// No model gets tools.
    None,
    /// Every model gets tools.
    #[default]
    All,
    /// Only the listed models get tools.
    Only(HashSet<String>),
    /// Every model except the listed ones gets tools.
    Except(HashSet<String>),
}

impl FunctionCalling {
    pub fn all() -> Self {
        Self::All
    }

    pub fn none() -> Self {
        Self::None
    }

    pub fn only(models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Only(models.into_iter().map(Into::into).collect())
    }

    pub fn except(models: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Except(models.into_iter().map(Into::into).collect())
    }

    fn matches(set: &HashSet<String>, model: &str, provider: &str) -> bool {
        set.contains(model) || set.contains(&format!("{}/{}", provider, model))
    }

    #[inline]
    pub fn is_allowed(&self, model: &str, provider: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Only(allowed) => Self::matches(allowed, model, provider),
            Self::Except(denied) => !Self::matches(denied, model, provider),
        }
    }
}

/// Capability flags for one resolution or engineering pass.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub environment: ExecutionEnvironment,
    pub function_calling: FunctionCalling,
}

impl Capabilities {
    pub fn new(environment: ExecutionEnvironment) -> Self {
        Self {
            environment,
            function_calling: FunctionCalling::All,
        }
    }

    pub fn desktop() -> Self {
        Self::new(ExecutionEnvironment::Desktop)
    }

    pub fn web() -> Self {
        Self::new(ExecutionEnvironment::Web)
    }

    pub fn with_function_calling(mut self, function_calling: FunctionCalling) -> Self {
        self.function_calling = function_calling;
        self
    }

    pub fn can_use_function_calling(&self, model: &str, provider: &str) -> bool {
        self.function_calling.is_allowed(model, provider)
    }
}
