//! Supervisor decisions and their parsing.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{Error, Result};

/// What the supervisor wants to happen next in a group conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GroupDecision {
    /// Stop the conversation loop.
    Finish {
        #[serde(default)]
        skip_call_supervisor: bool,
    },
    /// Every listed member responds, concurrently.
    Broadcast {
        agent_ids: Vec<String>,
        #[serde(default)]
        instruction: String,
        #[serde(default)]
        skip_call_supervisor: bool,
    },
    /// One member responds.
    Speak {
        agent_id: String,
        #[serde(default)]
        instruction: String,
        #[serde(default)]
        skip_call_supervisor: bool,
    },
    /// Hand the topic to one member for subsequent turns.
    Delegate {
        agent_id: String,
        #[serde(default)]
        reason: String,
        #[serde(default)]
        skip_call_supervisor: bool,
    },
}

impl GroupDecision {
    pub fn finish() -> Self {
        Self::Finish {
            skip_call_supervisor: false,
        }
    }

    pub fn broadcast(
        agent_ids: impl IntoIterator<Item = impl Into<String>>,
        instruction: impl Into<String>,
    ) -> Self {
        Self::Broadcast {
            agent_ids: agent_ids.into_iter().map(Into::into).collect(),
            instruction: instruction.into(),
            skip_call_supervisor: false,
        }
    }

    pub fn speak(agent_id: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self::Speak {
            agent_id: agent_id.into(),
            instruction: instruction.into(),
            skip_call_supervisor: false,
        }
    }

    pub fn delegate(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delegate {
            agent_id: agent_id.into(),
            reason: reason.into(),
            skip_call_supervisor: false,
        }
    }

    pub fn with_skip_call_supervisor(mut self, skip: bool) -> Self {
        match &mut self {
            Self::Finish {
                skip_call_supervisor,
            }
            | Self::Broadcast {
                skip_call_supervisor,
                ..
            }
            | Self::Speak {
                skip_call_supervisor,
                ..
            }
            | Self::Delegate {
                skip_call_supervisor,
                ..
            } => *skip_call_supervisor = skip,
        }
        self
    }

    pub fn skip_call_supervisor(&self) -> bool {
        match self {
            Self::Finish {
                skip_call_supervisor,
            }
            | Self::Broadcast {
                skip_call_supervisor,
                ..
            }
            | Self::Speak {
                skip_call_supervisor,
                ..
            }
            | Self::Delegate {
                skip_call_supervisor,
                ..
            } => *skip_call_supervisor,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Finish { .. } => "finish",
            Self::Broadcast { .. } => "broadcast",
            Self::Speak { .. } => "speak",
            Self::Delegate { .. } => "delegate",
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Self::Finish { .. })
    }

    /// Members this decision addresses, in order.
    pub fn target_agent_ids(&self) -> Vec<&str> {
        match self {
            Self::Finish { .. } => Vec::new(),
            Self::Broadcast { agent_ids, .. } => agent_ids.iter().map(String::as_str).collect(),
            Self::Speak { agent_id, .. } | Self::Delegate { agent_id, .. } => vec![agent_id.as_str()],
        }
    }

    /// Instruction passed to dispatched members, if any.
    pub fn instruction(&self) -> Option<&str> {
        match self {
            Self::Broadcast { instruction, .. } | Self::Speak { instruction, .. } => {
                Some(instruction.as_str()).filter(|s| !s.trim().is_empty())
            }
            _ => None,
        }
    }

    /// Drop broadcast targets that are not group members and return them.
    ///
    /// Speak and delegate are left alone; [`validate`](Self::validate)
    /// rejects those when their single target is unknown.
    pub fn retain_members(&mut self, members: &[String]) -> Vec<String> {
        let Self::Broadcast { agent_ids, .. } = self else {
            return Vec::new();
        };
        let (kept, rejected): (Vec<String>, Vec<String>) = std::mem::take(agent_ids)
            .into_iter()
            .partition(|id| members.contains(id));
        *agent_ids = kept;
        rejected
    }

    /// Every addressed agent must be a group member, and a broadcast must
    /// address at least one.
    pub fn validate(&self, members: &[String]) -> Result<()> {
        if let Self::Broadcast { agent_ids, .. } = self
            && agent_ids.is_empty()
        {
            return Err(Error::InvalidDecision(
                "broadcast without agent ids".into(),
            ));
        }
        for id in self.target_agent_ids() {
            if !members.iter().any(|member| member == id) {
                return Err(Error::InvalidDecision(format!(
                    "{} targets unknown member '{}'",
                    self.kind(),
                    id
                )));
            }
        }
        Ok(())
    }

    /// Extract a decision from free-form supervisor output.
    ///
    /// Accepts bare JSON, a fenced ```json block, or the outermost `{...}`
    /// span of the text.
    pub fn from_supervisor_output(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if let Ok(decision) = serde_json::from_str::<Self>(trimmed) {
            return Ok(decision);
        }

        if let Some(captures) = fenced_json().captures(trimmed)
            && let Some(body) = captures.get(1)
            && let Ok(decision) = serde_json::from_str::<Self>(body.as_str())
        {
            return Ok(decision);
        }

        if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
            && start < end
        {
            return serde_json::from_str::<Self>(&trimmed[start..=end])
                .map_err(|e| Error::InvalidDecision(e.to_string()));
        }

        Err(Error::InvalidDecision(
            "no decision object in supervisor output".into(),
        ))
    }
}

fn fenced_json() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fenced json regex")
    })
}

/// JSON schema describing [`GroupDecision`], shown to the supervisor.
pub fn decision_schema() -> Value {
    json!({
        "type": "object",
        "oneOf": [
            {
                "properties": {
                    "type": {"const": "finish"},
                    "skipCallSupervisor": {"type": "boolean"}
                },
                "required": ["type"]
            },
            {
                "properties": {
                    "type": {"const": "broadcast"},
                    "agentIds": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "instruction": {"type": "string"},
                    "skipCallSupervisor": {"type": "boolean"}
                },
                "required": ["type", "agentIds", "instruction"]
            },
            {
                "properties": {
                    "type": {"const": "speak"},
                    "agentId": {"type": "string"},
                    "instruction": {"type": "string"},
                    "skipCallSupervisor": {"type": "boolean"}
                },
                "required": ["type", "agentId", "instruction"]
            },
            {
                "properties": {
                    "type": {"const": "delegate"},
                    "agentId": {"type": "string"},
                    "reason": {"type": "string"},
                    "skipCallSupervisor": {"type": "boolean"}
                },
                "required": ["type", "agentId", "reason"]
            }
        ]
    })
}
