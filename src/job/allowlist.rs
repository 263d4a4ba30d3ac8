//! Closed sets of model and agent identifiers accepted by the validator.
//!
//! Both sets mirror what the benchmark executor supports. Adding an
//! identifier means adding a variant here and nowhere else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Model identifiers the executor may be asked to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "anthropic/claude-haiku-4-5")]
    ClaudeHaiku45,
    #[serde(rename = "anthropic/claude-sonnet-4-5")]
    ClaudeSonnet45,
    #[serde(rename = "anthropic/claude-opus-4-1")]
    ClaudeOpus41,
}

impl ModelId {
    /// Every allowed model identifier.
    pub const ALL: [ModelId; 3] = [
        ModelId::ClaudeHaiku45,
        ModelId::ClaudeSonnet45,
        ModelId::ClaudeOpus41,
    ];

    /// Returns the identifier as passed to the executor.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::ClaudeHaiku45 => "anthropic/claude-haiku-4-5",
            ModelId::ClaudeSonnet45 => "anthropic/claude-sonnet-4-5",
            ModelId::ClaudeOpus41 => "anthropic/claude-opus-4-1",
        }
    }

    fn allowed() -> String {
        Self::ALL.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic/claude-haiku-4-5" => Ok(ModelId::ClaudeHaiku45),
            "anthropic/claude-sonnet-4-5" => Ok(ModelId::ClaudeSonnet45),
            "anthropic/claude-opus-4-1" => Ok(ModelId::ClaudeOpus41),
            other => Err(ValidationError::NotAllowed {
                field: "model_id",
                value: other.to_string(),
                allowed: Self::allowed(),
            }),
        }
    }
}

/// Agent identifiers the executor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentId {
    ClaudeCode,
    Aider,
    OpenHands,
}

impl AgentId {
    /// Every allowed agent identifier.
    pub const ALL: [AgentId; 3] = [AgentId::ClaudeCode, AgentId::Aider, AgentId::OpenHands];

    /// Returns the identifier as passed to the executor.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::ClaudeCode => "claude-code",
            AgentId::Aider => "aider",
            AgentId::OpenHands => "open-hands",
        }
    }

    fn allowed() -> String {
        Self::ALL.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude-code" => Ok(AgentId::ClaudeCode),
            "aider" => Ok(AgentId::Aider),
            "open-hands" => Ok(AgentId::OpenHands),
            other => Err(ValidationError::NotAllowed {
                field: "agent_id",
                value: other.to_string(),
                allowed: Self::allowed(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_round_trips_through_str() {
        for model in ModelId::ALL {
            assert_eq!(model.as_str().parse::<ModelId>().unwrap(), model);
        }
    }

    #[test]
    fn test_agent_round_trips_through_str() {
        for agent in AgentId::ALL {
            assert_eq!(agent.as_str().parse::<AgentId>().unwrap(), agent);
        }
    }

    #[test]
    fn test_unknown_model_lists_allowed_set() {
        let err = "openai/gpt-4".parse::<ModelId>().unwrap_err();
        match err {
            ValidationError::NotAllowed {
                field,
                value,
                allowed,
            } => {
                assert_eq!(field, "model_id");
                assert_eq!(value, "openai/gpt-4");
                assert!(allowed.contains("anthropic/claude-haiku-4-5"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert!("Claude-Code".parse::<AgentId>().is_err());
        assert!(" aider".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_serde_uses_executor_names() {
        let json = serde_json::to_string(&AgentId::OpenHands).unwrap();
        assert_eq!(json, "\"open-hands\"");
        let model: ModelId = serde_json::from_str("\"anthropic/claude-opus-4-1\"").unwrap();
        assert_eq!(model, ModelId::ClaudeOpus41);
    }
}
