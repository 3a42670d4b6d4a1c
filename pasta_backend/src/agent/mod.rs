//! Agent definitions and the generation seam.
//!
//! An agent is a fixed role plus instruction set bound to an optional toolset.
//! The actual inference (and any tool use) happens in an external service reached
//! through [`TextGenerator`]; this crate only decides which agent speaks and what
//! it is told.

pub mod dispatch;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use dispatch::{DispatchError, Dispatcher};

/// What the caller wants an agent to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    WebSearch,
    Finance,
    Fitness,
    TaskFill,
    /// Web search and finance agents answering as one team.
    MultiAgent,
}

impl Purpose {
    /// Fitness and task agents are steered per user; the rest use built-in instructions.
    pub fn requires_instructions(self) -> bool {
        matches!(self, Purpose::Fitness | Purpose::TaskFill)
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Purpose::WebSearch => "web-search",
            Purpose::Finance => "finance",
            Purpose::Fitness => "fitness",
            Purpose::TaskFill => "task-fill",
            Purpose::MultiAgent => "multi-agent",
        };
        f.write_str(label)
    }
}

/// External capability an agent may invoke during generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toolset {
    None,
    WebSearch,
    FinanceData,
}

/// Static description of one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSpec {
    pub name: &'static str,
    pub role: Option<&'static str>,
    pub toolset: Toolset,
    /// Built-in directives. Empty for agents whose instructions are composed per request.
    pub instructions: &'static [&'static str],
    pub markdown: bool,
}

pub const WEB_SEARCH_AGENT: AgentSpec = AgentSpec {
    name: "Web search Agent",
    role: Some("search the web for information"),
    toolset: Toolset::WebSearch,
    instructions: &["Always include sources"],
    markdown: true,
};

pub const FINANCE_AGENT: AgentSpec = AgentSpec {
    name: "Finance AI Agent",
    role: None,
    toolset: Toolset::FinanceData,
    instructions: &[
        "Give answer in the form of chat messages",
        "Give financial advice like investment plans, stock prices, etc.",
    ],
    markdown: false,
};

pub const FITNESS_AGENT: AgentSpec = AgentSpec {
    name: "Fitness AI Agent",
    role: Some("Provide fitness and nutrition advice for the user."),
    toolset: Toolset::WebSearch,
    instructions: &[],
    markdown: false,
};

pub const TASK_AGENT: AgentSpec = AgentSpec {
    name: "Task AI Agent",
    role: Some("Fill in task details for the user's task manager."),
    toolset: Toolset::None,
    instructions: &[],
    markdown: false,
};

pub const TEAM_LEADER_AGENT: AgentSpec = AgentSpec {
    name: "Team Leader Agent",
    role: Some("Combine the findings of the web search and finance agents."),
    toolset: Toolset::None,
    instructions: &[
        "Always include sources",
        "Give answer in the form of chat messages",
    ],
    markdown: true,
};

impl AgentSpec {
    pub fn for_purpose(purpose: Purpose) -> &'static AgentSpec {
        match purpose {
            Purpose::WebSearch => &WEB_SEARCH_AGENT,
            Purpose::Finance => &FINANCE_AGENT,
            Purpose::Fitness => &FITNESS_AGENT,
            Purpose::TaskFill => &TASK_AGENT,
            Purpose::MultiAgent => &TEAM_LEADER_AGENT,
        }
    }
}

/// One fully-prepared call to the external model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub agent: String,
    pub toolset: Toolset,
    pub system_prompt: String,
    pub query: String,
}

/// Prompt in, text out. Implemented by [`crate::llm_client::LlmClient`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_personalized_purposes_require_instructions() {
        assert!(Purpose::Fitness.requires_instructions());
        assert!(Purpose::TaskFill.requires_instructions());
        assert!(!Purpose::Finance.requires_instructions());
        assert!(!Purpose::WebSearch.requires_instructions());
        assert!(!Purpose::MultiAgent.requires_instructions());
    }

    #[test]
    fn built_in_agents_carry_their_toolsets() {
        assert_eq!(AgentSpec::for_purpose(Purpose::WebSearch).toolset, Toolset::WebSearch);
        assert_eq!(AgentSpec::for_purpose(Purpose::Finance).toolset, Toolset::FinanceData);
        assert_eq!(AgentSpec::for_purpose(Purpose::TaskFill).toolset, Toolset::None);
        assert_eq!(
            AgentSpec::for_purpose(Purpose::Finance).instructions,
            &[
                "Give answer in the form of chat messages",
                "Give financial advice like investment plans, stock prices, etc.",
            ]
        );
    }

    #[test]
    fn purpose_display_matches_log_labels() {
        assert_eq!(Purpose::TaskFill.to_string(), "task-fill");
        assert_eq!(Purpose::MultiAgent.to_string(), "multi-agent");
    }
}
