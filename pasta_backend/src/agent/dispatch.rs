use std::sync::Arc;

use super::{
    AgentSpec, GenerationRequest, Purpose, TextGenerator, FINANCE_AGENT, TEAM_LEADER_AGENT,
    WEB_SEARCH_AGENT,
};
use crate::prompt::AgentInstructionSet;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("the {0} agent needs a composed instruction set")]
    MissingInstructions(Purpose),
    #[error("query is empty")]
    EmptyQuery,
    #[error("{agent} call failed: {message}")]
    Generation { agent: String, message: String },
}

/// Single entry point for every agent the service exposes.
#[derive(Clone)]
pub struct Dispatcher {
    generator: Arc<dyn TextGenerator>,
}

impl Dispatcher {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Run `query` through the agent for `purpose`.
    ///
    /// Fitness and task agents must be given `instructions`; the others ignore
    /// any supplied set and use their built-in directives. No retries.
    pub async fn dispatch(
        &self,
        purpose: Purpose,
        query: &str,
        instructions: Option<&AgentInstructionSet>,
    ) -> Result<String, DispatchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DispatchError::EmptyQuery);
        }

        tracing::info!(%purpose, "Dispatching query");
        if purpose == Purpose::MultiAgent {
            return self.run_team(query).await;
        }

        let agent = AgentSpec::for_purpose(purpose);
        if purpose.requires_instructions() {
            let instructions =
                instructions.ok_or(DispatchError::MissingInstructions(purpose))?;
            self.run(agent, instructions.directives(), query.to_string())
                .await
        } else {
            self.run(agent, agent.instructions, query.to_string()).await
        }
    }

    async fn run<S: AsRef<str>>(
        &self,
        agent: &AgentSpec,
        directives: &[S],
        query: String,
    ) -> Result<String, DispatchError> {
        let request = GenerationRequest {
            agent: agent.name.to_string(),
            toolset: agent.toolset,
            system_prompt: system_prompt(agent, directives),
            query,
        };
        let text = self.generator.generate(request).await.map_err(|e| {
            tracing::error!(agent = agent.name, "Generation failed: {:#}", e);
            DispatchError::Generation {
                agent: agent.name.to_string(),
                message: format!("{:#}", e),
            }
        })?;
        tracing::debug!(agent = agent.name, chars = text.len(), "Agent responded");
        Ok(text)
    }

    /// Members answer concurrently, then the leader merges their answers.
    async fn run_team(&self, query: &str) -> Result<String, DispatchError> {
        let (search, finance) = tokio::try_join!(
            self.run(
                &WEB_SEARCH_AGENT,
                WEB_SEARCH_AGENT.instructions,
                query.to_string()
            ),
            self.run(&FINANCE_AGENT, FINANCE_AGENT.instructions, query.to_string()),
        )?;

        let briefing = format!(
            "{query}\n\n{} answered:\n{search}\n\n{} answered:\n{finance}",
            WEB_SEARCH_AGENT.name, FINANCE_AGENT.name
        );
        self.run(&TEAM_LEADER_AGENT, TEAM_LEADER_AGENT.instructions, briefing)
            .await
    }
}

/// Name, role, then one bullet per directive.
pub fn system_prompt<S: AsRef<str>>(agent: &AgentSpec, directives: &[S]) -> String {
    let mut prompt = format!("You are {}.", agent.name);
    if let Some(role) = agent.role {
        prompt.push_str(&format!("\nYour role: {}", role));
    }
    if !directives.is_empty() {
        prompt.push_str("\n\nInstructions:");
        for directive in directives {
            prompt.push_str("\n- ");
            prompt.push_str(directive.as_ref());
        }
    }
    if agent.markdown {
        prompt.push_str("\n\nFormat your answer in markdown.");
    }
    prompt
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agent::Toolset;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests and answers from a script keyed by agent name.
    #[derive(Default)]
    pub(crate) struct ScriptedGenerator {
        pub(crate) requests: Mutex<Vec<GenerationRequest>>,
        pub(crate) replies: Vec<(&'static str, Result<String, String>)>,
    }

    impl ScriptedGenerator {
        pub(crate) fn replying(replies: Vec<(&'static str, Result<String, String>)>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                replies,
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: GenerationRequest) -> Result<String> {
            let reply = self
                .replies
                .iter()
                .find(|(agent, _)| *agent == request.agent)
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| Ok(format!("{} says hi", request.agent)));
            self.requests.lock().unwrap().push(request);
            reply.map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn dispatcher(generator: Arc<ScriptedGenerator>) -> Dispatcher {
        Dispatcher::new(generator)
    }

    #[tokio::test]
    async fn fitness_without_instructions_is_rejected() {
        let generator = Arc::new(ScriptedGenerator::default());
        let err = dispatcher(generator.clone())
            .dispatch(Purpose::Fitness, "leg day?", None)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::MissingInstructions(Purpose::Fitness));
        assert!(generator.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fitness_uses_supplied_instructions_and_web_search_toolset() {
        let generator = Arc::new(ScriptedGenerator::replying(vec![(
            "Fitness AI Agent",
            Ok("Try squats.".to_string()),
        )]));
        let instructions = AgentInstructionSet::new(["Be brief", "Conversation so far: "]);

        let text = dispatcher(generator.clone())
            .dispatch(Purpose::Fitness, "leg day?", Some(&instructions))
            .await
            .unwrap();
        assert_eq!(text, "Try squats.");

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].toolset, Toolset::WebSearch);
        assert_eq!(requests[0].query, "leg day?");
        assert!(requests[0].system_prompt.contains("- Be brief"));
        assert!(requests[0]
            .system_prompt
            .contains("Provide fitness and nutrition advice for the user."));
    }

    #[tokio::test]
    async fn finance_ignores_caller_instructions() {
        let generator = Arc::new(ScriptedGenerator::default());
        let foreign = AgentInstructionSet::new(["Speak like a pirate"]);

        dispatcher(generator.clone())
            .dispatch(Purpose::Finance, "AAPL outlook", Some(&foreign))
            .await
            .unwrap();

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].toolset, Toolset::FinanceData);
        assert!(!requests[0].system_prompt.contains("pirate"));
        assert!(requests[0]
            .system_prompt
            .contains("- Give financial advice like investment plans, stock prices, etc."));
    }

    #[tokio::test]
    async fn generation_failure_names_the_agent() {
        let generator = Arc::new(ScriptedGenerator::replying(vec![(
            "Web search Agent",
            Err("connection refused".to_string()),
        )]));

        let err = dispatcher(generator)
            .dispatch(Purpose::WebSearch, "rust news", None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::Generation {
                agent: "Web search Agent".to_string(),
                message: "connection refused".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn team_leader_sees_both_member_answers() {
        let generator = Arc::new(ScriptedGenerator::replying(vec![
            ("Web search Agent", Ok("News: chips demand up".to_string())),
            ("Finance AI Agent", Ok("NVDA: 120 USD".to_string())),
            ("Team Leader Agent", Ok("Combined view".to_string())),
        ]));

        let text = dispatcher(generator.clone())
            .dispatch(Purpose::MultiAgent, "NVDA?", None)
            .await
            .unwrap();
        assert_eq!(text, "Combined view");

        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        let leader = requests
            .iter()
            .find(|r| r.agent == "Team Leader Agent")
            .unwrap();
        assert!(leader.query.starts_with("NVDA?"));
        assert!(leader.query.contains("News: chips demand up"));
        assert!(leader.query.contains("NVDA: 120 USD"));
    }

    #[tokio::test]
    async fn team_fails_when_a_member_fails() {
        let generator = Arc::new(ScriptedGenerator::replying(vec![(
            "Finance AI Agent",
            Err("upstream 500".to_string()),
        )]));

        let err = dispatcher(generator.clone())
            .dispatch(Purpose::MultiAgent, "NVDA?", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Generation { ref agent, .. } if agent == "Finance AI Agent"));
        assert!(generator
            .requests
            .lock()
            .unwrap()
            .iter()
            .all(|r| r.agent != "Team Leader Agent"));
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let generator = Arc::new(ScriptedGenerator::default());
        let err = dispatcher(generator)
            .dispatch(Purpose::Finance, "   ", None)
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::EmptyQuery);
    }

    #[test]
    fn system_prompt_layout() {
        let prompt = system_prompt(&WEB_SEARCH_AGENT, WEB_SEARCH_AGENT.instructions);
        assert_eq!(
            prompt,
            "You are Web search Agent.\nYour role: search the web for information\n\nInstructions:\n- Always include sources\n\nFormat your answer in markdown."
        );
    }
}
