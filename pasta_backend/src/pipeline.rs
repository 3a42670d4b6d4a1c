//! Request flow for the personalized agents:
//! profile + history → instruction set → dispatch → (task) validation.

use std::sync::Arc;

use crate::agent::{DispatchError, Dispatcher, Purpose};
use crate::config::ServiceConfig;
use crate::history::{load_history, ChatHistory};
use crate::profile::{load_profile, PersonalityProfile};
use crate::prompt::{compose, AgentInstructionSet, FITNESS_POLICY, TASK_POLICY};
use crate::store::{DocumentStore, StoreError};
use crate::task::{validate_task_response, TaskParseError, TaskRecord, ValidationMode};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Parse(#[from] TaskParseError),
}

/// Collection names and limits the pipeline reads with.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub personality_collection: String,
    pub fitness_history_collection: String,
    pub task_history_collection: String,
    pub history_limit: usize,
    pub task_validation: ValidationMode,
}

impl From<&ServiceConfig> for PipelineSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            personality_collection: config.personality_collection.clone(),
            fitness_history_collection: config.fitness_history_collection.clone(),
            task_history_collection: config.task_history_collection.clone(),
            history_limit: config.history_limit,
            task_validation: config.task_validation,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    dispatcher: Dispatcher,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        dispatcher: Dispatcher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            settings,
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    async fn context(
        &self,
        user_id: &str,
        history_collection: &str,
    ) -> Result<(PersonalityProfile, ChatHistory), StoreError> {
        let (profile, history) = tokio::try_join!(
            load_profile(
                self.store.as_ref(),
                user_id,
                &self.settings.personality_collection
            ),
            load_history(
                self.store.as_ref(),
                user_id,
                history_collection,
                self.settings.history_limit
            ),
        )?;
        Ok((profile, history))
    }

    /// Instruction set for `purpose` built from the user's stored context.
    pub async fn instructions_for(
        &self,
        purpose: Purpose,
        user_id: &str,
    ) -> Result<AgentInstructionSet, StoreError> {
        let (collection, policy) = match purpose {
            Purpose::TaskFill => (&self.settings.task_history_collection, TASK_POLICY),
            _ => (&self.settings.fitness_history_collection, FITNESS_POLICY),
        };
        let (profile, history) = self.context(user_id, collection).await?;
        tracing::debug!(
            user_id,
            %purpose,
            history_turns = history.len(),
            has_scores = !profile.is_empty(),
            "Composed agent context"
        );
        Ok(compose(&profile, &history, policy))
    }

    pub async fn fitness_reply(&self, user_id: &str, query: &str) -> Result<String, PipelineError> {
        let instructions = self.instructions_for(Purpose::Fitness, user_id).await?;
        Ok(self
            .dispatcher
            .dispatch(Purpose::Fitness, query, Some(&instructions))
            .await?)
    }

    pub async fn fill_task(&self, user_id: &str, query: &str) -> Result<TaskRecord, PipelineError> {
        let instructions = self.instructions_for(Purpose::TaskFill, user_id).await?;
        let raw = self
            .dispatcher
            .dispatch(Purpose::TaskFill, query, Some(&instructions))
            .await?;
        tracing::debug!(user_id, raw = %raw, "Task agent output");

        let record = validate_task_response(&raw, self.settings.task_validation).map_err(|e| {
            tracing::warn!(user_id, "Task agent output rejected: {}", e);
            PipelineError::Parse(e)
        })?;
        if record.category().is_none() || record.priority().is_none() {
            tracing::warn!(
                user_id,
                category = %record.task_category,
                priority = %record.task_priority,
                "Task accepted with values outside the app's choices"
            );
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::dispatch::tests::ScriptedGenerator;
    use crate::store::{CollectionPath, Document, MemoryStore};
    use serde_json::json;

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(
                &CollectionPath::user_collection("u1", "personalityScores").unwrap(),
                Document::new("s", json!({"scoreEXT": 35, "scoreNEU": 8})),
            )
            .await;
        let chats = CollectionPath::user_collection("u1", "fitnessMessages").unwrap();
        for (i, (sender, content)) in [("user", "I want abs"), ("model", "Do planks")]
            .into_iter()
            .enumerate()
        {
            store
                .insert(
                    &chats,
                    Document::new(
                        format!("m{i}"),
                        json!({
                            "sender": sender,
                            "content": content,
                            "timestamp": format!("2025-03-01T09:0{i}:00Z"),
                        }),
                    ),
                )
                .await;
        }
        store
    }

    fn pipeline(
        store: Arc<MemoryStore>,
        generator: Arc<ScriptedGenerator>,
        settings: PipelineSettings,
    ) -> Pipeline {
        Pipeline::new(store, Dispatcher::new(generator), settings)
    }

    #[tokio::test]
    async fn fitness_prompt_embeds_scores_and_history() {
        let generator = Arc::new(ScriptedGenerator::replying(vec![(
            "Fitness AI Agent",
            Ok("Keep planking!".to_string()),
        )]));
        let p = pipeline(seeded_store().await, generator.clone(), PipelineSettings::default());

        let reply = p.fitness_reply("u1", "more core work?").await.unwrap();
        assert_eq!(reply, "Keep planking!");

        let requests = generator.requests.lock().unwrap();
        let prompt = &requests[0].system_prompt;
        assert!(prompt.contains("Extraversion: 35"));
        assert!(prompt.contains("Agreeableness: N/A"));
        assert!(prompt.contains("Give calories of the food items"));
        assert!(prompt.contains("Conversation so far: User: I want abs\nAssistant: Do planks"));
    }

    #[tokio::test]
    async fn unknown_user_still_gets_a_reply() {
        let generator = Arc::new(ScriptedGenerator::default());
        let p = pipeline(seeded_store().await, generator.clone(), PipelineSettings::default());

        p.fitness_reply("stranger", "hi").await.unwrap();
        let requests = generator.requests.lock().unwrap();
        assert!(requests[0].system_prompt.contains("Openness: N/A"));
    }

    #[tokio::test]
    async fn task_reply_is_validated_into_a_record() {
        let generator = Arc::new(ScriptedGenerator::replying(vec![(
            "Task AI Agent",
            Ok(r#"{"taskName":"Buy milk","taskDescription":"Get milk","taskCategory":"Shopping","taskPriority":"Low","subTasks":[{"key":"Go to store"}]}"#.to_string()),
        )]));
        let p = pipeline(seeded_store().await, generator.clone(), PipelineSettings::default());

        let record = p.fill_task("u1", "buy milk tomorrow").await.unwrap();
        assert_eq!(record.task_name, "Buy milk");

        let requests = generator.requests.lock().unwrap();
        assert!(requests[0]
            .system_prompt
            .contains("taskPriority must be one of: Low, Medium, High."));
    }

    #[tokio::test]
    async fn task_parse_failure_is_terminal() {
        let generator = Arc::new(ScriptedGenerator::replying(vec![(
            "Task AI Agent",
            Ok("I'm not sure what you mean.".to_string()),
        )]));
        let p = pipeline(seeded_store().await, generator.clone(), PipelineSettings::default());

        let err = p.fill_task("u1", "???").await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(TaskParseError::Malformed(_))));
        assert_eq!(generator.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn strict_mode_flows_through_settings() {
        let generator = Arc::new(ScriptedGenerator::replying(vec![(
            "Task AI Agent",
            Ok(r#"{"taskName":"a","taskDescription":"b","taskCategory":"Errands","taskPriority":"Low","subTasks":[]}"#.to_string()),
        )]));
        let settings = PipelineSettings {
            task_validation: ValidationMode::Strict,
            ..PipelineSettings::default()
        };
        let p = pipeline(seeded_store().await, generator, settings);

        let err = p.fill_task("u1", "errands").await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(TaskParseError::InvalidFields(_))));
    }

    #[tokio::test]
    async fn invalid_user_id_fails_before_dispatch() {
        let generator = Arc::new(ScriptedGenerator::default());
        let p = pipeline(seeded_store().await, generator.clone(), PipelineSettings::default());

        let err = p.fitness_reply("../admin", "hi").await.unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::InvalidPath(_))));
        assert!(generator.requests.lock().unwrap().is_empty());
    }
}
