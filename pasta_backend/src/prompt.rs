//! Personality-aware instruction sets for the fitness and task agents.

use serde::Serialize;

use crate::history::ChatHistory;
use crate::profile::{format_score, PersonalityProfile, Trait};

pub const FITNESS_POLICY: &[&str] = &[
    "Give calories of the food items",
    "Provide Fitness advices like exercises",
    "Give nutritional advice if the user asks for it like diet plans.",
    "Give answers in the form of chat messages",
    "Adapt your tone, motivation style and recommendations to the user's personality scores.",
];

pub const TASK_POLICY: &[&str] = &[
    "Turn the user's request into a single task for their task manager.",
    "Respond with exactly one JSON object and nothing else: no prose, no markdown fences.",
    "The JSON object must have the keys taskName, taskDescription, taskCategory, taskPriority and subTasks.",
    "taskCategory must be one of: Personal, Work, Shopping, Health, Other.",
    "taskPriority must be one of: Low, Medium, High.",
    "subTasks must be an array of objects of the form {\"key\": \"<sub-task text>\"}, in the order they should be done.",
    "Use the user's personality scores to decide how finely to break the task into sub-tasks.",
];

/// Ordered directives handed to an agent. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInstructionSet {
    directives: Vec<String>,
}

impl AgentInstructionSet {
    pub fn new<I, S>(directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            directives: directives.into_iter().map(Into::into).collect(),
        }
    }

    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// One sentence naming every trait and its score; absent scores read "N/A".
pub fn personality_context(profile: &PersonalityProfile) -> String {
    let scores = Trait::ALL
        .iter()
        .map(|t| format!("{}: {}", t.label(), format_score(profile.score(*t))))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "The user's Big Five personality scores are {}. Tailor every answer to this personality.",
        scores
    )
}

/// `[personality context, policy..., "Conversation so far: <history>"]`
pub fn compose(
    profile: &PersonalityProfile,
    history: &ChatHistory,
    policy_directives: &[&str],
) -> AgentInstructionSet {
    let mut directives = Vec::with_capacity(policy_directives.len() + 2);
    directives.push(personality_context(profile));
    directives.extend(policy_directives.iter().map(|d| d.to_string()));
    directives.push(format!("Conversation so far: {}", history.render()));
    AgentInstructionSet { directives }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ChatRole, ChatTurn};

    fn turn(role: ChatRole, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
            timestamp: None,
        }
    }

    #[test]
    fn every_subset_of_absent_scores_renders_na() {
        let values = [11.0, 22.0, 33.0, 4.5, 40.0];
        for mask in 0u8..32 {
            let pick = |i: usize| (mask & (1 << i) != 0).then_some(values[i]);
            let profile = PersonalityProfile {
                extraversion: pick(0),
                agreeableness: pick(1),
                conscientiousness: pick(2),
                neuroticism: pick(3),
                openness: pick(4),
            };

            let set = compose(&profile, &ChatHistory::default(), &[]);
            let context = &set.directives()[0];
            for (i, t) in Trait::ALL.iter().enumerate() {
                let expected = match pick(i) {
                    Some(v) => format_score(Some(v)),
                    None => "N/A".to_string(),
                };
                assert!(
                    context.contains(&format!("{}: {}", t.label(), expected)),
                    "mask {mask:05b}: {context}"
                );
            }
        }
    }

    #[test]
    fn directives_are_ordered_context_policy_history() {
        let profile = PersonalityProfile {
            extraversion: Some(30.0),
            ..Default::default()
        };
        let history = ChatHistory::new(vec![
            turn(ChatRole::User, "I want to run a 5k"),
            turn(ChatRole::Assistant, "Start with three runs a week."),
        ]);

        let set = compose(&profile, &history, FITNESS_POLICY);

        assert_eq!(set.len(), FITNESS_POLICY.len() + 2);
        assert!(set.directives()[0].contains("Extraversion: 30"));
        assert_eq!(&set.directives()[1..=FITNESS_POLICY.len()], FITNESS_POLICY);
        assert_eq!(
            set.directives().last().unwrap(),
            "Conversation so far: User: I want to run a 5k\nAssistant: Start with three runs a week."
        );
    }

    #[test]
    fn compose_is_deterministic() {
        let profile = PersonalityProfile {
            neuroticism: Some(12.0),
            ..Default::default()
        };
        let history = ChatHistory::new(vec![turn(ChatRole::User, "buy milk")]);
        assert_eq!(
            compose(&profile, &history, TASK_POLICY),
            compose(&profile, &history, TASK_POLICY)
        );
    }

    #[test]
    fn empty_history_still_gets_a_conversation_directive() {
        let set = compose(&PersonalityProfile::default(), &ChatHistory::default(), TASK_POLICY);
        assert_eq!(set.directives().last().unwrap(), "Conversation so far: ");
    }

    #[test]
    fn fitness_policy_lists_nutrition_directives() {
        assert_eq!(FITNESS_POLICY[0], "Give calories of the food items");
        assert_eq!(FITNESS_POLICY[3], "Give answers in the form of chat messages");
    }
}
