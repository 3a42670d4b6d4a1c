//! Big Five trait scores stored under `users/{uid}/personalityScores`.

use serde::Serialize;
use serde_json::Value;

use crate::store::{CollectionPath, CollectionQuery, Document, DocumentStore, StoreError};

/// One of the five personality dimensions, with its stored field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trait {
    Extraversion,
    Agreeableness,
    Conscientiousness,
    Neuroticism,
    Openness,
}

impl Trait {
    pub const ALL: [Trait; 5] = [
        Trait::Extraversion,
        Trait::Agreeableness,
        Trait::Conscientiousness,
        Trait::Neuroticism,
        Trait::Openness,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Trait::Extraversion => "Extraversion",
            Trait::Agreeableness => "Agreeableness",
            Trait::Conscientiousness => "Conscientiousness",
            Trait::Neuroticism => "Neuroticism",
            Trait::Openness => "Openness",
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            Trait::Extraversion => "scoreEXT",
            Trait::Agreeableness => "scoreAGG",
            Trait::Conscientiousness => "scoreCON",
            Trait::Neuroticism => "scoreNEU",
            Trait::Openness => "scoreOPE",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PersonalityProfile {
    pub extraversion: Option<f64>,
    pub agreeableness: Option<f64>,
    pub conscientiousness: Option<f64>,
    pub neuroticism: Option<f64>,
    pub openness: Option<f64>,
}

impl PersonalityProfile {
    pub fn score(&self, t: Trait) -> Option<f64> {
        match t {
            Trait::Extraversion => self.extraversion,
            Trait::Agreeableness => self.agreeableness,
            Trait::Conscientiousness => self.conscientiousness,
            Trait::Neuroticism => self.neuroticism,
            Trait::Openness => self.openness,
        }
    }

    /// Non-numeric values count as absent.
    pub fn from_document(doc: &Document) -> Self {
        let read = |t: Trait| doc.get(t.field()).and_then(numeric);
        Self {
            extraversion: read(Trait::Extraversion),
            agreeableness: read(Trait::Agreeableness),
            conscientiousness: read(Trait::Conscientiousness),
            neuroticism: read(Trait::Neuroticism),
            openness: read(Trait::Openness),
        }
    }

    pub fn is_empty(&self) -> bool {
        Trait::ALL.iter().all(|t| self.score(*t).is_none())
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Render a score the way it was stored: `27`, not `27.0`.
pub fn format_score(score: Option<f64>) -> String {
    match score {
        Some(value) if value.fract() == 0.0 && value.abs() < 1e15 => format!("{}", value as i64),
        Some(value) => format!("{}", value),
        None => "N/A".to_string(),
    }
}

/// First score record for the user. No record yields an all-absent profile.
pub async fn load_profile(
    store: &dyn DocumentStore,
    user_id: &str,
    collection: &str,
) -> Result<PersonalityProfile, StoreError> {
    let path = CollectionPath::user_collection(user_id, collection)?;
    let docs = store
        .list_documents(&path, &CollectionQuery::first(1))
        .await?;
    let profile = docs
        .first()
        .map(PersonalityProfile::from_document)
        .unwrap_or_default();
    if profile.is_empty() {
        tracing::debug!(user_id, "No personality scores on record");
    }
    Ok(profile)
}

/// Every score record as `{id, scoreEXT, scoreAGG, scoreCON, scoreNEU, scoreOPE}`.
///
/// Missing scores are emitted as `null` so clients always see all five keys.
pub async fn list_personality_scores(
    store: &dyn DocumentStore,
    user_id: &str,
    collection: &str,
) -> Result<Vec<Value>, StoreError> {
    let path = CollectionPath::user_collection(user_id, collection)?;
    let docs = store.list_documents(&path, &CollectionQuery::all()).await?;

    Ok(docs
        .iter()
        .map(|doc| {
            let mut entry = serde_json::Map::new();
            entry.insert("id".to_string(), Value::String(doc.id.clone()));
            for t in Trait::ALL {
                entry.insert(
                    t.field().to_string(),
                    doc.get(t.field()).cloned().unwrap_or(Value::Null),
                );
            }
            Value::Object(entry)
        })
        .collect())
}
