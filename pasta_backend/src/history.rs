//! Recent chat turns, oldest first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{CollectionPath, CollectionQuery, Document, DocumentStore, StoreError};

pub const DEFAULT_HISTORY_LIMIT: usize = 5;
const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// The app stores the model side as `"model"`; anything unrecognised is the user.
    pub fn from_sender(sender: &str) -> Self {
        match sender.trim().to_ascii_lowercase().as_str() {
            "model" | "assistant" | "agent" | "bot" => ChatRole::Assistant,
            _ => ChatRole::User,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatTurn {
    fn from_document(doc: &Document) -> Option<Self> {
        let content = doc.get("content").and_then(Value::as_str)?.to_string();
        let role = doc
            .get("sender")
            .or_else(|| doc.get("role"))
            .and_then(Value::as_str)
            .map(ChatRole::from_sender)
            .unwrap_or(ChatRole::User);
        let timestamp = doc
            .get(TIMESTAMP_FIELD)
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok());
        Some(Self {
            role,
            content,
            timestamp,
        })
    }
}

/// Bounded chat window in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatHistory {
    turns: Vec<ChatTurn>,
}

impl ChatHistory {
    pub fn new(turns: Vec<ChatTurn>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// `Role: content` lines joined by newlines.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The `limit` newest turns of `users/{uid}/{collection}`, returned oldest first.
pub async fn load_history(
    store: &dyn DocumentStore,
    user_id: &str,
    collection: &str,
    limit: usize,
) -> Result<ChatHistory, StoreError> {
    if limit == 0 {
        return Ok(ChatHistory::default());
    }

    let path = CollectionPath::user_collection(user_id, collection)?;
    let newest_first = store
        .list_documents(&path, &CollectionQuery::latest(TIMESTAMP_FIELD, limit))
        .await?;

    let total = newest_first.len();
    // Reverse to get chronological order
    let turns: Vec<ChatTurn> = newest_first
        .iter()
        .rev()
        .filter_map(ChatTurn::from_document)
        .collect();
    if turns.len() < total {
        tracing::debug!(
            user_id,
            skipped = total - turns.len(),
            "Skipped chat documents without text content"
        );
    }

    Ok(ChatHistory::new(turns))
}
