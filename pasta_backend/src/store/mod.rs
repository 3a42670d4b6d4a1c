//! Document store seam.
//!
//! The backend only ever reads: "give me the documents of this collection, maybe
//! ordered by a field, maybe limited". Firestore serves production; the in-memory
//! store backs tests and offline runs.

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// A stored document with its typed values already flattened to plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// `{"id": ..., <fields>...}`, the shape the HTTP surface returns.
    pub fn to_json_with_id(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert("id".to_string(), Value::String(self.id.clone()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

/// Slash-free path segments of a collection, e.g. `users / <uid> / fitnessMessages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath {
    segments: Vec<String>,
}

impl CollectionPath {
    pub fn new<I, S>(segments: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        // Collections live at odd depths: col, col/doc/col, ...
        if segments.is_empty() || segments.len() % 2 == 0 {
            return Err(StoreError::InvalidPath(segments.join("/")));
        }
        for segment in &segments {
            if segment.trim().is_empty() || segment.contains('/') || segment == "." || segment == ".."
            {
                return Err(StoreError::InvalidPath(segments.join("/")));
            }
        }
        Ok(Self { segments })
    }

    /// `users/{user_id}/{collection}`
    pub fn user_collection(user_id: &str, collection: &str) -> Result<Self, StoreError> {
        Self::new(["users", user_id, collection])
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Parent document path, empty for a top-level collection.
    pub fn parent(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    pub fn collection_id(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn as_string(&self) -> String {
        self.segments.join("/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionQuery {
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl CollectionQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn first(limit: usize) -> Self {
        Self {
            order_by: None,
            limit: Some(limit),
        }
    }

    /// Newest `limit` documents by `field`, newest first.
    pub fn latest(field: impl Into<String>, limit: usize) -> Self {
        Self {
            order_by: Some(OrderBy {
                field: field.into(),
                direction: Direction::Descending,
            }),
            limit: Some(limit),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid collection path '{0}'")]
    InvalidPath(String),
    #[error("document store request failed: {0}")]
    Transport(String),
    #[error("document store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode document store response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(
        &self,
        collection: &CollectionPath,
        query: &CollectionQuery,
    ) -> Result<Vec<Document>, StoreError>;
}
