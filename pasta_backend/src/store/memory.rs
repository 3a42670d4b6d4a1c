use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{CollectionPath, CollectionQuery, Direction, Document, DocumentStore, StoreError};

/// Process-local document store. Collections keep insertion order.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<CollectionPath, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document, replacing any existing document with the same id.
    pub async fn insert(&self, collection: &CollectionPath, document: Document) {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.clone()).or_default();
        match docs.iter_mut().find(|existing| existing.id == document.id) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
    }

    /// Load `{"users/u1/personalityScores": [{"id": "p1", ...fields}], ...}`.
    ///
    /// Entries without a string `id` get their position as id. Returns the
    /// number of documents loaded.
    pub async fn load_seed(&self, seed: &Value) -> Result<usize, StoreError> {
        let collections = seed
            .as_object()
            .ok_or_else(|| StoreError::Decode("seed must be a JSON object".to_string()))?;

        let mut loaded = 0;
        for (raw_path, docs) in collections {
            let path = CollectionPath::new(raw_path.split('/'))?;
            let docs = docs.as_array().ok_or_else(|| {
                StoreError::Decode(format!("seed collection '{}' must be an array", raw_path))
            })?;
            for (index, doc) in docs.iter().enumerate() {
                let mut fields = doc.as_object().cloned().ok_or_else(|| {
                    StoreError::Decode(format!("seed entry {} in '{}' is not an object", index, raw_path))
                })?;
                let id = match fields.remove("id") {
                    Some(Value::String(id)) => id,
                    _ => index.to_string(),
                };
                self.insert(&path, Document::new(id, Value::Object(fields)))
                    .await;
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn list_documents(
        &self,
        collection: &CollectionPath,
        query: &CollectionQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs = self
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();

        if let Some(order) = &query.order_by {
            // Like Firestore, documents missing the order field are excluded.
            docs.retain(|doc| doc.get(&order.field).is_some_and(|v| !v.is_null()));
            docs.sort_by(|a, b| {
                let ordering = compare_values(&a.fields[&order.field], &b.fields[&order.field]);
                match order.direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }

        Ok(docs)
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (x.parse::<DateTime<Utc>>(), y.parse::<DateTime<Utc>>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
