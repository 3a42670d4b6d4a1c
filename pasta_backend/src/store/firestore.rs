//! Firestore REST (v1) reader.
//!
//! Unordered reads use the `documents` list endpoint and follow page tokens.
//! Ordered, limited reads go through `:runQuery` with a structured query, which
//! is the only REST call that supports `orderBy`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};

use super::{CollectionPath, CollectionQuery, Direction, Document, DocumentStore, StoreError};
use crate::config::FirestoreConfig;

const LIST_PAGE_SIZE: usize = 300;

pub struct FirestoreStore {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    database: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<RawDocument>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreStore {
    pub fn new(http: reqwest::Client, config: &FirestoreConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            database: config.database.clone(),
            access_token: config
                .access_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
        }
    }

    fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.base_url, self.project_id, self.database
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn list_all(
        &self,
        collection: &CollectionPath,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}/{}", self.documents_root(), collection.as_string());
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = limit.map(|limit| limit.saturating_sub(documents.len()));
            if remaining == Some(0) {
                break;
            }
            let page_size = remaining.unwrap_or(LIST_PAGE_SIZE).min(LIST_PAGE_SIZE);

            let mut query = vec![("pageSize", page_size.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .authorize(self.http.get(&url).query(&query))
                .send()
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            let page: ListDocumentsResponse = read_json(response).await?;

            documents.extend(page.documents.into_iter().map(decode_document));
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if let Some(limit) = limit {
            documents.truncate(limit);
        }
        Ok(documents)
    }

    async fn run_query(
        &self,
        collection: &CollectionPath,
        query: &CollectionQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let parent = collection.parent();
        let url = if parent.is_empty() {
            format!("{}:runQuery", self.documents_root())
        } else {
            format!("{}/{}:runQuery", self.documents_root(), parent.join("/"))
        };

        let response = self
            .authorize(self.http.post(&url).json(&structured_query(collection, query)))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let items: Vec<RunQueryItem> = read_json(response).await?;

        Ok(items
            .into_iter()
            .filter_map(|item| item.document)
            .map(decode_document)
            .collect())
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn list_documents(
        &self,
        collection: &CollectionPath,
        query: &CollectionQuery,
    ) -> Result<Vec<Document>, StoreError> {
        tracing::debug!(
            collection = %collection.as_string(),
            ordered = query.order_by.is_some(),
            limit = ?query.limit,
            "Firestore read"
        );
        if query.order_by.is_some() {
            self.run_query(collection, query).await
        } else {
            self.list_all(collection, query.limit).await
        }
    }
}

async fn read_json<T>(response: reqwest::Response) -> Result<T, StoreError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read body".to_string());
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| StoreError::Decode(e.to_string()))
}

fn structured_query(collection: &CollectionPath, query: &CollectionQuery) -> Value {
    let mut structured = json!({
        "from": [{ "collectionId": collection.collection_id() }],
    });
    if let Some(order) = &query.order_by {
        let direction = match order.direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured["orderBy"] = json!([{
            "field": { "fieldPath": order.field },
            "direction": direction,
        }]);
    }
    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }
    json!({ "structuredQuery": structured })
}

fn decode_document(raw: RawDocument) -> Document {
    let id = raw
        .name
        .rsplit('/')
        .next()
        .unwrap_or(raw.name.as_str())
        .to_string();
    let fields = raw
        .fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect();
    Document { id, fields }
}

/// Flatten a Firestore typed value (`{"integerValue": "3"}`) into plain JSON.
fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|obj| obj.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "booleanValue" => inner.clone(),
        "nullValue" => Value::Null,
        // int64 travels as a decimal string
        "integerValue" => match inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .unwrap_or(Value::Null),
            Value::Number(_) => inner.clone(),
            _ => Value::Null,
        },
        // NaN and Infinity arrive as strings and have no JSON form
        "doubleValue" => match inner {
            Value::Number(_) => inner.clone(),
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        },
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(|fields| {
                    fields
                        .iter()
                        .map(|(key, value)| (key.clone(), decode_value(value)))
                        .collect()
                })
                .unwrap_or_default();
            Value::Object(fields)
        }
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default();
            Value::Array(values)
        }
        "geoPointValue" => inner.clone(),
        other => {
            tracing::debug!("Unknown Firestore value type '{}'", other);
            Value::Null
        }
    }
}
