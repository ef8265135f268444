//! Bulk actions, requests and responses.

use serde::Deserialize;
use serde_json::{json, Value};

/// A single write operation queued in the bulk pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Index a document, replacing it if it exists.
    Index {
        index: String,
        id: Option<String>,
        source: Value,
    },
    /// Index a document, failing if it exists.
    Create {
        index: String,
        id: Option<String>,
        source: Value,
    },
    /// Partially update an existing document.
    Update {
        index: String,
        id: String,
        doc: Value,
    },
    /// Delete a document.
    Delete { index: String, id: String },
}

impl BulkAction {
    pub fn index(index: impl Into<String>, id: Option<String>, source: Value) -> Self {
        Self::Index {
            index: index.into(),
            id,
            source,
        }
    }

    pub fn create(index: impl Into<String>, id: Option<String>, source: Value) -> Self {
        Self::Create {
            index: index.into(),
            id,
            source,
        }
    }

    pub fn delete(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Delete {
            index: index.into(),
            id: id.into(),
        }
    }

    /// The action and metadata line followed by the optional source line.
    pub fn to_lines(&self) -> Vec<Value> {
        fn meta(index: &str, id: Option<&str>) -> Value {
            let mut meta = json!({ "_index": index });
            if let Some(id) = id {
                meta["_id"] = Value::String(id.to_string());
            }
            meta
        }

        match self {
            Self::Index { index, id, source } => {
                vec![json!({ "index": meta(index, id.as_deref()) }), source.clone()]
            }
            Self::Create { index, id, source } => {
                vec![json!({ "create": meta(index, id.as_deref()) }), source.clone()]
            }
            Self::Update { index, id, doc } => vec![
                json!({ "update": meta(index, Some(id)) }),
                json!({ "doc": doc }),
            ],
            Self::Delete { index, id } => vec![json!({ "delete": meta(index, Some(id)) })],
        }
    }

    /// Number of payload bytes this action adds to a bulk request.
    pub fn estimated_size(&self) -> usize {
        self.to_lines()
            .iter()
            .map(|line| line.to_string().len() + 1)
            .sum()
    }
}

/// A batch of actions sent as one bulk request.
#[derive(Debug, Clone, Default)]
pub struct BulkRequest {
    actions: Vec<BulkAction>,
    size_bytes: usize,
}

impl BulkRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: BulkAction) {
        self.size_bytes += action.estimated_size();
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[BulkAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Estimated NDJSON payload size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// All NDJSON lines of the request, in order.
    pub fn to_lines(&self) -> Vec<Value> {
        self.actions.iter().flat_map(BulkAction::to_lines).collect()
    }
}

/// One failed item of a bulk response.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemFailure {
    /// Position of the action in the request the response answers.
    pub position: usize,
    pub index: String,
    pub id: Option<String>,
    pub status: u16,
    pub reason: String,
}

/// Summary of a bulk response.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    /// Milliseconds the cluster spent on the request.
    pub took: u64,
    /// Number of items in the response.
    pub items: usize,
    /// Items the cluster failed to apply.
    pub failures: Vec<BulkItemFailure>,
}

#[derive(Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, RawBulkItem>>,
}

#[derive(Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkItemFailure {
    /// The cluster refused the item because its write queue is full.
    pub fn is_rejected(&self) -> bool {
        self.status == 429
    }
}

impl BulkResponse {
    /// Summarise the body of a bulk response.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawBulkResponse = serde_json::from_value(value)?;
        let items = raw.items.len();

        let failures = raw
            .items
            .into_iter()
            .enumerate()
            .flat_map(|(position, item)| item.into_values().map(move |item| (position, item)))
            .filter(|(_, item)| item.status >= 300 || item.error.is_some())
            .map(|(position, item)| BulkItemFailure {
                position,
                reason: item
                    .error
                    .as_ref()
                    .and_then(|e| e.get("reason").and_then(Value::as_str))
                    .unwrap_or("unknown")
                    .to_string(),
                index: item.index,
                id: item.id,
                status: item.status,
            })
            .collect();

        Ok(Self {
            took: raw.took,
            items,
            failures,
        })
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
