//! Request and response types shared by the repository and its providers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RepositoryError;

/// Settings of an index as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub refresh_interval: Option<String>,
}

impl IndexSettings {
    /// Settings for a new index.
    pub fn new(number_of_shards: u32, number_of_replicas: u32) -> Self {
        Self {
            number_of_shards,
            number_of_replicas,
            refresh_interval: None,
        }
    }

    /// Set the refresh interval.
    pub fn with_refresh_interval(mut self, refresh_interval: impl Into<String>) -> Self {
        self.refresh_interval = Some(refresh_interval.into());
        self
    }

    /// Body of a create-index request.
    pub fn to_create_body(&self) -> Value {
        let mut index = serde_json::Map::new();
        index.insert("number_of_shards".to_string(), self.number_of_shards.into());
        index.insert(
            "number_of_replicas".to_string(),
            self.number_of_replicas.into(),
        );
        if let Some(ref refresh_interval) = self.refresh_interval {
            index.insert(
                "refresh_interval".to_string(),
                Value::String(refresh_interval.clone()),
            );
        }
        serde_json::json!({ "settings": { "index": index } })
    }

    /// Read the settings of `index` from a get-settings response.
    ///
    /// The cluster reports numbers as strings, so both forms are accepted.
    pub fn from_settings_response(index: &str, response: &Value) -> Result<Self, RepositoryError> {
        let settings = response
            .get(index)
            .and_then(|v| v.pointer("/settings/index"))
            .ok_or_else(|| {
                RepositoryError::parse(format!("no settings reported for index {}", index))
            })?;

        let number = |field: &str| -> Result<u32, RepositoryError> {
            match settings.get(field) {
                Some(Value::String(s)) => s.parse().map_err(|_| {
                    RepositoryError::parse(format!("{} is not a number: {}", field, s))
                }),
                Some(Value::Number(n)) => n
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| RepositoryError::parse(format!("{} out of range", field))),
                _ => Err(RepositoryError::parse(format!("{} missing", field))),
            }
        };

        Ok(Self {
            number_of_shards: number("number_of_shards")?,
            number_of_replicas: number("number_of_replicas")?,
            refresh_interval: settings
                .get("refresh_interval")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }
}

/// Identity of the cluster behind the connection, read from the root endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    #[serde(rename = "name")]
    pub node_name: String,
    pub cluster_name: String,
    #[serde(default)]
    pub cluster_uuid: Option<String>,
    pub version: ClusterVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterVersion {
    pub number: String,
    #[serde(default)]
    pub distribution: Option<String>,
    #[serde(default)]
    pub lucene_version: Option<String>,
}
