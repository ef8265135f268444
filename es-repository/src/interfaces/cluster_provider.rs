//! Cluster provider trait definition.
//!
//! This module defines the administrative operations the repository needs
//! from a cluster backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::RepositoryError;
use crate::types::{ClusterInfo, IndexSettings};

/// Abstracts the administrative API of the cluster.
///
/// Implementations are injected into `ClusterRepository`. Every method is a
/// single round-trip with no caching and no retry.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Check whether an index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, RepositoryError>;

    /// Delete an index.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was deleted
    /// * `Err(RepositoryError)` - If the deletion fails, including when the index is missing
    async fn delete_index(&self, index: &str) -> Result<(), RepositoryError>;

    /// Create an index with the given settings. Fails if the index exists.
    async fn create_index(&self, index: &str, settings: &IndexSettings)
        -> Result<(), RepositoryError>;

    /// Put a mapping document on an existing index.
    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<(), RepositoryError>;

    /// Create or replace an index template.
    async fn put_template(&self, name: &str, template: &Value) -> Result<(), RepositoryError>;

    /// Read the shard, replica and refresh settings of an index.
    async fn index_settings(&self, index: &str) -> Result<IndexSettings, RepositoryError>;

    /// Read the identity of the connected cluster.
    async fn cluster_info(&self) -> Result<ClusterInfo, RepositoryError>;
}
