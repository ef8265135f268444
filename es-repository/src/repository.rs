//! Cluster repository implementation.
//!
//! This module provides the facade application code uses to connect to the
//! cluster, write through the bulk pipeline and manage indices and templates.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::bulk::{BulkAction, BulkListener, BulkProcessor};
use crate::config::ClusterConfig;
use crate::errors::RepositoryError;
use crate::interfaces::{BulkTransport, ClusterProvider};
use crate::opensearch::OpenSearchProvider;
use crate::template::{template_body, template_prefixes};
use crate::types::{ClusterInfo, IndexSettings};

/// Owns the cluster client and the bulk pipeline.
///
/// Handles are private and built explicitly: `build_client` first, then
/// `build_bulk_processor`. `shutdown` releases them in the right order.
pub struct ClusterRepository {
    config: ClusterConfig,
    provider: Option<Arc<dyn ClusterProvider>>,
    transport: Option<Arc<dyn BulkTransport>>,
    bulk: Option<BulkProcessor>,
}

impl ClusterRepository {
    /// Create an unconnected repository.
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            provider: None,
            transport: None,
            bulk: None,
        }
    }

    /// Create a repository connected through the given backend.
    pub fn with_provider(
        config: ClusterConfig,
        provider: Arc<dyn ClusterProvider>,
        transport: Arc<dyn BulkTransport>,
    ) -> Self {
        Self {
            config,
            provider: Some(provider),
            transport: Some(transport),
            bulk: None,
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.provider.is_some()
    }

    fn provider(&self) -> Result<&dyn ClusterProvider, RepositoryError> {
        self.provider.as_deref().ok_or(RepositoryError::NotConnected)
    }

    /// Build the cluster client from the configured cluster name and hosts.
    ///
    /// Fails on invalid configuration or when a host does not resolve.
    #[instrument(skip(self), fields(cluster = %self.config.cluster_name))]
    pub async fn build_client(&mut self) -> Result<(), RepositoryError> {
        if self.provider.is_some() {
            return Err(RepositoryError::AlreadyInitialized("client"));
        }

        let provider = Arc::new(OpenSearchProvider::connect(&self.config).await?);
        self.provider = Some(provider.clone());
        self.transport = Some(provider);
        Ok(())
    }

    /// Start the bulk pipeline over the current client.
    pub fn build_bulk_processor(
        &mut self,
        listener: Arc<dyn BulkListener>,
    ) -> Result<(), RepositoryError> {
        if self.bulk.is_some() {
            return Err(RepositoryError::AlreadyInitialized("bulk processor"));
        }
        let transport = self.transport.clone().ok_or(RepositoryError::NotConnected)?;

        self.bulk = Some(BulkProcessor::spawn(
            transport,
            self.config.bulk.clone(),
            listener,
        )?);
        Ok(())
    }

    /// The running bulk pipeline.
    pub fn bulk(&self) -> Result<&BulkProcessor, RepositoryError> {
        self.bulk.as_ref().ok_or(RepositoryError::BulkClosed)
    }

    /// Queue a write on the bulk pipeline.
    pub async fn add(&self, action: BulkAction) -> Result<(), RepositoryError> {
        self.bulk()?.add(action).await
    }

    /// Store one template per configured prefix.
    ///
    /// Existing templates are overwritten. Returns the number of templates
    /// submitted, which is zero when no prefix is configured.
    #[instrument(skip(self))]
    pub async fn build_template(&self) -> Result<usize, RepositoryError> {
        let provider = self.provider()?;
        let prefixes = template_prefixes(&self.config.template);

        if prefixes.is_empty() {
            warn!("No template prefixes configured, no template submitted");
            return Ok(0);
        }

        for prefix in &prefixes {
            let body = template_body(prefix, &self.config.template);
            provider.put_template(prefix, &body).await?;
        }

        info!(count = prefixes.len(), "Templates built");
        Ok(prefixes.len())
    }

    /// Check whether an index exists. Not cached.
    pub async fn exists(&self, index: &str) -> Result<bool, RepositoryError> {
        self.provider()?.index_exists(index).await
    }

    /// Delete an index if it exists.
    ///
    /// The existence check and the delete are separate requests. Returns
    /// whether a delete was issued.
    #[instrument(skip(self))]
    pub async fn delete(&self, index: &str) -> Result<bool, RepositoryError> {
        let provider = self.provider()?;
        if !provider.index_exists(index).await? {
            info!(index = %index, "Index does not exist, nothing to delete");
            return Ok(false);
        }

        provider.delete_index(index).await?;
        Ok(true)
    }

    /// Create an index. Fails if it already exists.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        index: &str,
        number_of_shards: u32,
        number_of_replicas: u32,
    ) -> Result<(), RepositoryError> {
        let settings = IndexSettings::new(number_of_shards, number_of_replicas)
            .with_refresh_interval(self.config.index_defaults.refresh_interval.clone());
        self.provider()?.create_index(index, &settings).await
    }

    /// Put a raw JSON mapping on an index.
    ///
    /// `mapping` may be wrapped in an object keyed by `doc_type`, as older
    /// clusters expected; the wrapper is removed. Failures are logged and
    /// returned.
    #[instrument(skip(self, mapping))]
    pub async fn put_mapping(
        &self,
        index: &str,
        doc_type: &str,
        mapping: &str,
    ) -> Result<(), RepositoryError> {
        let result = async {
            let document = mapping_document(doc_type, mapping)?;
            self.provider()?.put_mapping(index, &document).await
        }
        .await;

        if let Err(ref e) = result {
            error!(index = %index, doc_type = %doc_type, error = %e, "Failed to put mapping");
        }
        result
    }

    /// Settings of an index as reported by the cluster.
    pub async fn index_settings(&self, index: &str) -> Result<IndexSettings, RepositoryError> {
        self.provider()?.index_settings(index).await
    }

    /// Identity of the connected cluster.
    pub async fn cluster_info(&self) -> Result<ClusterInfo, RepositoryError> {
        self.provider()?.cluster_info().await
    }

    /// Check that the client talks to the configured cluster.
    #[instrument(skip(self))]
    pub async fn verify_cluster(&self) -> Result<ClusterInfo, RepositoryError> {
        let info = self.cluster_info().await?;
        if info.cluster_name != self.config.cluster_name {
            return Err(RepositoryError::ClusterMismatch {
                expected: self.config.cluster_name.clone(),
                actual: info.cluster_name,
            });
        }

        info!(
            cluster = %info.cluster_name,
            node = %info.node_name,
            version = %info.version.number,
            "Cluster verified"
        );
        Ok(info)
    }

    /// Close the bulk pipeline, sending everything still buffered.
    pub async fn close_bulk_processor(&mut self) -> Result<(), RepositoryError> {
        match self.bulk.take() {
            Some(bulk) => bulk.close().await,
            None => Ok(()),
        }
    }

    /// Release the client.
    ///
    /// A bulk pipeline that is still open keeps its own handle to the
    /// connection until it is closed.
    pub fn close_client(&mut self) {
        if self.provider.take().is_some() {
            info!(cluster = %self.config.cluster_name, "Client closed");
        }
        self.transport = None;
    }

    /// Close the bulk pipeline, then the client.
    ///
    /// The client is released even when closing the pipeline fails.
    pub async fn shutdown(mut self) -> Result<(), RepositoryError> {
        let result = self.close_bulk_processor().await;
        self.close_client();
        result
    }
}

/// Parse a mapping document, removing a `{ "<doc_type>": {...} }` wrapper.
fn mapping_document(doc_type: &str, mapping: &str) -> Result<Value, RepositoryError> {
    let value: Value = serde_json::from_str(mapping)
        .map_err(|e| RepositoryError::invalid_document(format!("mapping is not valid JSON: {}", e)))?;

    let Value::Object(mut map) = value else {
        return Err(RepositoryError::invalid_document(
            "mapping must be a JSON object",
        ));
    };

    if !doc_type.is_empty() && map.len() == 1 {
        match map.remove(doc_type) {
            Some(Value::Object(inner)) => return Ok(Value::Object(inner)),
            Some(other) => {
                map.insert(doc_type.to_string(), other);
            }
            None => {}
        }
    }

    Ok(Value::Object(map))
}
