//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `ClusterProvider`
//! and `BulkTransport` using the OpenSearch Rust client, which speaks the
//! index, template, mapping and bulk REST APIs shared with Elasticsearch.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials as AuthCredentials,
    http::{
        request::JsonBody,
        response::Response,
        transport::{MultiNodeConnectionPool, TransportBuilder},
    },
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesGetSettingsParts,
        IndicesPutMappingParts, IndicesPutTemplateParts,
    },
    BulkParts, OpenSearch,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::bulk::{BulkRequest, BulkResponse};
use crate::config::ClusterConfig;
use crate::errors::RepositoryError;
use crate::hosts::{parse_host_list, resolve_hosts};
use crate::interfaces::{BulkTransport, ClusterProvider};
use crate::types::{ClusterInfo, IndexSettings};

/// OpenSearch client implementation.
///
/// # Example
///
/// ```ignore
/// use es_repository::{ClusterConfig, OpenSearchProvider};
/// let config = ClusterConfig::new("logging", "es1, es2, es3");
/// let provider = OpenSearchProvider::connect(&config).await?;
/// let exists = provider.index_exists("logs-2024.01").await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
}

impl OpenSearchProvider {
    /// Build a client for every host of the configured host list.
    ///
    /// Hosts are resolved once; requests are spread over the resulting
    /// nodes round-robin. No request is sent to the cluster here.
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new client instance
    /// * `Err(RepositoryError)` - If the configuration is invalid, a host
    ///   does not resolve or the transport cannot be built
    pub async fn connect(config: &ClusterConfig) -> Result<Self, RepositoryError> {
        config.validate()?;

        info!(cluster = %config.cluster_name, "Initializing client");

        let hosts = parse_host_list(&config.hosts);
        if hosts.is_empty() {
            return Err(RepositoryError::config("host list must not be empty"));
        }
        let urls = resolve_hosts(&hosts, config.port, &config.scheme).await?;
        let node_count = urls.len();

        let conn_pool = MultiNodeConnectionPool::round_robin(urls, config.sniff_interval);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();
        if let Some(ref credentials) = config.credentials {
            builder = builder.auth(AuthCredentials::Basic(
                credentials.username.clone(),
                credentials.password.clone(),
            ));
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let transport = builder
            .build()
            .map_err(|e| RepositoryError::connection(e.to_string()))?;

        info!(
            cluster = %config.cluster_name,
            nodes = node_count,
            sniffing = config.sniff_interval.is_some(),
            "Created OpenSearch client"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
        })
    }
}

/// Turn a non-success response into a `Request` error carrying its body.
async fn ensure_success(
    operation: &'static str,
    response: Response,
) -> Result<Response, RepositoryError> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(operation, status = %status, body = %body, "Request failed");
    Err(RepositoryError::request(operation, status.as_u16(), body))
}

#[async_trait]
impl ClusterProvider for OpenSearchProvider {
    #[instrument(skip(self))]
    async fn index_exists(&self, index: &str) -> Result<bool, RepositoryError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => ensure_success("index_exists", response).await.map(|_| true),
        }
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, index: &str) -> Result<(), RepositoryError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await?;
        ensure_success("delete_index", response).await?;

        info!(index = %index, "Index deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn create_index(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<(), RepositoryError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(settings.to_create_body())
            .send()
            .await?;
        ensure_success("create_index", response).await?;

        info!(
            index = %index,
            shards = settings.number_of_shards,
            replicas = settings.number_of_replicas,
            "Index created"
        );
        Ok(())
    }

    #[instrument(skip(self, mapping))]
    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<(), RepositoryError> {
        let response = self
            .client
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[index]))
            .body(mapping.clone())
            .send()
            .await?;
        ensure_success("put_mapping", response).await?;

        debug!(index = %index, "Mapping updated");
        Ok(())
    }

    #[instrument(skip(self, template))]
    async fn put_template(&self, name: &str, template: &Value) -> Result<(), RepositoryError> {
        let response = self
            .client
            .indices()
            .put_template(IndicesPutTemplateParts::Name(name))
            .body(template.clone())
            .send()
            .await?;
        ensure_success("put_template", response).await?;

        info!(template = %name, "Template stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn index_settings(&self, index: &str) -> Result<IndexSettings, RepositoryError> {
        let response = self
            .client
            .indices()
            .get_settings(IndicesGetSettingsParts::Index(&[index]))
            .send()
            .await?;
        let response = ensure_success("index_settings", response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RepositoryError::parse(e.to_string()))?;
        IndexSettings::from_settings_response(index, &body)
    }

    #[instrument(skip(self))]
    async fn cluster_info(&self) -> Result<ClusterInfo, RepositoryError> {
        let response = self.client.info().send().await?;
        let response = ensure_success("cluster_info", response).await?;

        response
            .json::<ClusterInfo>()
            .await
            .map_err(|e| RepositoryError::parse(e.to_string()))
    }
}

#[async_trait]
impl BulkTransport for OpenSearchProvider {
    async fn send_bulk(&self, request: &BulkRequest) -> Result<BulkResponse, RepositoryError> {
        let body: Vec<JsonBody<Value>> = request
            .to_lines()
            .into_iter()
            .map(JsonBody::new)
            .collect();

        let response = self.client.bulk(BulkParts::None).body(body).send().await?;

        if response.status_code().as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Rejected(body));
        }
        let response = ensure_success("bulk", response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RepositoryError::parse(e.to_string()))?;
        BulkResponse::from_value(body).map_err(|e| RepositoryError::parse(e.to_string()))
    }
}
