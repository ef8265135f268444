//! Dependency initialization and wiring for the admin binary.

use std::sync::Arc;

use es_repository::{ClusterConfig, ClusterRepository, LoggingListener};
use tracing::info;

use crate::AdminError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// Repository with a built client and a running bulk pipeline.
    pub repository: ClusterRepository,
}

impl Dependencies {
    /// Connect to the cluster and start the bulk pipeline.
    ///
    /// With `verify` set, the cluster name reported by the cluster must
    /// match the configured one.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(AdminError)` - If initialization fails
    pub async fn new(config: ClusterConfig, verify: bool) -> Result<Self, AdminError> {
        info!(
            cluster = %config.cluster_name,
            hosts = %config.hosts,
            port = config.port,
            "Initializing dependencies"
        );

        let mut repository = ClusterRepository::new(config);
        repository.build_client().await?;

        Self::from_repository(repository, verify).await
    }

    /// Finish wiring a repository whose client is already built.
    ///
    /// The repository is shut down when verification or the bulk pipeline
    /// fails.
    pub async fn from_repository(
        mut repository: ClusterRepository,
        verify: bool,
    ) -> Result<Self, AdminError> {
        let started = async {
            if verify {
                repository.verify_cluster().await?;
                info!("Cluster connection verified");
            }
            repository.build_bulk_processor(Arc::new(LoggingListener))
        }
        .await;

        if let Err(e) = started {
            let _ = repository.shutdown().await;
            return Err(e.into());
        }
        info!("Bulk processor started");

        Ok(Self { repository })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use es_repository::bulk::{BulkRequest, BulkResponse};
    use es_repository::types::ClusterVersion;
    use es_repository::{
        BulkTransport, ClusterInfo, ClusterProvider, IndexSettings, RepositoryError,
    };
    use serde_json::Value;

    /// Mock cluster reporting a fixed cluster name.
    struct MockCluster {
        cluster_name: &'static str,
    }

    #[async_trait]
    impl ClusterProvider for MockCluster {
        async fn index_exists(&self, _index: &str) -> Result<bool, RepositoryError> {
            Ok(false)
        }

        async fn delete_index(&self, _index: &str) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn create_index(
            &self,
            _index: &str,
            _settings: &IndexSettings,
        ) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn put_mapping(&self, _index: &str, _mapping: &Value) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn put_template(&self, _name: &str, _template: &Value) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn index_settings(&self, _index: &str) -> Result<IndexSettings, RepositoryError> {
            Ok(IndexSettings::new(1, 1))
        }

        async fn cluster_info(&self) -> Result<ClusterInfo, RepositoryError> {
            Ok(ClusterInfo {
                node_name: "node-1".to_string(),
                cluster_name: self.cluster_name.to_string(),
                cluster_uuid: None,
                version: ClusterVersion {
                    number: "2.11.0".to_string(),
                    distribution: Some("opensearch".to_string()),
                    lucene_version: None,
                },
            })
        }
    }

    #[async_trait]
    impl BulkTransport for MockCluster {
        async fn send_bulk(&self, request: &BulkRequest) -> Result<BulkResponse, RepositoryError> {
            Ok(BulkResponse {
                took: 1,
                items: request.len(),
                failures: vec![],
            })
        }
    }

    fn repository(configured: &str, reported: &'static str) -> ClusterRepository {
        let cluster = Arc::new(MockCluster {
            cluster_name: reported,
        });
        ClusterRepository::with_provider(
            ClusterConfig::new(configured, "es1"),
            cluster.clone(),
            cluster,
        )
    }

    #[tokio::test]
    async fn test_verified_dependencies() {
        let dependencies = Dependencies::from_repository(repository("logging", "logging"), true)
            .await
            .unwrap();

        assert!(dependencies.repository.bulk().is_ok());
        dependencies.repository.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cluster_mismatch_fails_verification() {
        let result = Dependencies::from_repository(repository("logging", "metrics"), true).await;

        assert!(matches!(
            result,
            Err(AdminError::RepositoryError(RepositoryError::ClusterMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_mismatch_ignored_without_verify() {
        let dependencies = Dependencies::from_repository(repository("logging", "metrics"), false)
            .await
            .unwrap();

        assert!(dependencies.repository.is_connected());
        dependencies.repository.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let result = Dependencies::new(ClusterConfig::new("logging", " , "), true).await;
        assert!(matches!(
            result,
            Err(AdminError::RepositoryError(RepositoryError::ConfigError(_)))
        ));
    }
}
