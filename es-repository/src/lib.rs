//! # Elasticsearch Repository
//!
//! This crate provides the repository facade for an Elasticsearch-compatible
//! cluster: client construction from a cluster name and host list, a bulk
//! write pipeline, and index, mapping and template lifecycle.

pub mod bulk;
pub mod config;
pub mod errors;
pub mod hosts;
pub mod interfaces;
pub mod opensearch;
pub mod repository;
pub mod template;
pub mod types;

pub use bulk::{BulkAction, BulkListener, BulkProcessor, LoggingListener, NoopListener};
pub use config::{BackoffConfig, BulkConfig, ClusterConfig, Credentials, IndexDefaults, TemplateConfig};
pub use errors::RepositoryError;
pub use interfaces::{BulkTransport, ClusterProvider};
pub use self::opensearch::OpenSearchProvider;
pub use repository::ClusterRepository;
pub use types::{ClusterInfo, IndexSettings};
