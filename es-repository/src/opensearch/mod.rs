//! OpenSearch implementation of the cluster provider.
//!
//! This module provides a concrete implementation of `ClusterProvider`
//! and `BulkTransport` backed by the OpenSearch REST client.

mod client;

pub use client::OpenSearchProvider;
