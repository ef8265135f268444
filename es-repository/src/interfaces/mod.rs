//! Interface definitions for the cluster backend.
//!
//! The repository talks to the cluster only through these traits, so the
//! backend can be swapped for a mock in tests.

mod bulk_transport;
mod cluster_provider;

pub use bulk_transport::BulkTransport;
pub use cluster_provider::ClusterProvider;
