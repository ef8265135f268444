//! Bulk transport trait definition.

use async_trait::async_trait;

use crate::bulk::{BulkRequest, BulkResponse};
use crate::errors::RepositoryError;

/// Sends one bulk request to the cluster.
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Send all actions of `request` in a single round-trip.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkResponse)` - The request was accepted; individual items may still have failed
    /// * `Err(RepositoryError::Rejected)` - The cluster is overloaded and the request may be retried
    /// * `Err(RepositoryError)` - Any other failure
    async fn send_bulk(&self, request: &BulkRequest) -> Result<BulkResponse, RepositoryError>;
}
