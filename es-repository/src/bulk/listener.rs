//! Callbacks around every bulk request.

use tracing::{debug, warn};

use crate::bulk::{BulkRequest, BulkResponse};
use crate::errors::RepositoryError;

/// Observes the bulk requests dispatched by a `BulkProcessor`.
///
/// Callbacks run on the task that sends the batch and must not block.
pub trait BulkListener: Send + Sync {
    /// Called right before a batch is sent.
    fn before_bulk(&self, execution_id: u64, request: &BulkRequest) {
        debug!(
            execution_id,
            actions = request.len(),
            bytes = request.size_bytes(),
            "Sending bulk request"
        );
    }

    /// Called once a batch has completed, after any retries.
    fn after_bulk(
        &self,
        execution_id: u64,
        request: &BulkRequest,
        result: Result<&BulkResponse, &RepositoryError>,
    ) {
        match result {
            Ok(response) if response.has_failures() => warn!(
                execution_id,
                actions = request.len(),
                failed = response.failures.len(),
                "Bulk request completed with item failures"
            ),
            Ok(response) => debug!(
                execution_id,
                actions = request.len(),
                took_ms = response.took,
                "Bulk request completed"
            ),
            Err(e) => warn!(
                execution_id,
                actions = request.len(),
                error = %e,
                "Bulk request failed"
            ),
        }
    }
}

/// Listener that logs through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl BulkListener for LoggingListener {}

/// Listener that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl BulkListener for NoopListener {
    fn before_bulk(&self, _execution_id: u64, _request: &BulkRequest) {}

    fn after_bulk(
        &self,
        _execution_id: u64,
        _request: &BulkRequest,
        _result: Result<&BulkResponse, &RepositoryError>,
    ) {
    }
}
