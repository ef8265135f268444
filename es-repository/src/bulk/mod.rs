//! Bulk write pipeline.
//!
//! Actions are buffered and sent as bulk requests when a count or size
//! threshold is reached, or when the flush timer fires.

mod action;
mod listener;
mod processor;

pub use action::{BulkAction, BulkItemFailure, BulkRequest, BulkResponse};
pub use listener::{BulkListener, LoggingListener, NoopListener};
pub use processor::BulkProcessor;
