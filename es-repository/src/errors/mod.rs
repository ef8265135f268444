//! Error types for the cluster repository.

mod repository_error;

pub use repository_error::RepositoryError;
