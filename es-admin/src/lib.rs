//! # Elasticsearch Admin
//!
//! Configuration loading and dependency wiring for the `es-admin` binary.

pub mod commands;
pub mod config;

pub use config::{load_cluster_config, Dependencies};

use thiserror::Error;

/// Errors that can occur while configuring or running an admin command.
#[derive(Error, Debug)]
pub enum AdminError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Repository error.
    #[error("Repository error: {0}")]
    RepositoryError(#[from] es_repository::RepositoryError),

    /// Input document error.
    #[error("Invalid input: {0}")]
    InputError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AdminError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create an input error.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::InputError(msg.into())
    }
}
