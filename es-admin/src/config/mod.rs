//! Configuration for the admin binary.

mod dependencies;
mod environment;

pub use dependencies::Dependencies;
pub use environment::{cluster_config_from, load_cluster_config};
