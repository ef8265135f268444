//! Administrative commands run against the repository.

use std::path::PathBuf;

use clap::Subcommand;
use es_repository::{BulkAction, ClusterRepository};
use serde_json::Value;
use tracing::{info, instrument};

use crate::AdminError;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the identity of the connected cluster
    Info,
    /// Check whether an index exists
    Exists { index: String },
    /// Create an index
    Create {
        index: String,
        #[arg(long, default_value_t = 1)]
        shards: u32,
        #[arg(long, default_value_t = 1)]
        replicas: u32,
    },
    /// Delete an index if it exists
    Delete { index: String },
    /// Put a mapping document read from a file
    PutMapping {
        index: String,
        doc_type: String,
        file: PathBuf,
    },
    /// Store the index templates for every configured prefix
    Templates,
    /// Print the shard, replica and refresh settings of an index
    Settings { index: String },
    /// Index newline-delimited JSON documents through the bulk pipeline
    Load { index: String, file: PathBuf },
}

/// Run `command` and return the text to print.
#[instrument(skip(repository))]
pub async fn run_command(
    repository: &ClusterRepository,
    command: Command,
) -> Result<String, AdminError> {
    match command {
        Command::Info => {
            let info = repository.cluster_info().await?;
            Ok(format!(
                "cluster={} node={} uuid={} version={}",
                info.cluster_name,
                info.node_name,
                info.cluster_uuid.as_deref().unwrap_or("-"),
                info.version.number
            ))
        }
        Command::Exists { index } => Ok(repository.exists(&index).await?.to_string()),
        Command::Create {
            index,
            shards,
            replicas,
        } => {
            repository.create(&index, shards, replicas).await?;
            Ok(format!("created {}", index))
        }
        Command::Delete { index } => {
            if repository.delete(&index).await? {
                Ok(format!("deleted {}", index))
            } else {
                Ok(format!("{} does not exist", index))
            }
        }
        Command::PutMapping {
            index,
            doc_type,
            file,
        } => {
            let mapping = tokio::fs::read_to_string(&file).await?;
            repository.put_mapping(&index, &doc_type, &mapping).await?;
            Ok(format!("mapping updated on {}", index))
        }
        Command::Templates => {
            let count = repository.build_template().await?;
            Ok(format!("{} template(s) stored", count))
        }
        Command::Settings { index } => {
            let settings = repository.index_settings(&index).await?;
            Ok(format!(
                "shards={} replicas={} refresh_interval={}",
                settings.number_of_shards,
                settings.number_of_replicas,
                settings.refresh_interval.as_deref().unwrap_or("-")
            ))
        }
        Command::Load { index, file } => {
            let text = tokio::fs::read_to_string(&file).await?;
            let documents = parse_documents(&text)?;
            let count = documents.len();

            for source in documents {
                repository
                    .add(BulkAction::index(index.clone(), None, source))
                    .await?;
            }
            repository.bulk()?.flush().await?;

            info!(index = %index, count, "Documents queued");
            Ok(format!("{} document(s) queued for {}", count, index))
        }
    }
}

/// Parse newline-delimited JSON objects, skipping blank lines.
pub fn parse_documents(text: &str) -> Result<Vec<Value>, AdminError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            let value: Value = serde_json::from_str(line)
                .map_err(|e| AdminError::input(format!("line {}: {}", n + 1, e)))?;
            if !value.is_object() {
                return Err(AdminError::input(format!(
                    "line {}: document must be a JSON object",
                    n + 1
                )));
            }
            Ok(value)
        })
        .collect()
}
