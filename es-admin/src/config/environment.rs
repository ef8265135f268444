//! Cluster configuration read from environment variables.
//!
//! Only `ES_CLUSTER_NAME` and `ES_HOSTS` are required; every other value
//! falls back to the defaults of `es_repository::config`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use es_repository::{ClusterConfig, Credentials};

use crate::AdminError;

/// Load the cluster configuration from the process environment.
///
/// # Environment Variables
///
/// - `ES_CLUSTER_NAME`: name of the cluster (required)
/// - `ES_HOSTS`: comma-separated host list (required)
/// - `ES_PORT`: port for hosts without one (default: 9200)
/// - `ES_SCHEME`: `http` or `https` (default: http)
/// - `ES_SECURITY_USER`: `user:password` for basic auth
/// - `ES_SNIFF_INTERVAL_SECS`: reseed the node list at this interval
/// - `ES_REQUEST_TIMEOUT_SECS`: per-request timeout
/// - `ES_TEMPLATE_PREFIXES`, `ES_TEMPLATE_SHARDS`, `ES_TEMPLATE_REPLICAS`,
///   `ES_TEMPLATE_REFRESH_INTERVAL`: template settings
/// - `ES_INDEX_REFRESH_INTERVAL`: refresh interval of created indices
/// - `ES_BULK_ACTIONS`, `ES_BULK_SIZE_MB`, `ES_BULK_FLUSH_INTERVAL_SECS`,
///   `ES_BULK_CONCURRENT_REQUESTS`, `ES_BULK_BACKOFF_MILLIS`,
///   `ES_BULK_MAX_RETRIES`: bulk pipeline tuning
pub fn load_cluster_config() -> Result<ClusterConfig, AdminError> {
    cluster_config_from(|name| env::var(name).ok())
}

/// Build the cluster configuration from an arbitrary variable lookup.
pub fn cluster_config_from<F>(lookup: F) -> Result<ClusterConfig, AdminError>
where
    F: Fn(&str) -> Option<String>,
{
    let vars = Vars(lookup);

    let cluster_name = vars.required("ES_CLUSTER_NAME")?;
    let hosts = vars.required("ES_HOSTS")?;
    let mut config = ClusterConfig::new(cluster_name, hosts);

    if let Some(port) = vars.parse("ES_PORT")? {
        config.port = port;
    }
    if let Some(scheme) = vars.get("ES_SCHEME") {
        config.scheme = scheme.to_lowercase();
    }
    if let Some(user) = vars.get("ES_SECURITY_USER") {
        config.credentials = Some(
            Credentials::parse(&user).map_err(|e| AdminError::config(e.to_string()))?,
        );
    }
    config.sniff_interval = vars.parse("ES_SNIFF_INTERVAL_SECS")?.map(Duration::from_secs);
    config.request_timeout = vars.parse("ES_REQUEST_TIMEOUT_SECS")?.map(Duration::from_secs);

    if let Some(prefixes) = vars.get("ES_TEMPLATE_PREFIXES") {
        config.template.name_prefixes = prefixes;
    }
    if let Some(shards) = vars.parse("ES_TEMPLATE_SHARDS")? {
        config.template.number_of_shards = shards;
    }
    if let Some(replicas) = vars.parse("ES_TEMPLATE_REPLICAS")? {
        config.template.number_of_replicas = replicas;
    }
    if let Some(refresh) = vars.get("ES_TEMPLATE_REFRESH_INTERVAL") {
        config.template.refresh_interval = refresh;
    }
    if let Some(refresh) = vars.get("ES_INDEX_REFRESH_INTERVAL") {
        config.index_defaults.refresh_interval = refresh;
    }

    if let Some(actions) = vars.parse("ES_BULK_ACTIONS")? {
        config.bulk.bulk_actions = actions;
    }
    if let Some(mb) = vars.parse::<usize>("ES_BULK_SIZE_MB")? {
        config.bulk.bulk_size_bytes = mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| AdminError::config(format!("ES_BULK_SIZE_MB is too large: {}", mb)))?;
    }
    if let Some(secs) = vars.parse::<u64>("ES_BULK_FLUSH_INTERVAL_SECS")? {
        // 0 turns the flush timer off.
        config.bulk.flush_interval = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(concurrent) = vars.parse("ES_BULK_CONCURRENT_REQUESTS")? {
        config.bulk.concurrent_requests = concurrent;
    }
    if let Some(millis) = vars.parse("ES_BULK_BACKOFF_MILLIS")? {
        config.bulk.backoff.initial_delay = Duration::from_millis(millis);
    }
    if let Some(retries) = vars.parse("ES_BULK_MAX_RETRIES")? {
        config.bulk.backoff.max_retries = retries;
    }

    config
        .validate()
        .map_err(|e| AdminError::config(e.to_string()))?;
    Ok(config)
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Value of `name`, treating blank values as unset.
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, AdminError> {
        self.get(name)
            .ok_or_else(|| AdminError::config(format!("{} must be set", name)))
    }

    fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, AdminError> {
        match self.get(name) {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| AdminError::config(format!("{} has an invalid value: {}", name, value))),
            None => Ok(None),
        }
    }
}
