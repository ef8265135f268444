//! Configuration types for the ClusterRepository.
//!
//! Every tuning value used by the repository lives here with a named field.
//! The `Default` impls carry the values the repository has always run with.

use std::time::Duration;

use crate::errors::RepositoryError;

/// Default REST port of a cluster node.
pub const DEFAULT_PORT: u16 = 9200;

/// Upper bound of `BulkConfig::concurrent_requests`.
pub const MAX_CONCURRENT_REQUESTS: usize = 1024;

/// Upper bound of `BackoffConfig::max_retries`.
pub const MAX_RETRIES: usize = 32;

/// Connection configuration for the cluster.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Name of the cluster the repository expects to talk to.
    pub cluster_name: String,
    /// Comma-separated list of hosts, each `host` or `host:port`.
    pub hosts: String,
    /// Port used for hosts that do not carry their own.
    pub port: u16,
    /// URL scheme of the node addresses (`http` or `https`).
    pub scheme: String,
    /// Basic auth credentials, if security is enabled on the cluster.
    pub credentials: Option<Credentials>,
    /// Reseed the node list from the cluster at this interval.
    /// `None` keeps the configured hosts only.
    pub sniff_interval: Option<Duration>,
    /// Timeout applied to every request. `None` uses the client default.
    pub request_timeout: Option<Duration>,
    /// Settings for the index templates built by `build_template`.
    pub template: TemplateConfig,
    /// Settings applied by `create`.
    pub index_defaults: IndexDefaults,
    /// Bulk pipeline tuning.
    pub bulk: BulkConfig,
}

impl ClusterConfig {
    /// Create a config for the given cluster and host list with default tuning.
    pub fn new(cluster_name: impl Into<String>, hosts: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            hosts: hosts.into(),
            port: DEFAULT_PORT,
            scheme: "http".to_string(),
            credentials: None,
            sniff_interval: None,
            request_timeout: None,
            template: TemplateConfig::default(),
            index_defaults: IndexDefaults::default(),
            bulk: BulkConfig::default(),
        }
    }

    /// Set the basic auth credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the bulk pipeline tuning.
    pub fn with_bulk(mut self, bulk: BulkConfig) -> Self {
        self.bulk = bulk;
        self
    }

    /// Set the template settings.
    pub fn with_template(mut self, template: TemplateConfig) -> Self {
        self.template = template;
        self
    }

    /// Check the values that cannot be validated by the cluster itself.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.cluster_name.trim().is_empty() {
            return Err(RepositoryError::config("cluster name must not be empty"));
        }
        if self.hosts.trim().is_empty() {
            return Err(RepositoryError::config("host list must not be empty"));
        }
        if self.scheme != "http" && self.scheme != "https" {
            return Err(RepositoryError::config(format!(
                "unsupported scheme '{}'",
                self.scheme
            )));
        }
        self.bulk.validate()
    }
}

/// Basic auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse a `user:password` pair. The password may itself contain `:`.
    pub fn parse(value: &str) -> Result<Self, RepositoryError> {
        let (username, password) = value
            .split_once(':')
            .ok_or_else(|| RepositoryError::config("credentials must be 'user:password'"))?;
        if username.is_empty() {
            return Err(RepositoryError::config("credentials user must not be empty"));
        }
        Ok(Self::new(username, password))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Settings of the index templates submitted by `build_template`.
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    /// Comma-separated list of template name prefixes. Each prefix becomes
    /// one template matching `prefix*`.
    pub name_prefixes: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub refresh_interval: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            name_prefixes: String::new(),
            number_of_shards: 18,
            number_of_replicas: 1,
            refresh_interval: "1s".to_string(),
        }
    }
}

/// Settings applied to indices created through `create`.
#[derive(Debug, Clone)]
pub struct IndexDefaults {
    pub refresh_interval: String,
}

impl Default for IndexDefaults {
    fn default() -> Self {
        Self {
            refresh_interval: "10s".to_string(),
        }
    }
}

/// Bulk pipeline tuning.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    /// Dispatch a batch once it holds this many actions. 0 disables the limit.
    pub bulk_actions: usize,
    /// Dispatch a batch once its payload reaches this many bytes. 0 disables the limit.
    pub bulk_size_bytes: usize,
    /// Dispatch any pending actions at this interval. `None` disables the timer.
    pub flush_interval: Option<Duration>,
    /// Maximum number of batches in flight. 0 sends batches inline.
    pub concurrent_requests: usize,
    /// Retry policy for rejected batches.
    pub backoff: BackoffConfig,
}

impl BulkConfig {
    /// Reject tuning values the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.concurrent_requests > MAX_CONCURRENT_REQUESTS {
            return Err(RepositoryError::config(format!(
                "concurrent_requests must be at most {}, got {}",
                MAX_CONCURRENT_REQUESTS, self.concurrent_requests
            )));
        }
        if self.backoff.max_retries > MAX_RETRIES {
            return Err(RepositoryError::config(format!(
                "max_retries must be at most {}, got {}",
                MAX_RETRIES, self.backoff.max_retries
            )));
        }
        Ok(())
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            bulk_actions: 5000,
            bulk_size_bytes: 10 * 1024 * 1024,
            flush_interval: Some(Duration::from_secs(10)),
            concurrent_requests: 18,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Exponential backoff for rejected bulk requests.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry; each further retry doubles it.
    pub initial_delay: Duration,
    /// Number of retries after the first attempt.
    pub max_retries: usize,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_retries: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_defaults() {
        let bulk = BulkConfig::default();

        assert_eq!(bulk.bulk_actions, 5000);
        assert_eq!(bulk.bulk_size_bytes, 10 * 1024 * 1024);
        assert_eq!(bulk.flush_interval, Some(Duration::from_secs(10)));
        assert_eq!(bulk.concurrent_requests, 18);
        assert_eq!(bulk.backoff.initial_delay, Duration::from_millis(100));
        assert_eq!(bulk.backoff.max_retries, 3);
    }

    #[test]
    fn test_template_and_index_defaults() {
        let template = TemplateConfig::default();
        assert!(template.name_prefixes.is_empty());
        assert_eq!(template.number_of_shards, 18);
        assert_eq!(template.number_of_replicas, 1);
        assert_eq!(template.refresh_interval, "1s");

        assert_eq!(IndexDefaults::default().refresh_interval, "10s");
    }

    #[test]
    fn test_credentials_parse() {
        let credentials = Credentials::parse("elastic:chan:geme").unwrap();
        assert_eq!(credentials.username, "elastic");
        assert_eq!(credentials.password, "chan:geme");

        assert!(Credentials::parse("elastic").is_err());
        assert!(Credentials::parse(":secret").is_err());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials::new("elastic", "changeme");
        let printed = format!("{:?}", credentials);
        assert!(printed.contains("elastic"));
        assert!(!printed.contains("changeme"));
    }

    #[test]
    fn test_validate() {
        assert!(ClusterConfig::new("logs", "h1,h2").validate().is_ok());
        assert!(ClusterConfig::new("", "h1").validate().is_err());
        assert!(ClusterConfig::new("logs", "  ").validate().is_err());

        let mut config = ClusterConfig::new("logs", "h1");
        config.scheme = "ftp".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bulk_limits() {
        let mut bulk = BulkConfig::default();
        bulk.concurrent_requests = MAX_CONCURRENT_REQUESTS;
        assert!(bulk.validate().is_ok());

        // Would wrap to 1 when narrowed to u32.
        bulk.concurrent_requests = 4_294_967_297;
        assert!(matches!(bulk.validate(), Err(RepositoryError::ConfigError(_))));

        let mut bulk = BulkConfig::default();
        bulk.backoff.max_retries = MAX_RETRIES + 1;
        assert!(bulk.validate().is_err());

        let config = ClusterConfig::new("logs", "h1").with_bulk(BulkConfig {
            concurrent_requests: usize::MAX,
            ..BulkConfig::default()
        });
        assert!(matches!(config.validate(), Err(RepositoryError::ConfigError(_))));
    }
}
