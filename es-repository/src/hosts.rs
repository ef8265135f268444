//! Host list parsing and resolution for the connection builder.

use std::net::SocketAddr;

use tracing::{debug, info};
use url::Url;

use crate::errors::RepositoryError;

/// A single entry of the configured host list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub host: String,
    pub port: Option<u16>,
}

impl HostSpec {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A bare IPv6 literal without brackets is taken as a host with no port.
    pub fn parse(value: &str) -> Self {
        if let Some(rest) = value.strip_prefix('[') {
            if let Some((host, tail)) = rest.split_once(']') {
                let port = tail.strip_prefix(':').and_then(|p| p.parse().ok());
                return Self {
                    host: host.to_string(),
                    port,
                };
            }
        }

        match value.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => match port.parse() {
                Ok(port) => Self {
                    host: host.to_string(),
                    port: Some(port),
                },
                Err(_) => Self {
                    host: value.to_string(),
                    port: None,
                },
            },
            _ => Self {
                host: value.to_string(),
                port: None,
            },
        }
    }

    fn lookup_target(&self, default_port: u16) -> String {
        let port = self.port.unwrap_or(default_port);
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, port)
        } else {
            format!("{}:{}", self.host, port)
        }
    }
}

/// Split a comma-separated host list.
///
/// Elements are trimmed, empty elements are dropped and duplicates keep
/// their first position.
pub fn parse_host_list(hosts: &str) -> Vec<HostSpec> {
    let mut specs: Vec<HostSpec> = Vec::new();
    for item in hosts.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let spec = HostSpec::parse(item);
        if !specs.contains(&spec) {
            specs.push(spec);
        }
    }
    specs
}

/// Build the node URL for a resolved address.
pub fn node_url(scheme: &str, addr: SocketAddr) -> Result<Url, RepositoryError> {
    // SocketAddr formats IPv6 with brackets already.
    Url::parse(&format!("{}://{}", scheme, addr))
        .map_err(|e| RepositoryError::config(format!("invalid node address {}: {}", addr, e)))
}

/// Resolve every host to a node URL.
///
/// The first address returned by the resolver is used. Any resolution
/// failure aborts the whole build.
pub async fn resolve_hosts(
    hosts: &[HostSpec],
    default_port: u16,
    scheme: &str,
) -> Result<Vec<Url>, RepositoryError> {
    let mut urls = Vec::with_capacity(hosts.len());

    for spec in hosts {
        info!(host = %spec.host, "Resolving host");

        let mut addrs = tokio::net::lookup_host(spec.lookup_target(default_port))
            .await
            .map_err(|source| RepositoryError::Resolve {
                host: spec.host.clone(),
                source,
            })?;

        let addr = addrs.next().ok_or_else(|| RepositoryError::Resolve {
            host: spec.host.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address returned"),
        })?;

        debug!(host = %spec.host, addr = %addr, "Resolved host");
        urls.push(node_url(scheme, addr)?);
    }

    Ok(urls)
}
