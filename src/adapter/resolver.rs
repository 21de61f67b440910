use crate::adapter::Error;
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::net::lookup_host;
use tracing::{debug, warn};

/// Resolves a host name the way the system resolver order does: hosts file first, then DNS.
#[derive(Clone, Debug)]
pub struct HostResolver {
    hosts_file: PathBuf,
}

impl HostResolver {
    pub fn new<P: Into<PathBuf>>(hosts_file: P) -> Self {
        Self {
            hosts_file: hosts_file.into(),
        }
    }

    pub async fn resolve(&self, host: &str) -> Result<IpAddr, Error> {
        if let Ok(address) = host.parse::<IpAddr>() {
            return Ok(address);
        }

        if let Some(address) = self.lookup_hosts_file(host).await {
            debug!("Resolved '{host}' to {address} from {:?}", self.hosts_file);
            return Ok(address);
        }

        let mut addresses = lookup_host((host, 0)).await.map_err(|error| {
            warn!("Unable to resolve '{host}': {error}");
            Error::Internal(format!("Unable to resolve {host}"))
        })?;

        addresses
            .next()
            .map(|address| address.ip())
            .ok_or_else(|| Error::Internal(format!("Unable to resolve {host}")))
    }

    async fn lookup_hosts_file(&self, host: &str) -> Option<IpAddr> {
        let content = match tokio::fs::read_to_string(&self.hosts_file).await {
            Ok(content) => content,
            Err(error) => {
                debug!("Unable to read hosts file {:?}: {error}", self.hosts_file);
                return None;
            }
        };

        find_in_hosts(&content, host)
    }
}

fn find_in_hosts(content: &str, host: &str) -> Option<IpAddr> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let address = fields.next()?.parse::<IpAddr>().ok()?;
            fields
                .any(|name| name.eq_ignore_ascii_case(host))
                .then_some(address)
        })
        .next()
}
