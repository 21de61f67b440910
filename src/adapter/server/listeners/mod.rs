pub mod insecure;
pub mod tls;

use crate::configuration::ServerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn binding_address(server_config: &ServerConfig) -> SocketAddr {
    SocketAddr::new(server_config.bind_address, server_config.port)
}

/// Connection lifetime followed by the graceful shutdown grace period.
fn timeouts(server_config: &ServerConfig) -> Arc<[Duration; 2]> {
    Arc::new([
        Duration::from_secs(server_config.query_timeout),
        Duration::from_secs(server_config.query_timeout_grace_period),
    ])
}
