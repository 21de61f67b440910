use crate::adapter::server::serve_request;
use crate::adapter::Adapter;
use crate::configuration::ServerConfig;
use hyper_util::rt::TokioIo;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};

pub struct InsecureListener {
    binding_address: SocketAddr,
    adapter: Arc<Adapter>,
    timeouts: Arc<[Duration; 2]>,
}

impl InsecureListener {
    pub fn new(server_config: &ServerConfig, adapter: Arc<Adapter>) -> Self {
        Self {
            binding_address: super::binding_address(server_config),
            adapter,
            timeouts: super::timeouts(server_config),
        }
    }

    pub async fn serve(&self) -> Result<(), io::Error> {
        info!("Listening on {} (non-TLS)", self.binding_address);
        let listener = TcpListener::bind(self.binding_address).await?;

        loop {
            debug!("Waiting for incoming connection");
            let (tcp, remote_address) = listener.accept().await?;

            debug!("Accepted connection from {remote_address}");
            let stream = TokioIo::new(tcp);

            tokio::spawn(Box::pin(serve_request(
                stream,
                Arc::clone(&self.adapter),
                Arc::clone(&self.timeouts),
                remote_address,
            )));
        }
    }
}
