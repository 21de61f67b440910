use crate::adapter::server::serve_request;
use crate::adapter::Adapter;
use crate::configuration::{Error, ServerConfig, ServerTlsConfig};
use hyper_util::rt::TokioIo;
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

pub struct TlsListener {
    binding_address: SocketAddr,
    tls_acceptor: TlsAcceptor,
    adapter: Arc<Adapter>,
    timeouts: Arc<[Duration; 2]>,
}

impl TlsListener {
    pub fn new(server_config: &ServerConfig, adapter: Arc<Adapter>) -> Result<Self, Error> {
        let tls_config = server_config.tls.as_ref().ok_or_else(|| {
            Error::MissingExpectedTLSSection("TLS configuration is missing".to_string())
        })?;

        Ok(Self {
            binding_address: super::binding_address(server_config),
            tls_acceptor: Self::build_tls_acceptor(tls_config)?,
            adapter,
            timeouts: super::timeouts(server_config),
        })
    }

    fn build_tls_acceptor(tls_config: &ServerTlsConfig) -> Result<TlsAcceptor, Error> {
        debug!("Detected TLS configuration");
        let server_certs = CertificateDer::pem_file_iter(&tls_config.server_certificate_bundle)?
            .collect::<Result<_, _>>()?;
        let server_key = PrivateKeyDer::from_pem_file(&tls_config.server_private_key)?;

        let server_config = if let Some(client_ca_bundle) = tls_config.client_ca_bundle.as_ref() {
            debug!("Client CA bundle detected (will serve with TLS client authentication)");
            let client_certs: Vec<CertificateDer> =
                CertificateDer::pem_file_iter(client_ca_bundle)?.collect::<Result<_, _>>()?;

            let mut client_cert_store = RootCertStore::empty();
            for client_cert in client_certs {
                client_cert_store.add(client_cert)?;
            }

            let client_cert_verifier = WebPkiClientVerifier::builder(Arc::new(client_cert_store))
                .allow_unauthenticated()
                .build()?;

            rustls::ServerConfig::builder()
                .with_client_cert_verifier(client_cert_verifier)
                .with_single_cert(server_certs, server_key)?
        } else {
            debug!("No client CA bundle detected (will serve without TLS client authentication)");

            rustls::ServerConfig::builder()
                .with_no_client_auth()
                .with_single_cert(server_certs, server_key)?
        };

        Ok(TlsAcceptor::from(Arc::new(server_config)))
    }

    pub async fn serve(&self) -> Result<(), io::Error> {
        info!("Listening on {} (TLS)", self.binding_address);
        let listener = TcpListener::bind(self.binding_address).await?;

        loop {
            let (tcp, remote_address) = listener.accept().await?;

            let tls = match self.tls_acceptor.accept(tcp).await {
                Ok(tls) => tls,
                Err(error) => {
                    warn!("TLS handshake with {remote_address} failed: {error}");
                    continue;
                }
            };

            debug!("Accepted connection from {remote_address}");
            let stream = TokioIo::new(tls);

            tokio::spawn(Box::pin(serve_request(
                stream,
                Arc::clone(&self.adapter),
                Arc::clone(&self.timeouts),
                remote_address,
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_missing_certificate_files() {
        let tls_config = ServerTlsConfig {
            server_certificate_bundle: "/nonexistent/server.pem".to_string(),
            server_private_key: "/nonexistent/server.key".to_string(),
            client_ca_bundle: None,
        };

        assert!(matches!(
            TlsListener::build_tls_acceptor(&tls_config),
            Err(Error::Tls(_))
        ));
    }

    #[test]
    fn test_binding_address() {
        let server_config = ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5601,
            query_timeout: 30,
            query_timeout_grace_period: 5,
            tls: None,
        };

        assert_eq!(
            super::super::binding_address(&server_config).to_string(),
            "127.0.0.1:5601"
        );
        assert_eq!(
            *super::super::timeouts(&server_config),
            [Duration::from_secs(30), Duration::from_secs(5)]
        );
    }
}
