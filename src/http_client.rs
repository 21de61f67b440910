use crate::configuration;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::LOCATION;
use hyper::http::HeaderMap;
use hyper::{Request, Response, StatusCode};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::CertificateDer;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, PartialEq)]
pub enum Error {
    Transport(String),
    TooManyRedirects,
    InvalidRedirect(String),
    Body(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(err) => write!(f, "HTTP request failed: {err}"),
            Error::TooManyRedirects => write!(f, "Too many redirects"),
            Error::InvalidRedirect(err) => write!(f, "Invalid redirect: {err}"),
            Error::Body(err) => write!(f, "Unable to read response body: {err}"),
        }
    }
}

/// A fully read upstream response.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    max_redirect: u8,
}

#[derive(Clone, Debug, Default)]
pub struct HttpClientConfig {
    pub server_ca_bundle: Option<String>,
    pub max_redirect: Option<u8>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, configuration::Error> {
        let tls_config = build_tls_config(config.server_ca_bundle)?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            max_redirect: config.max_redirect.unwrap_or(5),
        })
    }

    pub async fn request(&self, mut request: Request<Full<Bytes>>) -> Result<Response<Incoming>, Error> {
        let mut redirects = 0;

        loop {
            let response = self
                .client
                .request(request.clone())
                .await
                .map_err(|e| {
                    error!("HTTP request to {} failed: {e}", request.uri());
                    Error::Transport(e.to_string())
                })?;

            if !response.status().is_redirection() {
                return Ok(response);
            }

            if redirects >= self.max_redirect {
                error!("Too many redirections from {}", request.uri());
                return Err(Error::TooManyRedirects);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|location| location.to_str().ok())
                .ok_or_else(|| Error::InvalidRedirect("Missing Location header".to_string()))?;

            debug!("Following redirect to {location}");
            *request.uri_mut() = location
                .parse()
                .map_err(|e| Error::InvalidRedirect(format!("{e}")))?;

            redirects += 1;
        }
    }

    /// Sends the request and reads the whole response body.
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<HttpResponse, Error> {
        let response = self.request(request).await?;
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| Error::Body(e.to_string()))?
            .to_bytes();

        Ok(HttpResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

fn build_tls_config(ca_bundle: Option<String>) -> Result<rustls::ClientConfig, configuration::Error> {
    let mut root_store = RootCertStore::empty();

    let certs = if let Some(bundle) = ca_bundle {
        CertificateDer::pem_file_iter(bundle)?.collect::<Result<Vec<_>, _>>()?
    } else {
        rustls_native_certs::load_native_certs().certs
    };

    root_store.add_parsable_certificates(certs);

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Method;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn get(uri: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Full::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_reads_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/schema.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"type":"object"}"#))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        let response = client
            .send(get(&format!("{}/schema.json", mock_server.uri())))
            .await
            .unwrap();

        assert!(response.is_success());
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["type"], "object");
    }

    #[tokio::test]
    async fn test_follows_redirects() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/new", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        let response = client
            .send(get(&format!("{}/old", mock_server.uri())))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"moved");
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/loop", mock_server.uri()).as_str()),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(HttpClientConfig {
            server_ca_bundle: None,
            max_redirect: Some(2),
        })
        .unwrap();
        let result = client
            .send(get(&format!("{}/loop", mock_server.uri())))
            .await;

        assert_eq!(result.unwrap_err(), Error::TooManyRedirects);
    }

    #[tokio::test]
    async fn test_transport_error() {
        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        let result = client.send(get("http://127.0.0.1:1/unreachable")).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
