mod error;
mod leftover;

use crate::configuration::{self, ManifestConfig};
use crate::http_client::{HttpClient, HttpClientConfig};
use crate::metrics_provider::MANIFEST_VALIDATIONS;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::ACCEPT;
use hyper::{Method, Request};
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info, instrument, warn};

pub use error::Error;
pub use leftover::LeftoverFiles;

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9\-[:space:]]*$").expect("Invalid package name pattern")
});

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(?:\.[0-9]+)*$").expect("Invalid package version pattern")
});

#[derive(Clone, Debug, Default)]
pub struct ValidationOptions {
    /// Paths removed when the manifest is rejected.
    pub files: Vec<PathBuf>,
}

pub struct ManifestValidator {
    schema: PathBuf,
    http_client: HttpClient,
}

impl ManifestValidator {
    pub fn new(config: &ManifestConfig) -> Result<Self, configuration::Error> {
        let http_client = HttpClient::new(HttpClientConfig {
            server_ca_bundle: config.server_ca_bundle.clone(),
            max_redirect: None,
        })?;

        Ok(Self {
            schema: PathBuf::from(&config.schema),
            http_client,
        })
    }

    /// Validates `manifest`, removing `options.files` on any failure.
    #[instrument(skip(self, manifest))]
    pub async fn validate(&self, manifest: &Value, options: &ValidationOptions) -> Result<(), Error> {
        let leftovers = LeftoverFiles::new(options.files.clone());

        match self.check(manifest).await {
            Ok(()) => {
                MANIFEST_VALIDATIONS.with_label_values(&["accepted"]).inc();
                leftovers.disarm();
                info!("Manifest accepted");
                Ok(())
            }
            Err(error) => {
                MANIFEST_VALIDATIONS.with_label_values(&["rejected"]).inc();
                warn!("Manifest rejected ({}): {error}", error.status_code());
                Err(error)
            }
        }
    }

    async fn check(&self, manifest: &Value) -> Result<(), Error> {
        let schema = self.load_schema(manifest).await?;
        check_schema(&schema, manifest)?;
        check_name(manifest)?;
        check_version(manifest)
    }

    /// The schema named by the manifest's `$schema` key, or the configured one.
    async fn load_schema(&self, manifest: &Value) -> Result<Value, Error> {
        let Some(url) = manifest["$schema"].as_str() else {
            debug!("Loading schema from {}", self.schema.display());
            let schema = tokio::fs::read(&self.schema).await?;
            return Ok(serde_json::from_slice(&schema)?);
        };

        debug!("Fetching schema from {url}");
        let request = Request::builder()
            .method(Method::GET)
            .uri(url)
            .header(ACCEPT, "application/json")
            .body(Full::new(Bytes::new()))?;

        let response = self.http_client.send(request).await?;
        if !response.is_success() {
            return Err(Error::SchemaFetch {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).to_string(),
            });
        }

        Ok(response.json()?)
    }
}

fn check_schema(schema: &Value, manifest: &Value) -> Result<(), Error> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|error| Error::Schema(format!("Invalid schema: {error}")))?;

    let violations: String = validator
        .iter_errors(manifest)
        .map(|error| format!("{error}\n"))
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::Invalid(violations))
    }
}

fn check_name(manifest: &Value) -> Result<(), Error> {
    match manifest["name"].as_str() {
        Some(name) if name == name.to_lowercase() && NAME_PATTERN.is_match(name) => Ok(()),
        _ => Err(Error::NameInvalid),
    }
}

fn check_version(manifest: &Value) -> Result<(), Error> {
    match manifest["version"].as_str() {
        Some(version) if VERSION_PATTERN.is_match(version) => Ok(()),
        _ => Err(Error::VersionInvalid),
    }
}
