use serde::Deserialize;
use std::env;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

mod error;

pub use error::Error;

pub const KEYCLOAK_ADDRESS_VAR: &str = "KEYCLOAK_ADDRESS";

#[derive(Clone, Debug, Deserialize)]
pub struct Configuration {
    pub server: ServerConfig,
    #[serde(default)]
    pub keycloak: KeycloakConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    pub bind_address: IpAddr,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    #[serde(default = "ServerConfig::default_query_timeout")]
    pub query_timeout: u64,
    #[serde(default = "ServerConfig::default_query_timeout_grace_period")]
    pub query_timeout_grace_period: u64,
    pub tls: Option<ServerTlsConfig>,
}

impl ServerConfig {
    fn default_port() -> u16 {
        5600
    }

    fn default_query_timeout() -> u64 {
        3600
    }

    fn default_query_timeout_grace_period() -> u64 {
        60
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerTlsConfig {
    pub server_certificate_bundle: String,
    pub server_private_key: String,
    pub client_ca_bundle: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct KeycloakConfig {
    /// Explicit base URL, e.g. `http://keycloak:8080/auth`. Built from the other fields when absent.
    pub url: Option<String>,
    #[serde(default = "KeycloakConfig::default_host")]
    pub host: String,
    #[serde(default = "KeycloakConfig::default_scheme")]
    pub scheme: String,
    #[serde(default = "KeycloakConfig::default_port")]
    pub port: u16,
    #[serde(default = "KeycloakConfig::default_base_path")]
    pub base_path: String,
    #[serde(default = "KeycloakConfig::default_realm")]
    pub realm: String,
    #[serde(default = "KeycloakConfig::default_client_id")]
    pub client_id: String,
    #[serde(default = "KeycloakConfig::default_hosts_file")]
    pub hosts_file: String,
    #[serde(default = "KeycloakConfig::default_settings_file")]
    pub settings_file: String,
    pub server_ca_bundle: Option<String>,
    #[serde(default = "KeycloakConfig::default_max_redirect")]
    pub max_redirect: u8,
}

impl KeycloakConfig {
    fn default_host() -> String {
        "localhost".to_string()
    }

    fn default_scheme() -> String {
        "http".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_base_path() -> String {
        "/auth".to_string()
    }

    fn default_realm() -> String {
        "master".to_string()
    }

    fn default_client_id() -> String {
        "adapter".to_string()
    }

    fn default_hosts_file() -> String {
        "/etc/hosts".to_string()
    }

    fn default_settings_file() -> String {
        "config/keycloak.yml".to_string()
    }

    fn default_max_redirect() -> u8 {
        5
    }

    /// Keycloak host name: `KEYCLOAK_ADDRESS` when set, the configured `host` otherwise.
    pub fn address(&self) -> String {
        match env::var(KEYCLOAK_ADDRESS_VAR) {
            Ok(address) if !address.trim().is_empty() => address.trim().to_string(),
            _ => self.host.clone(),
        }
    }

    pub fn base_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.trim_end_matches('/').to_string();
        }

        let base_path = self.base_path.trim_end_matches('/');
        format!(
            "{}://{}:{}{base_path}",
            self.scheme,
            self.address(),
            self.port
        )
    }
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: Self::default_host(),
            scheme: Self::default_scheme(),
            port: Self::default_port(),
            base_path: Self::default_base_path(),
            realm: Self::default_realm(),
            client_id: Self::default_client_id(),
            hosts_file: Self::default_hosts_file(),
            settings_file: Self::default_settings_file(),
            server_ca_bundle: None,
            max_redirect: Self::default_max_redirect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AdapterConfig {
    #[serde(default = "AdapterConfig::default_log_file")]
    pub log_file: String,
}

impl AdapterConfig {
    fn default_log_file() -> String {
        "log/production.log".to_string()
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            log_file: Self::default_log_file(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManifestConfig {
    #[serde(default = "ManifestConfig::default_schema")]
    pub schema: String,
    pub server_ca_bundle: Option<String>,
}

impl ManifestConfig {
    fn default_schema() -> String {
        "schemas/package_schema.json".to_string()
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            schema: Self::default_schema(),
            server_ca_bundle: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TracingConfig {
    pub endpoint: String,
    pub sampling_rate: f64,
}

impl Configuration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let config_str = fs::read_to_string(path)?;
        Self::load_from_str(&config_str)
    }

    pub fn load_from_str(slice: &str) -> Result<Self, Error> {
        let config: Configuration = toml::from_str(slice).map_err(|e| {
            println!("Configuration file format error:");
            println!("{e}");
            Error::ConfigurationFileFormat(e.to_string())
        })?;

        if config.keycloak.realm.trim().is_empty() {
            return Err(Error::InvalidSetting(
                "keycloak.realm must not be empty".to_string(),
            ));
        }

        if let Some(url) = &config.keycloak.url {
            url.parse::<hyper::Uri>()
                .map_err(|e| Error::InvalidSetting(format!("Invalid keycloak.url: {e}")))?;
        }

        Ok(config)
    }
}
