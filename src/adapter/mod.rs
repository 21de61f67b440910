pub mod access_request;
pub mod api;
mod client_state;
pub mod credentials;
mod error;
pub mod keycloak;
pub mod params;
pub mod resolver;
pub mod response;
mod response_body;
pub mod server;
pub mod settings;


use crate::configuration::{self, AdapterConfig, Configuration, KeycloakConfig};
use crate::adapter::keycloak::{IdentityProvider, KeycloakClient, OidcEndpoints};
use crate::adapter::resolver::HostResolver;
use crate::adapter::settings::SettingsFile;
use std::path::PathBuf;

pub use client_state::{ClientSession, ClientState};
pub use error::Error;
pub use response_body::ResponseBody;

/// Everything the route handlers share: the identity provider, the one-shot
/// client session and the local files the service exposes.
pub struct Adapter {
    provider: Box<dyn IdentityProvider>,
    state: ClientState,
    resolver: HostResolver,
    settings: SettingsFile,
    keycloak_host: String,
    client_id: String,
    log_file: PathBuf,
}

impl Adapter {
    pub fn new(config: &Configuration) -> Result<Self, configuration::Error> {
        let provider = KeycloakClient::new(&config.keycloak)?;
        Ok(Self::with_provider(
            Box::new(provider),
            &config.keycloak,
            &config.adapter,
        ))
    }

    pub fn with_provider(
        provider: Box<dyn IdentityProvider>,
        keycloak: &KeycloakConfig,
        adapter: &AdapterConfig,
    ) -> Self {
        Self {
            provider,
            state: ClientState::new(),
            resolver: HostResolver::new(&keycloak.hosts_file),
            settings: SettingsFile::new(&keycloak.settings_file),
            keycloak_host: keycloak.address(),
            client_id: keycloak.client_id.clone(),
            log_file: PathBuf::from(&adapter.log_file),
        }
    }

    /// Discovered endpoints once configured, Keycloak's default layout before.
    fn endpoints(&self) -> OidcEndpoints {
        match self.state.session() {
            Some(session) => session.endpoints.clone(),
            None => self.provider.default_endpoints(),
        }
    }
}
