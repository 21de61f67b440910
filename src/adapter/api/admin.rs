use crate::adapter::keycloak::IdentityProvider;
use crate::adapter::params::RequestParams;
use crate::adapter::response::{self, TEXT_PLAIN};
use crate::adapter::{Adapter, ClientSession, Error, ResponseBody};
use hyper::header::CONTENT_TYPE;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Serialize)]
struct Interface {
    uri: &'static str,
    method: &'static str,
    description: &'static str,
}

const INTERFACES: &[Interface] = &[
    Interface { uri: "/", method: "GET", description: "List of available interfaces" },
    Interface { uri: "/log", method: "GET", description: "Adapter log file" },
    Interface { uri: "/config", method: "GET", description: "Keycloak settings" },
    Interface { uri: "/config", method: "POST", description: "Adapter client secret bootstrap" },
    Interface { uri: "/public-key", method: "GET", description: "Realm public key" },
    Interface { uri: "/register/user", method: "POST", description: "User registration" },
    Interface { uri: "/register/service", method: "POST", description: "Service registration" },
    Interface { uri: "/login/user", method: "POST", description: "User login" },
    Interface { uri: "/login/service", method: "POST", description: "Service login" },
    Interface { uri: "/authenticate", method: "POST", description: "Token request" },
    Interface { uri: "/authorize", method: "GET", description: "Authorization decision" },
    Interface { uri: "/userinfo", method: "POST", description: "User information" },
    Interface { uri: "/logout", method: "POST", description: "User logout" },
    Interface { uri: "/refresh", method: "POST", description: "Token refresh" },
    Interface { uri: "/users", method: "GET", description: "User query" },
    Interface { uri: "/services", method: "GET", description: "Service query" },
    Interface { uri: "/roles", method: "GET", description: "Role query" },
];

pub trait AdapterAdminHandlersExt {
    async fn handle_get_interfaces(&self) -> Result<Response<ResponseBody>, Error>;

    async fn handle_get_log(&self) -> Result<Response<ResponseBody>, Error>;

    async fn handle_get_config(&self) -> Result<Response<ResponseBody>, Error>;

    async fn handle_post_config(
        &self,
        parts: &Parts,
        body: &[u8],
        remote_address: Option<SocketAddr>,
    ) -> Result<Response<ResponseBody>, Error>;

    async fn handle_get_public_key(&self) -> Result<Response<ResponseBody>, Error>;
}

impl AdapterAdminHandlersExt for Adapter {
    async fn handle_get_interfaces(&self) -> Result<Response<ResponseBody>, Error> {
        let body = serde_json::to_vec(INTERFACES)?;
        response::text(StatusCode::OK, body)
    }

    #[instrument(skip(self))]
    async fn handle_get_log(&self) -> Result<Response<ResponseBody>, Error> {
        match tokio::fs::File::open(&self.log_file).await {
            Ok(file) => Ok(Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, TEXT_PLAIN)
                .body(ResponseBody::streaming(file))?),
            Err(err) => {
                error!("Error reading log file: {err}");
                response::text(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Error reading log file: {err}"),
                )
            }
        }
    }

    #[instrument(skip(self))]
    async fn handle_get_config(&self) -> Result<Response<ResponseBody>, Error> {
        let settings = self.settings.load_json().await?;
        response::json(StatusCode::OK, &settings)
    }

    #[instrument(skip(self, parts, body))]
    async fn handle_post_config(
        &self,
        parts: &Parts,
        body: &[u8],
        remote_address: Option<SocketAddr>,
    ) -> Result<Response<ResponseBody>, Error> {
        let keycloak_address = self.resolver.resolve(&self.keycloak_host).await?;
        let caller = remote_address.map(|address| address.ip().to_canonical());

        if caller != Some(keycloak_address.to_canonical()) {
            warn!("Configuration attempt from {caller:?}, expected {keycloak_address}");
            return Err(Error::Unauthorized(None));
        }

        if self.state.is_configured() {
            return Err(Error::Conflict("Secret key is already defined.".to_string()));
        }

        let params = RequestParams::negotiate(parts, body)?;
        let secret = params
            .get_str("secret")
            .ok_or_else(|| Error::bad_request("Client secret is not provided"))?;

        let guard = self.state.claim()?;

        let endpoints = self.provider.discover().await?;
        let access_token = self.provider.adapter_token(&endpoints, secret).await?;

        guard.install(ClientSession {
            client_secret: secret.to_string(),
            access_token,
            endpoints,
        });

        info!("Adapter configured by {keycloak_address}");
        response::empty(StatusCode::OK)
    }

    #[instrument(skip(self))]
    async fn handle_get_public_key(&self) -> Result<Response<ResponseBody>, Error> {
        let stored = match self.settings.realm_public_key().await {
            Ok(key) => key,
            Err(error) => {
                debug!("No stored realm public key: {error}");
                None
            }
        };

        let public_key = match stored {
            Some(key) => key,
            None => {
                let key = self.provider.realm_public_key().await?;
                self.settings.store_realm_public_key(&key).await?;
                key
            }
        };

        response::json(StatusCode::OK, &json!({ "public-key": public_key }))
    }
}
