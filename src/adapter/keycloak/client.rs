use super::{
    AdminCollection, IdentityProvider, OidcEndpoints, TokenGrant, UpstreamResponse,
    UserRegistration,
};
use crate::adapter::client_state::ClientSession;
use crate::adapter::params::{APPLICATION_FORM, APPLICATION_JSON};
use crate::adapter::Error;
use crate::configuration::{self, KeycloakConfig};
use crate::http_client::{HttpClient, HttpClientConfig, HttpResponse};
use crate::metrics_provider::PROVIDER_REQUESTS;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use hyper::{Method, Request, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

const UMA_TICKET_GRANT: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";

/// Keycloak OIDC and Admin REST API client for a single realm.
pub struct KeycloakClient {
    http_client: HttpClient,
    base_url: String,
    realm: String,
    client_id: String,
}

enum Payload {
    None,
    Json(Vec<u8>),
    Form(String),
}

impl KeycloakClient {
    pub fn new(config: &KeycloakConfig) -> Result<Self, configuration::Error> {
        let http_client = HttpClient::new(HttpClientConfig {
            server_ca_bundle: config.server_ca_bundle.clone(),
            max_redirect: Some(config.max_redirect),
        })?;

        Ok(Self {
            http_client,
            base_url: config.base_url(),
            realm: config.realm.clone(),
            client_id: config.client_id.clone(),
        })
    }

    fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.base_url, self.realm)
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}/admin/realms/{}/{path}", self.base_url, self.realm)
    }

    async fn send(
        &self,
        operation: &str,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        payload: Payload,
    ) -> Result<HttpResponse, Error> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(ACCEPT, APPLICATION_JSON);

        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let body = match payload {
            Payload::None => Full::default(),
            Payload::Json(body) => {
                builder = builder.header(CONTENT_TYPE, APPLICATION_JSON);
                Full::new(Bytes::from(body))
            }
            Payload::Form(body) => {
                builder = builder.header(CONTENT_TYPE, APPLICATION_FORM);
                Full::new(Bytes::from(body))
            }
        };

        debug!("Keycloak {operation}: {uri}");
        let result = self.http_client.send(builder.body(body)?).await;

        let outcome = match &result {
            Ok(response) if response.is_success() => "success",
            Ok(_) => "rejected",
            Err(_) => "error",
        };
        PROVIDER_REQUESTS
            .with_label_values(&[operation, outcome])
            .inc();

        Ok(result?)
    }

    /// Sends the request and turns any non-success answer into `Error::Upstream`.
    async fn send_checked(
        &self,
        operation: &str,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        payload: Payload,
    ) -> Result<HttpResponse, Error> {
        let response = self.send(operation, method, uri, bearer, payload).await?;
        if !response.is_success() {
            warn!(
                "Keycloak {operation} failed with {}: {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            );
            return Err(Error::Upstream {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }

    async fn admin_get(&self, session: &ClientSession, operation: &str, path: &str) -> Result<Value, Error> {
        let response = self
            .send_checked(
                operation,
                Method::GET,
                &self.admin_url(path),
                Some(&session.access_token),
                Payload::None,
            )
            .await?;
        Ok(response.json()?)
    }

    async fn admin_write<T: Serialize + ?Sized>(
        &self,
        session: &ClientSession,
        operation: &str,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<HttpResponse, Error> {
        self.send_checked(
            operation,
            method,
            &self.admin_url(path),
            Some(&session.access_token),
            Payload::Json(serde_json::to_vec(body)?),
        )
        .await
    }

    async fn realm_role(&self, session: &ClientSession, name: &str) -> Result<Value, Error> {
        self.admin_get(session, "get_role", &format!("roles/{}", encode_segment(name)))
            .await
    }

    async fn find_user_id(&self, session: &ClientSession, username: &str) -> Result<Option<String>, Error> {
        let query = serde_urlencoded::to_string([("username", username), ("exact", "true")])?;
        let users = self
            .admin_get(session, "find_user", &format!("users?{query}"))
            .await?;

        Ok(users
            .as_array()
            .into_iter()
            .flatten()
            .find(|user| user["username"].as_str() == Some(username))
            .and_then(|user| user["id"].as_str())
            .map(ToString::to_string))
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    fn default_endpoints(&self) -> OidcEndpoints {
        OidcEndpoints::for_realm(&self.realm_url())
    }

    #[instrument(skip(self))]
    async fn discover(&self) -> Result<OidcEndpoints, Error> {
        let uri = format!("{}/.well-known/openid-configuration", self.realm_url());
        let response = self
            .send_checked("discover", Method::GET, &uri, None, Payload::None)
            .await?;

        let endpoints: OidcEndpoints = response.json()?;
        if endpoints.token_endpoint.is_empty() || endpoints.introspection_endpoint.is_empty() {
            return Err(Error::Internal(
                "OpenID configuration is missing token endpoints".to_string(),
            ));
        }

        info!("Discovered OpenID endpoints of realm '{}'", self.realm);
        Ok(endpoints)
    }

    async fn token(
        &self,
        endpoints: &OidcEndpoints,
        grant: &TokenGrant,
    ) -> Result<UpstreamResponse, Error> {
        debug!("Requesting token: {grant:?}");
        let response = self
            .send(
                "token",
                Method::POST,
                &endpoints.token_endpoint,
                None,
                Payload::Form(serde_urlencoded::to_string(grant)?),
            )
            .await?;

        Ok(UpstreamResponse {
            status: response.status,
            body: response.body,
        })
    }

    async fn adapter_token(
        &self,
        endpoints: &OidcEndpoints,
        client_secret: &str,
    ) -> Result<String, Error> {
        let grant = TokenGrant::ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: client_secret.to_string(),
        };

        let response = self.token(endpoints, &grant).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }

        let token: Value = serde_json::from_slice(&response.body)?;
        token["access_token"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| Error::Internal("Token response has no access_token".to_string()))
    }

    #[instrument(skip(self, session, token))]
    async fn introspect(
        &self,
        session: &ClientSession,
        token: &str,
    ) -> Result<UpstreamResponse, Error> {
        let form = serde_urlencoded::to_string([
            ("token", token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", session.client_secret.as_str()),
        ])?;

        let response = self
            .send(
                "introspect",
                Method::POST,
                &session.endpoints.introspection_endpoint,
                None,
                Payload::Form(form),
            )
            .await?;

        Ok(UpstreamResponse {
            status: response.status,
            body: response.body,
        })
    }

    #[instrument(skip(self, session, token))]
    async fn decide(
        &self,
        session: &ClientSession,
        token: &str,
        permission: &str,
    ) -> Result<bool, Error> {
        let form = serde_urlencoded::to_string([
            ("grant_type", UMA_TICKET_GRANT),
            ("audience", self.client_id.as_str()),
            ("permission", permission),
            ("response_mode", "decision"),
        ])?;

        let response = self
            .send(
                "decide",
                Method::POST,
                &session.endpoints.token_endpoint,
                Some(token),
                Payload::Form(form),
            )
            .await?;

        match response.status {
            StatusCode::OK => {
                let decision: Value = response.json()?;
                Ok(decision["result"].as_bool().unwrap_or(false))
            }
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                debug!("Permission '{permission}' denied");
                Ok(false)
            }
            status => Err(Error::Upstream {
                status,
                body: response.body,
            }),
        }
    }

    #[instrument(skip(self, session, token))]
    async fn userinfo(
        &self,
        session: &ClientSession,
        token: &str,
    ) -> Result<UpstreamResponse, Error> {
        let response = self
            .send(
                "userinfo",
                Method::GET,
                &session.endpoints.userinfo_endpoint,
                Some(token),
                Payload::None,
            )
            .await?;

        Ok(UpstreamResponse {
            status: response.status,
            body: response.body,
        })
    }

    #[instrument(skip(self, session))]
    async fn logout(&self, session: &ClientSession, user_id: &str) -> Result<(), Error> {
        self.send_checked(
            "logout",
            Method::POST,
            &self.admin_url(&format!("users/{}/logout", encode_segment(user_id))),
            Some(&session.access_token),
            Payload::None,
        )
        .await?;

        info!("Sessions of user {user_id} ended");
        Ok(())
    }

    async fn realm_public_key(&self) -> Result<String, Error> {
        let response = self
            .send_checked(
                "realm_public_key",
                Method::GET,
                &self.realm_url(),
                None,
                Payload::None,
            )
            .await?;

        let realm: Value = response.json()?;
        realm["public_key"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| Error::Internal("Realm has no public key".to_string()))
    }

    #[instrument(skip(self, session))]
    async fn register_user(
        &self,
        session: &ClientSession,
        user: &UserRegistration,
    ) -> Result<String, Error> {
        let response = self
            .admin_write(
                session,
                "register_user",
                Method::POST,
                "users",
                &user.to_representation(),
            )
            .await?;

        let from_location = response
            .header(LOCATION.as_str())
            .and_then(|location| location.rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(ToString::to_string);

        let user_id = match from_location {
            Some(user_id) => user_id,
            None => self
                .find_user_id(session, &user.username)
                .await?
                .ok_or_else(|| Error::Internal("Created user not found".to_string()))?,
        };

        info!("User '{}' registered with id {user_id}", user.username);
        Ok(user_id)
    }

    #[instrument(skip(self, session))]
    async fn delete_user(&self, session: &ClientSession, username: &str) -> Result<(), Error> {
        let Some(user_id) = self.find_user_id(session, username).await? else {
            debug!("User '{username}' does not exist, nothing to delete");
            return Ok(());
        };

        self.send_checked(
            "delete_user",
            Method::DELETE,
            &self.admin_url(&format!("users/{}", encode_segment(&user_id))),
            Some(&session.access_token),
            Payload::None,
        )
        .await?;

        info!("User '{username}' deleted");
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn set_user_groups(
        &self,
        session: &ClientSession,
        user_type: &str,
        user_id: &str,
    ) -> Result<(), Error> {
        let query = serde_urlencoded::to_string([("search", user_type)])?;
        let groups = self
            .admin_get(session, "find_group", &format!("groups?{query}"))
            .await?;

        let group_id = groups
            .as_array()
            .into_iter()
            .flatten()
            .find(|group| group["name"].as_str() == Some(user_type))
            .and_then(|group| group["id"].as_str())
            .ok_or_else(|| {
                warn!("No group found for user type '{user_type}'");
                Error::Internal(format!("Group '{user_type}' not found"))
            })?;

        self.admin_write(
            session,
            "set_user_groups",
            Method::PUT,
            &format!(
                "users/{}/groups/{}",
                encode_segment(user_id),
                encode_segment(group_id)
            ),
            &json!({}),
        )
        .await?;

        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn set_user_roles(
        &self,
        session: &ClientSession,
        user_type: &str,
        user_id: &str,
    ) -> Result<(), Error> {
        let role = self.realm_role(session, user_type).await?;

        self.admin_write(
            session,
            "set_user_roles",
            Method::POST,
            &format!("users/{}/role-mappings/realm", encode_segment(user_id)),
            &[role],
        )
        .await?;

        Ok(())
    }

    #[instrument(skip(self, session, client))]
    async fn register_client(&self, session: &ClientSession, client: &Value) -> Result<(), Error> {
        self.admin_write(session, "register_client", Method::POST, "clients", client)
            .await?;

        info!("Client '{}' registered", client["clientId"]);
        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn set_service_roles(
        &self,
        session: &ClientSession,
        client_id: &str,
    ) -> Result<(String, Value), Error> {
        self.admin_write(
            session,
            "create_role",
            Method::POST,
            "roles",
            &json!({
                "name": client_id,
                "description": format!("Role of the {client_id} service"),
            }),
        )
        .await?;

        let query = serde_urlencoded::to_string([("clientId", client_id)])?;
        let clients = self
            .admin_get(session, "find_client", &format!("clients?{query}"))
            .await?;

        let client_uuid = clients
            .as_array()
            .into_iter()
            .flatten()
            .find(|client| client["clientId"].as_str() == Some(client_id))
            .and_then(|client| client["id"].as_str())
            .map(ToString::to_string)
            .ok_or_else(|| Error::Internal(format!("Client '{client_id}' not found")))?;

        let role = self.realm_role(session, client_id).await?;
        Ok((client_uuid, role))
    }

    #[instrument(skip(self, session, role))]
    async fn set_service_account_roles(
        &self,
        session: &ClientSession,
        client_uuid: &str,
        role: &Value,
    ) -> Result<(), Error> {
        let service_account = self
            .admin_get(
                session,
                "service_account_user",
                &format!("clients/{}/service-account-user", encode_segment(client_uuid)),
            )
            .await?;

        let user_id = service_account["id"].as_str().ok_or_else(|| {
            Error::Internal("Client has no service account user".to_string())
        })?;

        self.admin_write(
            session,
            "set_service_account_roles",
            Method::POST,
            &format!("users/{}/role-mappings/realm", encode_segment(user_id)),
            &[role],
        )
        .await?;

        Ok(())
    }

    #[instrument(skip(self, session))]
    async fn query(
        &self,
        session: &ClientSession,
        collection: AdminCollection,
        params: &[(String, String)],
    ) -> Result<UpstreamResponse, Error> {
        let mut uri = self.admin_url(collection.path());
        if !params.is_empty() {
            uri.push('?');
            uri.push_str(&serde_urlencoded::to_string(params)?);
        }

        let response = self
            .send(
                collection.path(),
                Method::GET,
                &uri,
                Some(&session.access_token),
                Payload::None,
            )
            .await?;

        Ok(UpstreamResponse {
            status: response.status,
            body: response.body,
        })
    }
}

/// Percent-encodes a single path segment.
fn encode_segment(segment: &str) -> String {
    serde_urlencoded::to_string([("", segment)])
        .map(|encoded| encoded.trim_start_matches('=').replace('+', "%20"))
        .unwrap_or_else(|_| segment.to_string())
}
