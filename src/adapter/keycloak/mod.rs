mod client;

use crate::adapter::client_state::ClientSession;
use crate::adapter::credentials::{CredentialType, Credentials};
use crate::adapter::Error;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

pub use client::KeycloakClient;

/// Endpoints advertised by the realm's OpenID configuration document.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OidcEndpoints {
    pub issuer: String,
    pub token_endpoint: String,
    pub introspection_endpoint: String,
    pub userinfo_endpoint: String,
    pub end_session_endpoint: Option<String>,
}

impl OidcEndpoints {
    /// Keycloak's well-known endpoint layout below a realm URL.
    pub fn for_realm(realm_url: &str) -> Self {
        let connect = format!("{realm_url}/protocol/openid-connect");
        Self {
            issuer: realm_url.to_string(),
            token_endpoint: format!("{connect}/token"),
            introspection_endpoint: format!("{connect}/token/introspect"),
            userinfo_endpoint: format!("{connect}/userinfo"),
            end_session_endpoint: Some(format!("{connect}/logout")),
        }
    }
}

/// Token endpoint request, form encoded with its `grant_type` tag.
#[derive(Clone, PartialEq, Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
pub enum TokenGrant {
    Password {
        client_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_secret: Option<String>,
        username: String,
        password: String,
    },
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
    },
}

impl TokenGrant {
    /// Grant for a `/login/*` call. User logins go through the adapter client.
    pub fn login(
        session: &ClientSession,
        adapter_client_id: &str,
        id: &str,
        credentials: &Credentials,
    ) -> Self {
        match credentials.kind {
            CredentialType::Password => TokenGrant::Password {
                client_id: adapter_client_id.to_string(),
                client_secret: Some(session.client_secret.clone()),
                username: id.to_string(),
                password: credentials.value.clone(),
            },
            CredentialType::ClientCredentials => TokenGrant::ClientCredentials {
                client_id: id.to_string(),
                client_secret: credentials.value.clone(),
            },
        }
    }

    pub fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::Password { .. } => "password",
            TokenGrant::ClientCredentials { .. } => "client_credentials",
            TokenGrant::RefreshToken { .. } => "refresh_token",
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let client_id = match self {
            TokenGrant::Password { client_id, .. }
            | TokenGrant::ClientCredentials { client_id, .. }
            | TokenGrant::RefreshToken { client_id, .. } => client_id,
        };
        f.debug_struct("TokenGrant")
            .field("grant_type", &self.grant_type())
            .field("client_id", client_id)
            .finish_non_exhaustive()
    }
}

/// Introspection result.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TokenInfo {
    pub active: bool,
    pub exp: Option<i64>,
    pub sub: Option<String>,
    pub username: Option<String>,
    pub client_id: Option<String>,
}

impl TokenInfo {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    pub fn is_active(&self) -> bool {
        self.active && self.expires_at().map_or(true, |expires_at| expires_at > Utc::now())
    }
}

/// An identity provider answer that is returned to the caller unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn into_error(self) -> Error {
        Error::Upstream {
            status: self.status,
            body: self.body,
        }
    }
}

/// Admin collections the query endpoints read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminCollection {
    Users,
    Clients,
    Roles,
}

impl AdminCollection {
    pub fn path(self) -> &'static str {
        match self {
            AdminCollection::Users => "users",
            AdminCollection::Clients => "clients",
            AdminCollection::Roles => "roles",
        }
    }
}

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistration {
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub attributes: UserAttributes,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserAttributes {
    #[serde(rename = "userType", default, deserialize_with = "one_or_many")]
    pub user_type: Vec<String>,
}

impl fmt::Debug for UserRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRegistration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

impl UserRegistration {
    /// Keycloak user representation, created enabled with a permanent password.
    pub fn to_representation(&self) -> Value {
        let mut credential = serde_json::to_value(Credentials::password(self.password.clone()))
            .unwrap_or_else(|_| json!({ "type": "password", "value": self.password }));
        credential["temporary"] = Value::Bool(false);

        json!({
            "username": self.username,
            "email": self.email,
            "firstName": self.first_name,
            "lastName": self.last_name,
            "enabled": true,
            "attributes": { "userType": self.attributes.user_type },
            "credentials": [credential],
        })
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => value
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .collect(),
        OneOrMany::Many(values) => values,
    })
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Endpoints assumed until discovery has run.
    fn default_endpoints(&self) -> OidcEndpoints;

    async fn discover(&self) -> Result<OidcEndpoints, Error>;

    /// Sends a grant to the token endpoint and returns the answer as-is.
    async fn token(
        &self,
        endpoints: &OidcEndpoints,
        grant: &TokenGrant,
    ) -> Result<UpstreamResponse, Error>;

    /// Adapter access token obtained with the client credentials grant.
    async fn adapter_token(
        &self,
        endpoints: &OidcEndpoints,
        client_secret: &str,
    ) -> Result<String, Error>;

    async fn introspect(
        &self,
        session: &ClientSession,
        token: &str,
    ) -> Result<UpstreamResponse, Error>;

    /// UMA decision for `permission` (`resource#scope`) on behalf of the token owner.
    async fn decide(
        &self,
        session: &ClientSession,
        token: &str,
        permission: &str,
    ) -> Result<bool, Error>;

    async fn userinfo(
        &self,
        session: &ClientSession,
        token: &str,
    ) -> Result<UpstreamResponse, Error>;

    /// Ends every session of the user.
    async fn logout(&self, session: &ClientSession, user_id: &str) -> Result<(), Error>;

    async fn realm_public_key(&self) -> Result<String, Error>;

    /// Creates the user and returns its id.
    async fn register_user(
        &self,
        session: &ClientSession,
        user: &UserRegistration,
    ) -> Result<String, Error>;

    async fn delete_user(&self, session: &ClientSession, username: &str) -> Result<(), Error>;

    async fn set_user_groups(
        &self,
        session: &ClientSession,
        user_type: &str,
        user_id: &str,
    ) -> Result<(), Error>;

    async fn set_user_roles(
        &self,
        session: &ClientSession,
        user_type: &str,
        user_id: &str,
    ) -> Result<(), Error>;

    async fn register_client(&self, session: &ClientSession, client: &Value) -> Result<(), Error>;

    /// Creates the realm role named after the client and returns
    /// `(client internal id, role representation)`.
    async fn set_service_roles(
        &self,
        session: &ClientSession,
        client_id: &str,
    ) -> Result<(String, Value), Error>;

    async fn set_service_account_roles(
        &self,
        session: &ClientSession,
        client_uuid: &str,
        role: &Value,
    ) -> Result<(), Error>;

    async fn query(
        &self,
        session: &ClientSession,
        collection: AdminCollection,
        params: &[(String, String)],
    ) -> Result<UpstreamResponse, Error>;
}

#[cfg(test)]
mod type_tests {
    use super::*;

    #[test]
    fn test_grant_form_encoding() {
        let grant = TokenGrant::ClientCredentials {
            client_id: "son-catalogue".to_string(),
            client_secret: "s3cr3t".to_string(),
        };
        assert_eq!(
            serde_urlencoded::to_string(&grant).unwrap(),
            "grant_type=client_credentials&client_id=son-catalogue&client_secret=s3cr3t"
        );

        let grant = TokenGrant::Password {
            client_id: "adapter".to_string(),
            client_secret: None,
            username: "alice".to_string(),
            password: "p@ss".to_string(),
        };
        assert_eq!(
            serde_urlencoded::to_string(&grant).unwrap(),
            "grant_type=password&client_id=adapter&username=alice&password=p%40ss"
        );
    }

    #[test]
    fn test_login_grant() {
        let session = ClientSession {
            client_secret: "adapter-secret".to_string(),
            access_token: "token".to_string(),
            endpoints: OidcEndpoints::default(),
        };

        let grant = TokenGrant::login(
            &session,
            "adapter",
            "alice",
            &Credentials::password("pass".to_string()),
        );
        assert_eq!(
            grant,
            TokenGrant::Password {
                client_id: "adapter".to_string(),
                client_secret: Some("adapter-secret".to_string()),
                username: "alice".to_string(),
                password: "pass".to_string(),
            }
        );

        let grant = TokenGrant::login(
            &session,
            "adapter",
            "son-catalogue",
            &Credentials::client_secret("secret".to_string()),
        );
        assert_eq!(grant.grant_type(), "client_credentials");
    }

    #[test]
    fn test_token_info_activity() {
        let info: TokenInfo = serde_json::from_str(r#"{"active": false}"#).unwrap();
        assert!(!info.is_active());

        let future = Utc::now().timestamp() + 300;
        let info: TokenInfo =
            serde_json::from_str(&format!(r#"{{"active": true, "exp": {future}, "sub": "1"}}"#))
                .unwrap();
        assert!(info.is_active());
        assert_eq!(info.sub.as_deref(), Some("1"));

        let info: TokenInfo = serde_json::from_str(r#"{"active": true, "exp": 1}"#).unwrap();
        assert!(!info.is_active());
    }

    #[test]
    fn test_user_registration_representation() {
        let user: UserRegistration = serde_json::from_value(json!({
            "username": "alice",
            "password": "pass",
            "email": "alice@example.com",
            "firstName": "Alice",
            "attributes": {"userType": ["developer", "customer"]}
        }))
        .unwrap();

        let representation = user.to_representation();
        assert_eq!(representation["username"], "alice");
        assert_eq!(representation["firstName"], "Alice");
        assert_eq!(representation["enabled"], true);
        assert_eq!(
            representation["attributes"]["userType"],
            json!(["developer", "customer"])
        );
        assert_eq!(
            representation["credentials"],
            json!([{"type": "password", "value": "pass", "temporary": false}])
        );
    }

    #[test]
    fn test_user_type_accepts_single_value() {
        let user: UserRegistration = serde_json::from_value(json!({
            "username": "bob",
            "attributes": {"userType": "developer, customer"}
        }))
        .unwrap();
        assert_eq!(user.attributes.user_type, vec!["developer", "customer"]);
    }

    #[test]
    fn test_endpoints_for_realm() {
        let endpoints = OidcEndpoints::for_realm("http://keycloak:8080/auth/realms/sonata");
        assert_eq!(
            endpoints.token_endpoint,
            "http://keycloak:8080/auth/realms/sonata/protocol/openid-connect/token"
        );
        assert_eq!(
            endpoints.introspection_endpoint,
            "http://keycloak:8080/auth/realms/sonata/protocol/openid-connect/token/introspect"
        );
    }
}
