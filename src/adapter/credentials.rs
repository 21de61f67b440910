use crate::adapter::server::request_ext::HeaderExt;
use crate::adapter::Error;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use hyper::http::request::Parts;
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    Password,
    ClientCredentials,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    #[serde(rename = "type")]
    pub kind: CredentialType,
    pub value: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn password(value: String) -> Self {
        Self {
            kind: CredentialType::Password,
            value,
        }
    }

    pub fn client_secret(value: String) -> Self {
        Self {
            kind: CredentialType::ClientCredentials,
            value,
        }
    }
}

/// `{id, secret}` pair carried by a Basic authorization header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicPayload {
    pub id: String,
    pub secret: String,
}

impl fmt::Debug for BasicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicPayload")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl BasicPayload {
    pub fn from_parts(parts: &Parts) -> Result<Self, Error> {
        let authorization = parts.authorization()?;
        Self::decode(&authorization)
    }

    /// Decodes the last word of an authorization header value as base64 `id:secret`.
    pub fn decode(authorization: &str) -> Result<Self, Error> {
        let invalid = || Error::bad_request("Invalid credentials");

        let encoded = authorization.split_whitespace().last().ok_or_else(invalid)?;
        let decoded = BASE64_STANDARD.decode(encoded).map_err(|error| {
            debug!("Unable to decode basic credentials: {error}");
            invalid()
        })?;
        let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;

        let (id, secret) = decoded.split_once(':').ok_or_else(invalid)?;
        if id.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            id: id.to_string(),
            secret: secret.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic_payload() {
        let payload = BasicPayload::decode("Basic dXNlcjpwYXNzd29yZA==").unwrap();
        assert_eq!(payload.id, "user");
        assert_eq!(payload.secret, "password");
    }

    #[test]
    fn test_decode_keeps_colons_in_secret() {
        let encoded = BASE64_STANDARD.encode("service:a:b:c");
        let payload = BasicPayload::decode(&format!("Basic {encoded}")).unwrap();
        assert_eq!(payload.id, "service");
        assert_eq!(payload.secret, "a:b:c");
    }

    #[test]
    fn test_decode_invalid_payloads() {
        assert!(BasicPayload::decode("Basic %%%%").is_err());
        assert!(BasicPayload::decode("").is_err());

        let no_colon = BASE64_STANDARD.encode("nocolon");
        assert!(BasicPayload::decode(&format!("Basic {no_colon}")).is_err());

        let no_id = BASE64_STANDARD.encode(":secret");
        assert!(BasicPayload::decode(&format!("Basic {no_id}")).is_err());
    }

    #[test]
    fn test_credentials_kinds() {
        let credentials = Credentials::password("pass".to_string());
        assert_eq!(credentials.kind, CredentialType::Password);

        let credentials = Credentials::client_secret("secret".to_string());
        assert_eq!(credentials.kind, CredentialType::ClientCredentials);
        assert_eq!(
            serde_json::to_value(&credentials).unwrap(),
            serde_json::json!({"type": "client_credentials", "value": "secret"})
        );
    }
}
