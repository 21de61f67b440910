use crate::adapter::access_request::AccessRequest;
use crate::adapter::keycloak::{IdentityProvider, TokenInfo};
use crate::adapter::params::RequestParams;
use crate::adapter::response;
use crate::adapter::server::request_ext::HeaderExt;
use crate::adapter::{Adapter, ClientSession, Error, ResponseBody};
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// A bearer token the identity provider reported as active.
#[derive(Debug)]
pub struct ValidatedToken {
    pub session: Arc<ClientSession>,
    pub token: String,
    pub info: TokenInfo,
}

pub trait AdapterAuthorizeHandlersExt {
    /// Introspects the request's bearer token.
    ///
    /// A provider refusal is returned with `rejected_status` and the provider's body.
    async fn validate_token(
        &self,
        parts: &Parts,
        rejected_status: StatusCode,
    ) -> Result<ValidatedToken, Error>;

    async fn handle_authorize(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error>;
}

impl AdapterAuthorizeHandlersExt for Adapter {
    #[instrument(skip(self, parts))]
    async fn validate_token(
        &self,
        parts: &Parts,
        rejected_status: StatusCode,
    ) -> Result<ValidatedToken, Error> {
        let token = parts.bearer_token()?;
        let session = self.state.require_session()?;

        let response = self.provider.introspect(&session, &token).await?;
        if response.status != StatusCode::OK {
            debug!("Introspection refused with {}", response.status);
            return Err(Error::Upstream {
                status: rejected_status,
                body: response.body,
            });
        }

        let info: TokenInfo = serde_json::from_slice(&response.body)?;
        if !info.is_active() {
            return Err(Error::unauthorized("Token not active"));
        }

        Ok(ValidatedToken {
            session,
            token,
            info,
        })
    }

    #[instrument(skip(self, parts, body))]
    async fn handle_authorize(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error> {
        let validated = self.validate_token(parts, StatusCode::UNAUTHORIZED).await?;

        let params = RequestParams::negotiate(parts, body)?;
        let request = AccessRequest::from_params(&params)?;

        let granted = self
            .provider
            .decide(&validated.session, &validated.token, &request.permission())
            .await?;

        if !granted {
            info!(
                "Access denied to {:?} on '{}'",
                validated.info.username,
                request.permission()
            );
            return Err(Error::Forbidden("Access denied".to_string()));
        }

        response::json(StatusCode::OK, &json!({ "result": true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::keycloak::{MockIdentityProvider, UpstreamResponse};
    use crate::adapter::tests::{
        body_of, build_adapter, build_configured_adapter, expect_active_token, parts,
    };
    use bytes::Bytes;

    #[tokio::test]
    async fn test_missing_authorization_is_bad_request() {
        let mut provider = MockIdentityProvider::new();
        provider.expect_introspect().never();

        let test = build_configured_adapter(provider);
        let error = test
            .adapter
            .handle_authorize(&parts("GET", "/authorize?path=catalogues&method=GET", None, None), b"")
            .await
            .unwrap_err();

        assert_eq!(error, Error::BadRequest(None));
    }

    #[tokio::test]
    async fn test_inactive_token() {
        let mut provider = MockIdentityProvider::new();
        provider.expect_introspect().returning(|_, _| {
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                body: Bytes::from_static(br#"{"active": false}"#),
            })
        });
        provider.expect_decide().never();

        let test = build_configured_adapter(provider);
        let error = test
            .adapter
            .handle_authorize(
                &parts(
                    "GET",
                    "/authorize?path=catalogues&method=GET",
                    None,
                    Some("Bearer user-token"),
                ),
                b"",
            )
            .await
            .unwrap_err();

        assert_eq!(error, Error::unauthorized("Token not active"));
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_introspection_refusal_is_forwarded_as_unauthorized() {
        let mut provider = MockIdentityProvider::new();
        provider.expect_introspect().returning(|_, _| {
            Ok(UpstreamResponse {
                status: StatusCode::BAD_REQUEST,
                body: Bytes::from_static(br#"{"error":"invalid_client"}"#),
            })
        });

        let test = build_configured_adapter(provider);
        let error = test
            .adapter
            .handle_authorize(
                &parts("GET", "/authorize", None, Some("Bearer user-token")),
                b"",
            )
            .await
            .unwrap_err();

        assert_eq!(
            error,
            Error::Upstream {
                status: StatusCode::UNAUTHORIZED,
                body: Bytes::from_static(br#"{"error":"invalid_client"}"#),
            }
        );
    }

    #[tokio::test]
    async fn test_unconfigured_adapter() {
        let test = build_adapter(MockIdentityProvider::new());
        let error = test
            .adapter
            .handle_authorize(&parts("GET", "/authorize", None, Some("Bearer user-token")), b"")
            .await
            .unwrap_err();

        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_same_decision_for_query_form_and_json() {
        let mut provider = MockIdentityProvider::new();
        expect_active_token(&mut provider);
        provider
            .expect_decide()
            .withf(|_, token, permission| token == "user-token" && permission == "packages#create")
            .times(3)
            .returning(|_, _, _| Ok(true));

        let test = build_configured_adapter(provider);
        let adapter = &test.adapter;

        let requests: [(&str, Option<&str>, &[u8]); 3] = [
            ("/authorize?path=packages&method=POST", None, b""),
            (
                "/authorize",
                Some("application/x-www-form-urlencoded"),
                b"path=packages&method=POST",
            ),
            (
                "/authorize",
                Some("application/json"),
                br#"{"path": "/packages/abc", "method": "post"}"#,
            ),
        ];

        for (uri, content_type, body) in requests {
            let response = adapter
                .handle_authorize(&parts("GET", uri, content_type, Some("Bearer user-token")), body)
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_of(response).await, r#"{"result":true}"#);
        }
    }

    #[tokio::test]
    async fn test_denied() {
        let mut provider = MockIdentityProvider::new();
        expect_active_token(&mut provider);
        provider.expect_decide().returning(|_, _, _| Ok(false));

        let test = build_configured_adapter(provider);
        let error = test
            .adapter
            .handle_authorize(
                &parts(
                    "GET",
                    "/authorize?path=services&method=DELETE",
                    None,
                    Some("Bearer user-token"),
                ),
                b"",
            )
            .await
            .unwrap_err();

        assert_eq!(error, Error::Forbidden("Access denied".to_string()));
    }

    #[tokio::test]
    async fn test_missing_path_is_bare_unauthorized() {
        let mut provider = MockIdentityProvider::new();
        expect_active_token(&mut provider);
        provider.expect_decide().never();

        let test = build_configured_adapter(provider);
        let error = test
            .adapter
            .handle_authorize(
                &parts("GET", "/authorize?method=GET", None, Some("Bearer user-token")),
                b"",
            )
            .await
            .unwrap_err();

        assert_eq!(error, Error::Unauthorized(None));
    }
}
