use crate::adapter::api::AdapterAuthorizeHandlersExt;
use crate::adapter::credentials::{BasicPayload, Credentials};
use crate::adapter::keycloak::{IdentityProvider, TokenGrant};
use crate::adapter::params::RequestParams;
use crate::adapter::response;
use crate::adapter::server::request_ext::HeaderExt;
use crate::adapter::{Adapter, Error, ResponseBody};
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use tracing::{debug, instrument};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginKind {
    User,
    Service,
}

pub trait AdapterLoginHandlersExt {
    async fn handle_login(
        &self,
        parts: &Parts,
        kind: LoginKind,
    ) -> Result<Response<ResponseBody>, Error>;

    async fn handle_authenticate(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error>;

    async fn handle_userinfo(&self, parts: &Parts) -> Result<Response<ResponseBody>, Error>;

    async fn handle_logout(&self, parts: &Parts) -> Result<Response<ResponseBody>, Error>;

    async fn handle_refresh(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error>;
}

impl AdapterLoginHandlersExt for Adapter {
    #[instrument(skip(self, parts))]
    async fn handle_login(
        &self,
        parts: &Parts,
        kind: LoginKind,
    ) -> Result<Response<ResponseBody>, Error> {
        let payload = BasicPayload::from_parts(parts)?;
        let credentials = match kind {
            LoginKind::User => Credentials::password(payload.secret),
            LoginKind::Service => Credentials::client_secret(payload.secret),
        };

        let session = self.state.require_session()?;
        let grant = TokenGrant::login(&session, &self.client_id, &payload.id, &credentials);

        let answer = self.provider.token(&session.endpoints, &grant).await?;
        response::forward(answer.status, answer.body)
    }

    #[instrument(skip(self, parts, body))]
    async fn handle_authenticate(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error> {
        parts.authorization()?;
        let params = RequestParams::negotiate(parts, body)?;

        let required = |key: &str| {
            params.get_str(key).map(ToString::to_string).ok_or_else(|| {
                debug!("Missing '{key}' parameter");
                Error::bad_request("Bad request")
            })
        };

        let grant = match params.get_str("grant_type") {
            Some("password") => TokenGrant::Password {
                client_id: required("client_id")?,
                client_secret: params.get_str("client_secret").map(ToString::to_string),
                username: required("username")?,
                password: required("password")?,
            },
            Some("client_credentials") => TokenGrant::ClientCredentials {
                client_id: required("client_id")?,
                client_secret: required("client_secret")?,
            },
            other => {
                debug!("Unsupported grant type: {other:?}");
                return Err(Error::bad_request("Bad request"));
            }
        };

        let answer = self.provider.token(&self.endpoints(), &grant).await?;
        response::forward(answer.status, answer.body)
    }

    #[instrument(skip(self, parts))]
    async fn handle_userinfo(&self, parts: &Parts) -> Result<Response<ResponseBody>, Error> {
        let validated = self.validate_token(parts, StatusCode::BAD_REQUEST).await?;

        let answer = self
            .provider
            .userinfo(&validated.session, &validated.token)
            .await?;
        response::forward(answer.status, answer.body)
    }

    #[instrument(skip(self, parts))]
    async fn handle_logout(&self, parts: &Parts) -> Result<Response<ResponseBody>, Error> {
        let validated = self.validate_token(parts, StatusCode::BAD_REQUEST).await?;

        let user_id = validated
            .info
            .sub
            .as_deref()
            .ok_or_else(|| Error::bad_request("Token has no subject"))?;

        self.provider.logout(&validated.session, user_id).await?;
        response::empty(StatusCode::NO_CONTENT)
    }

    #[instrument(skip(self, parts, body))]
    async fn handle_refresh(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error> {
        let params = RequestParams::negotiate(parts, body)?;
        let refresh_token = params
            .get_str("refresh_token")
            .ok_or_else(|| Error::bad_request("Refresh token is not provided"))?;

        let session = self.state.require_session()?;
        let grant = TokenGrant::RefreshToken {
            client_id: self.client_id.clone(),
            client_secret: session.client_secret.clone(),
            refresh_token: refresh_token.to_string(),
        };

        let answer = self.provider.token(&session.endpoints, &grant).await?;
        response::forward(answer.status, answer.body)
    }
}
