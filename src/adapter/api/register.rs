use crate::adapter::keycloak::{IdentityProvider, UserRegistration};
use crate::adapter::params::{BodyFormat, RequestParams};
use crate::adapter::response;
use crate::adapter::{Adapter, ClientSession, Error, ResponseBody};
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, instrument, warn};

const USER_TYPE_KEYS: [&str; 2] = ["userType", "attributes[userType]"];

pub trait AdapterRegisterHandlersExt {
    async fn handle_register_user(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error>;

    async fn handle_register_service(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error>;
}

impl AdapterRegisterHandlersExt for Adapter {
    #[instrument(skip(self, parts, body))]
    async fn handle_register_user(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error> {
        let format = BodyFormat::require(parts)?;
        let user = parse_user_registration(format, body)?;
        let session = self.state.require_session()?;

        let user_id = match self.provider.register_user(&session, &user).await {
            Ok(user_id) => user_id,
            Err(error) if is_existing_user(&error) => {
                warn!("Registration of user '{}' failed: {error}", user.username);
                debug!("User '{}' already exists, leaving it in place", user.username);
                return Err(Error::bad_request("User registration failed"));
            }
            Err(error) => {
                warn!("Registration of user '{}' failed: {error}", user.username);
                self.rollback_user(&session, &user.username).await;
                return Err(Error::bad_request("User registration failed"));
            }
        };

        if let Err(error) = self.assign_user_types(&session, &user, &user_id).await {
            warn!("Registration of user '{}' failed: {error}", user.username);
            self.rollback_user(&session, &user.username).await;
            return Err(Error::bad_request("User registration failed"));
        }

        response::json(
            StatusCode::CREATED,
            &json!({ "username": user.username, "userId": user_id }),
        )
    }

    #[instrument(skip(self, parts, body))]
    async fn handle_register_service(
        &self,
        parts: &Parts,
        body: &[u8],
    ) -> Result<Response<ResponseBody>, Error> {
        let format = BodyFormat::require(parts)?;
        let client = Value::Object(RequestParams::from_body(format, body)?.into_inner());

        let Some(client_id) = client["clientId"].as_str().filter(|id| !id.is_empty()) else {
            return Err(Error::bad_request("Service registration requires a clientId"));
        };

        let session = self.state.require_session()?;
        if let Err(error) = self.create_service(&session, client_id, &client).await {
            error!("Registration of service '{client_id}' failed: {error}");
            return Err(Error::bad_request("Service registration failed"));
        }

        info!("Service '{client_id}' registered");
        response::empty(StatusCode::CREATED)
    }
}

impl Adapter {
    async fn assign_user_types(
        &self,
        session: &ClientSession,
        user: &UserRegistration,
        user_id: &str,
    ) -> Result<(), Error> {
        for user_type in &user.attributes.user_type {
            self.provider
                .set_user_groups(session, user_type, user_id)
                .await?;
            self.provider
                .set_user_roles(session, user_type, user_id)
                .await?;
        }

        Ok(())
    }

    /// Best-effort removal of a partially registered user; the outcome is only logged.
    async fn rollback_user(&self, session: &ClientSession, username: &str) {
        match self.provider.delete_user(session, username).await {
            Ok(()) => info!("Rolled back registration of user '{username}'"),
            Err(error) => warn!("Unable to roll back registration of user '{username}': {error}"),
        }
    }

    async fn create_service(
        &self,
        session: &ClientSession,
        client_id: &str,
        client: &Value,
    ) -> Result<(), Error> {
        self.provider.register_client(session, client).await?;
        let (client_uuid, role) = self.provider.set_service_roles(session, client_id).await?;
        self.provider
            .set_service_account_roles(session, &client_uuid, &role)
            .await
    }
}

fn is_existing_user(error: &Error) -> bool {
    matches!(error, Error::Upstream { status, .. } if *status == StatusCode::CONFLICT)
}

fn parse_user_registration(format: BodyFormat, body: &[u8]) -> Result<UserRegistration, Error> {
    let mut fields: Map<String, Value> = RequestParams::from_body(format, body)?.into_inner();

    if !fields.contains_key("attributes") {
        if let Some(user_type) = USER_TYPE_KEYS.iter().find_map(|key| fields.remove(*key)) {
            fields.insert("attributes".to_string(), json!({ "userType": user_type }));
        }
    }

    let user: UserRegistration = serde_json::from_value(Value::Object(fields)).map_err(|error| {
        debug!("Invalid user registration: {error}");
        Error::bad_request("Invalid user registration")
    })?;

    if user.username.trim().is_empty() {
        return Err(Error::bad_request("Invalid user registration"));
    }

    Ok(user)
}
