use crate::adapter::api::AdapterAuthorizeHandlersExt;
use crate::adapter::keycloak::{AdminCollection, IdentityProvider};
use crate::adapter::params::RequestParams;
use crate::adapter::response;
use crate::adapter::server::request_ext::HeaderExt;
use crate::adapter::{Adapter, Error, ResponseBody};
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};

const ROLE_FILTERS: [&str; 3] = ["id", "name", "description"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryKind {
    Users,
    Services,
    Roles,
}

impl QueryKind {
    pub fn allowed_params(self) -> &'static [&'static str] {
        match self {
            QueryKind::Users => &[
                "search",
                "lastName",
                "firstName",
                "email",
                "username",
                "first",
                "max",
            ],
            QueryKind::Services => &["name", "first", "max"],
            QueryKind::Roles => &["search", "id", "name", "description", "first", "max"],
        }
    }

    fn collection(self) -> AdminCollection {
        match self {
            QueryKind::Users => AdminCollection::Users,
            QueryKind::Services => AdminCollection::Clients,
            QueryKind::Roles => AdminCollection::Roles,
        }
    }
}

pub trait AdapterQueryHandlersExt {
    async fn handle_query(
        &self,
        parts: &Parts,
        kind: QueryKind,
    ) -> Result<Response<ResponseBody>, Error>;
}

impl AdapterQueryHandlersExt for Adapter {
    #[instrument(skip(self, parts))]
    async fn handle_query(
        &self,
        parts: &Parts,
        kind: QueryKind,
    ) -> Result<Response<ResponseBody>, Error> {
        parts.authorization()?;

        let params = RequestParams::from_query(parts.uri.query())?;
        params.ensure_allowed(kind.allowed_params())?;

        let validated = self.validate_token(parts, StatusCode::BAD_REQUEST).await?;

        let (upstream_params, filters) = split_params(kind, params.to_pairs());
        debug!("Querying {:?} with {upstream_params:?}", kind.collection());

        let answer = self
            .provider
            .query(&validated.session, kind.collection(), &upstream_params)
            .await?;

        if filters.is_empty() || !answer.is_success() {
            return response::forward(answer.status, answer.body);
        }

        let entries: Vec<Value> = serde_json::from_slice(&answer.body)?;
        let entries: Vec<Value> = entries
            .into_iter()
            .filter(|entry| matches_filters(entry, &filters))
            .collect();

        response::json(answer.status, &entries)
    }
}

/// Splits caller parameters into what Keycloak understands and the
/// exact-match filters applied on the returned list.
fn split_params(
    kind: QueryKind,
    pairs: Vec<(String, String)>,
) -> (Vec<(String, String)>, Vec<(String, String)>) {
    match kind {
        QueryKind::Users => (pairs, Vec::new()),
        QueryKind::Services => {
            let pairs = pairs
                .into_iter()
                .map(|(key, value)| match key.as_str() {
                    "name" => ("clientId".to_string(), value),
                    _ => (key, value),
                })
                .collect();
            (pairs, Vec::new())
        }
        QueryKind::Roles => pairs
            .into_iter()
            .partition(|(key, _)| !ROLE_FILTERS.contains(&key.as_str())),
    }
}

fn matches_filters(entry: &Value, filters: &[(String, String)]) -> bool {
    filters
        .iter()
        .all(|(key, expected)| entry[key.as_str()].as_str() == Some(expected.as_str()))
}
