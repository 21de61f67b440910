use crate::adapter::server::request_ext::HeaderExt;
use crate::adapter::Error;
use hyper::http::request::Parts;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_FORM: &str = "application/x-www-form-urlencoded";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyFormat {
    Json,
    Form,
}

impl BodyFormat {
    pub fn from_parts(parts: &Parts) -> Option<Self> {
        match parts.media_type().as_deref() {
            Some(APPLICATION_JSON) => Some(BodyFormat::Json),
            Some(APPLICATION_FORM) => Some(BodyFormat::Form),
            _ => None,
        }
    }

    /// Body format of a route that only accepts JSON or form bodies.
    pub fn require(parts: &Parts) -> Result<Self, Error> {
        Self::from_parts(parts).ok_or_else(|| {
            debug!("Unsupported content type: {:?}", parts.media_type());
            Error::UnsupportedMediaType
        })
    }
}

/// Request parameters merged from the query string and the body.
///
/// Body values take precedence over query values with the same key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestParams(Map<String, Value>);

impl RequestParams {
    pub fn from_query(query: Option<&str>) -> Result<Self, Error> {
        let mut params = Map::new();
        if let Some(query) = query {
            for (key, value) in decode_pairs(query)? {
                params.insert(key, Value::String(value));
            }
        }
        Ok(Self(params))
    }

    pub fn negotiate(parts: &Parts, body: &[u8]) -> Result<Self, Error> {
        let mut params = Self::from_query(parts.uri.query())?;

        match BodyFormat::from_parts(parts) {
            Some(format) => params.merge(Self::from_body(format, body)?),
            None => debug!("No supported body content type, using query parameters only"),
        }

        Ok(params)
    }

    pub fn from_body(format: BodyFormat, body: &[u8]) -> Result<Self, Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        match format {
            BodyFormat::Json => match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(map)) => Ok(Self(map)),
                Ok(_) => Err(Error::bad_request("JSON body must be an object")),
                Err(error) => {
                    warn!("Invalid JSON body: {error}");
                    Err(Error::BadRequest(Some(format!("Invalid JSON body: {error}"))))
                }
            },
            BodyFormat::Form => {
                let body = std::str::from_utf8(body)
                    .map_err(|_| Error::bad_request("Form body is not valid UTF-8"))?;
                let mut params = Map::new();
                for (key, value) in decode_pairs(body)? {
                    params.insert(key, Value::String(value));
                }
                Ok(Self(params))
            }
        }
    }

    fn merge(&mut self, other: RequestParams) {
        self.0.extend(other.0);
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Rejects any key outside `allowed`.
    pub fn ensure_allowed(&self, allowed: &[&str]) -> Result<(), Error> {
        if let Some(key) = self.0.keys().find(|key| !allowed.contains(&key.as_str())) {
            debug!("Query parameter '{key}' is not supported");
            return Err(Error::bad_request("Bad query"));
        }
        Ok(())
    }

    /// Parameters as string pairs, the shape upstream query strings need.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(value) => value.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

fn decode_pairs(input: &str) -> Result<Vec<(String, String)>, Error> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(input).map_err(|error| {
        debug!("Unable to decode urlencoded parameters: {error}");
        Error::bad_request("Bad query")
    })
}
