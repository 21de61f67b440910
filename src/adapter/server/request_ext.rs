use crate::adapter::Error;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{AsHeaderName, AUTHORIZATION, CONTENT_TYPE};
use hyper::http::request::Parts;
use tracing::{debug, warn};

/// Maximum accepted request body size.
const MAX_BODY_SIZE: usize = 1024 * 1024;

pub trait HeaderExt {
    fn get_header<K: AsHeaderName>(&self, header: K) -> Option<String>;
    fn media_type(&self) -> Option<String>;
    fn authorization(&self) -> Result<String, Error>;
    fn bearer_token(&self) -> Result<String, Error>;
}

impl HeaderExt for Parts {
    fn get_header<K>(&self, header: K) -> Option<String>
    where
        K: AsHeaderName,
    {
        self.headers
            .get(header)
            .and_then(|header| header.to_str().ok())
            .map(ToString::to_string)
    }

    /// Content type without its parameters, lowercased.
    fn media_type(&self) -> Option<String> {
        let content_type = self.get_header(CONTENT_TYPE)?;
        let media_type = content_type.split(';').next()?.trim().to_ascii_lowercase();
        (!media_type.is_empty()).then_some(media_type)
    }

    fn authorization(&self) -> Result<String, Error> {
        self.get_header(AUTHORIZATION).ok_or_else(|| {
            debug!("No authorization header found");
            Error::BadRequest(None)
        })
    }

    fn bearer_token(&self) -> Result<String, Error> {
        let authorization = self.authorization()?;
        authorization
            .split_whitespace()
            .last()
            .map(ToString::to_string)
            .ok_or_else(|| Error::bad_request("Access token is not provided"))
    }
}

pub async fn read_body<B>(body: B) -> Result<Bytes, Error>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let body = http_body_util::Limited::new(body, MAX_BODY_SIZE);
    let collected = body.collect().await.map_err(|error| {
        warn!("Unable to read request body: {error}");
        Error::bad_request("Unable to read request body")
    })?;
    Ok(collected.to_bytes())
}
