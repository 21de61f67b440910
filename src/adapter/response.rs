use crate::adapter::params::APPLICATION_JSON;
use crate::adapter::{Error, ResponseBody};
use bytes::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use tracing::error;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf8";

pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<ResponseBody>, Error> {
    let body = serde_json::to_vec(value)?;
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, APPLICATION_JSON)
        .body(ResponseBody::fixed(body))?)
}

pub fn text<T: Into<Bytes>>(status: StatusCode, body: T) -> Result<Response<ResponseBody>, Error> {
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, TEXT_PLAIN)
        .body(ResponseBody::fixed(body))?)
}

pub fn empty(status: StatusCode) -> Result<Response<ResponseBody>, Error> {
    Ok(Response::builder()
        .status(status)
        .body(ResponseBody::empty())?)
}

/// Forwards an identity provider answer, keeping its status and body.
pub fn forward(status: StatusCode, body: Bytes) -> Result<Response<ResponseBody>, Error> {
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, APPLICATION_JSON)
        .body(ResponseBody::fixed(body))?)
}

pub fn error_to_response(error: &Error) -> Response<ResponseBody> {
    let status = error.status_code();

    let (content_type, body) = match error {
        Error::BadRequest(None) | Error::Unauthorized(None) | Error::UnsupportedMediaType => {
            (None, Bytes::new())
        }
        Error::Conflict(message) => (Some(TEXT_PLAIN), Bytes::from(message.clone())),
        Error::Upstream { body, .. } => (Some(APPLICATION_JSON), body.clone()),
        _ => {
            let envelope = json!({ "error": error.to_string() });
            error!("{envelope}");
            (Some(APPLICATION_JSON), Bytes::from(envelope.to_string()))
        }
    };

    let mut builder = Response::builder().status(status);
    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }

    let body = if body.is_empty() {
        ResponseBody::empty()
    } else {
        ResponseBody::fixed(body)
    };

    builder.body(body).unwrap_or_else(|_| {
        let mut response = Response::new(ResponseBody::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(response: Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let response = error_to_response(&Error::unauthorized("Token not active"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            APPLICATION_JSON
        );
        assert_eq!(body_of(response).await, r#"{"error":"Token not active"}"#);
    }

    #[tokio::test]
    async fn test_bare_errors_have_no_body() {
        let response = error_to_response(&Error::BadRequest(None));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(body_of(response).await, "");

        let response = error_to_response(&Error::UnsupportedMediaType);
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_conflict_is_plain_text() {
        let response =
            error_to_response(&Error::Conflict("Secret key is already defined.".to_string()));
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), TEXT_PLAIN);
        assert_eq!(body_of(response).await, "Secret key is already defined.");
    }

    #[tokio::test]
    async fn test_upstream_is_forwarded_verbatim() {
        let response = error_to_response(&Error::Upstream {
            status: StatusCode::CONFLICT,
            body: Bytes::from_static(br#"{"errorMessage":"User exists with same username"}"#),
        });
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_of(response).await,
            r#"{"errorMessage":"User exists with same username"}"#
        );
    }
}
