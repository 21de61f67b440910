use bytes::Bytes;
use hyper::StatusCode;
use std::fmt::Display;
use std::string::FromUtf8Error;
use tracing::{debug, warn};

#[derive(Debug, PartialEq)]
pub enum Error {
    /// 400, with a JSON error envelope when a message is given, bare otherwise.
    BadRequest(Option<String>),
    /// 401, with a JSON error envelope when a message is given, bare otherwise.
    Unauthorized(Option<String>),
    Forbidden(String),
    NotFound,
    /// 409, plain text body.
    Conflict(String),
    UnsupportedMediaType,
    /// Identity provider answer forwarded as-is.
    Upstream {
        status: StatusCode,
        body: Bytes,
    },
    Internal(String),
}

impl Error {
    pub fn bad_request(message: &str) -> Self {
        Error::BadRequest(Some(message.to_string()))
    }

    pub fn unauthorized(message: &str) -> Self {
        Error::Unauthorized(Some(message.to_string()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::Upstream { status, .. } => *status,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadRequest(Some(s)) | Error::Unauthorized(Some(s)) => write!(f, "{s}"),
            Error::BadRequest(None) => write!(f, "Bad request"),
            Error::Unauthorized(None) => write!(f, "Unauthorized"),
            Error::Forbidden(s) | Error::Conflict(s) | Error::Internal(s) => write!(f, "{s}"),
            Error::NotFound => write!(f, "Not found"),
            Error::UnsupportedMediaType => write!(f, "Unsupported media type"),
            Error::Upstream { status, body } => {
                write!(f, "Identity provider answered {status}: ")?;
                write!(f, "{}", String::from_utf8_lossy(body))
            }
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        debug!("Error: {:?}", error);
        Error::Internal(format!("I/O error: {error}"))
    }
}

impl From<hyper::Error> for Error {
    fn from(error: hyper::Error) -> Self {
        debug!("Hyper error: {:?}", error);
        Error::Internal("HTTP error during operations".to_string())
    }
}

impl From<hyper::http::Error> for Error {
    fn from(error: hyper::http::Error) -> Self {
        debug!("Hyper HTTP error: {:?}", error);
        Error::Internal("HTTP error during operations".to_string())
    }
}

impl From<hyper::http::uri::InvalidUri> for Error {
    fn from(error: hyper::http::uri::InvalidUri) -> Self {
        debug!("Invalid URI: {:?}", error);
        Error::Internal("Invalid identity provider URI".to_string())
    }
}

impl From<hyper::header::InvalidHeaderValue> for Error {
    fn from(error: hyper::header::InvalidHeaderValue) -> Self {
        debug!("Invalid header value: {:?}", error);
        Error::Internal("Invalid header value".to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        debug!("Serde JSON error: {:?}", error);
        Error::Internal("(De)Serialization error during operations".to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        warn!("Serde YAML error: {:?}", error);
        Error::Internal(format!("Error loading config file: {error}"))
    }
}

impl From<serde_urlencoded::ser::Error> for Error {
    fn from(error: serde_urlencoded::ser::Error) -> Self {
        debug!("Form encoding error: {:?}", error);
        Error::Internal("Form encoding error during operations".to_string())
    }
}

impl From<FromUtf8Error> for Error {
    fn from(error: FromUtf8Error) -> Self {
        debug!("UTF-8 error: {:?}", error);
        Error::Internal("UTF-8 error during operations".to_string())
    }
}

impl From<crate::http_client::Error> for Error {
    fn from(error: crate::http_client::Error) -> Self {
        warn!("Identity provider unreachable: {error}");
        let body = serde_json::json!({ "error": error.to_string() }).to_string();
        Error::Upstream {
            status: StatusCode::BAD_GATEWAY,
            body: Bytes::from(body),
        }
    }
}
