use hyper::StatusCode;
use std::fmt;
use tracing::debug;

#[derive(Debug, PartialEq)]
pub enum Error {
    /// The remote schema server answered with a non-success status.
    SchemaFetch { status: StatusCode, body: String },
    SchemaUnreachable(String),
    Schema(String),
    /// Schema violations, one message per line.
    Invalid(String),
    NameInvalid,
    VersionInvalid,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::SchemaFetch { status, .. } => *status,
            Error::SchemaUnreachable(_) => StatusCode::BAD_GATEWAY,
            Error::Schema(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Invalid(_) | Error::NameInvalid | Error::VersionInvalid => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SchemaFetch { body, .. } => write!(f, "{body}"),
            Error::SchemaUnreachable(error) => write!(f, "{error}"),
            Error::Schema(error) => write!(f, "Schema error: {error}"),
            Error::Invalid(violations) => write!(f, "{violations}"),
            Error::NameInvalid => write!(f, "Package name invalid"),
            Error::VersionInvalid => write!(f, "Package version format is invalid"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        debug!("Schema I/O error: {error:?}");
        Error::Schema(format!("Unable to read schema: {error}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        debug!("Schema JSON error: {error:?}");
        Error::Schema(format!("Schema is not valid JSON: {error}"))
    }
}

impl From<crate::http_client::Error> for Error {
    fn from(error: crate::http_client::Error) -> Self {
        Error::SchemaUnreachable(error.to_string())
    }
}

impl From<hyper::http::Error> for Error {
    fn from(error: hyper::http::Error) -> Self {
        debug!("Schema request error: {error:?}");
        Error::Schema(format!("Invalid schema URL: {error}"))
    }
}
