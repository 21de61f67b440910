use crate::adapter::params::RequestParams;
use crate::adapter::Error;
use hyper::Method;
use tracing::debug;

/// A `{path, method}` pair to be checked against the caller's entitlements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessRequest {
    resource: String,
    scope: &'static str,
}

impl AccessRequest {
    pub fn new(path: &str, method: &str) -> Result<Self, Error> {
        let resource = path
            .trim_matches('/')
            .split('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| {
                debug!("Empty resource path");
                Error::Unauthorized(None)
            })?;

        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::Unauthorized(None))?;

        let scope = match method {
            Method::GET | Method::HEAD => "read",
            Method::POST => "create",
            Method::PUT | Method::PATCH => "update",
            Method::DELETE => "delete",
            _ => {
                debug!("Unsupported method for authorization: {method}");
                return Err(Error::Unauthorized(None));
            }
        };

        Ok(Self {
            resource: resource.to_string(),
            scope,
        })
    }

    pub fn from_params(params: &RequestParams) -> Result<Self, Error> {
        let (Some(path), Some(method)) = (params.get_str("path"), params.get_str("method")) else {
            debug!("Authorization request without path or method");
            return Err(Error::Unauthorized(None));
        };

        Self::new(path, method)
    }

    /// UMA permission string, `resource#scope`.
    pub fn permission(&self) -> String {
        format!("{}#{}", self.resource, self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_to_scope() {
        let request = AccessRequest::new("catalogues", "GET").unwrap();
        assert_eq!(request.permission(), "catalogues#read");

        let permission = |path, method| AccessRequest::new(path, method).unwrap().permission();
        assert_eq!(permission("packages", "post"), "packages#create");
        assert_eq!(permission("services", "PUT"), "services#update");
        assert_eq!(permission("services", "PATCH"), "services#update");
        assert_eq!(permission("records", "DELETE"), "records#delete");
    }

    #[test]
    fn test_resource_is_first_segment() {
        let request = AccessRequest::new("/packages/1234/files", "GET").unwrap();
        assert_eq!(request.permission(), "packages#read");
    }

    #[test]
    fn test_rejections_are_bare_unauthorized() {
        assert_eq!(
            AccessRequest::new("catalogues", "CONNECT"),
            Err(Error::Unauthorized(None))
        );
        assert_eq!(AccessRequest::new("/", "GET"), Err(Error::Unauthorized(None)));
        assert_eq!(
            AccessRequest::new("catalogues", "NOT A METHOD"),
            Err(Error::Unauthorized(None))
        );
    }

    #[test]
    fn test_from_params_requires_both_fields() {
        let params = RequestParams::from_query(Some("path=catalogues")).unwrap();
        assert_eq!(
            AccessRequest::from_params(&params),
            Err(Error::Unauthorized(None))
        );

        let params = RequestParams::from_query(Some("path=catalogues&method=GET")).unwrap();
        assert_eq!(
            AccessRequest::from_params(&params).unwrap().permission(),
            "catalogues#read"
        );
    }
}
