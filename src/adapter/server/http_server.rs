use crate::adapter::api::{
    AdapterAdminHandlersExt, AdapterAuthorizeHandlersExt, AdapterLoginHandlersExt,
    AdapterQueryHandlersExt, AdapterRegisterHandlersExt,
};
use crate::adapter::response::{self, error_to_response};
use crate::adapter::server::request_ext::read_body;
use crate::adapter::server::route::Route;
use crate::adapter::server::router;
use crate::adapter::{Adapter, Error, ResponseBody};
use crate::metrics_provider::METRICS_PROVIDER;
use hyper::body::{Bytes, Incoming};
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use opentelemetry::trace::TraceContextExt;
use std::convert::Infallible;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::pin;
use tracing::{debug, error, info, instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub async fn serve_request<S>(
    stream: TokioIo<S>,
    adapter: Arc<Adapter>,
    timeouts: Arc<[Duration; 2]>,
    remote_address: SocketAddr,
) where
    S: Unpin + AsyncWrite + AsyncRead + Send + Debug + 'static,
{
    let conn = http1::Builder::new().serve_connection(
        stream,
        service_fn(move |request| {
            handle_request(Arc::clone(&adapter), request, remote_address)
        }),
    );
    pin!(conn);

    METRICS_PROVIDER.metric_http_request_in_flight.inc();

    for (iter, sleep_duration) in timeouts.iter().enumerate() {
        debug!("iter = {iter} sleep_duration = {sleep_duration:?}");
        tokio::select! {
            res = conn.as_mut() => {
                match res {
                    Ok(()) => debug!("after polling conn, no error"),
                    Err(error) =>  debug!("error serving connection: {error}"),
                }
                break;
            }
            () = tokio::time::sleep(*sleep_duration) => {
                debug!("iter = {iter} got timeout_interval, calling conn.graceful_shutdown");
                conn.as_mut().graceful_shutdown();
            }
        }
    }

    METRICS_PROVIDER.metric_http_request_in_flight.dec();
}

#[instrument(skip(adapter, request))]
async fn handle_request(
    adapter: Arc<Adapter>,
    request: Request<Incoming>,
    remote_address: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let start_time = Instant::now();
    let method = request.method().to_owned();
    let path = request.uri().path().to_owned();

    let trace_id = {
        let context = Span::current().context();
        let span = context.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            Some(span_context.trace_id().to_string())
        } else {
            None
        }
    };

    let response = match router(&adapter, request, Some(remote_address)).await {
        Ok(response) => response,
        Err(error) => error_to_response(&error),
    };

    #[allow(clippy::cast_precision_loss)]
    let elapsed = start_time.elapsed().as_millis() as f64;
    let status = response.status();

    METRICS_PROVIDER.metric_http_request_total.inc();
    METRICS_PROVIDER
        .metric_http_request_duration
        .observe(elapsed);

    let log = if let Some(trace_id) = trace_id {
        format!("{trace_id} {elapsed:?} - {status} {method} {path}")
    } else {
        format!("{elapsed:?} - {status} {method} {path}")
    };

    if status.is_server_error() {
        error!("{log}");
    } else {
        info!("{log}");
    }

    Ok(response)
}

#[instrument(skip(adapter, request))]
async fn router<B>(
    adapter: &Adapter,
    request: Request<B>,
    remote_address: Option<SocketAddr>,
) -> Result<Response<ResponseBody>, Error>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, incoming) = request.into_parts();

    let route = router::parse(&parts.method, parts.uri.path());
    debug!("Route: {route:?}");

    match route {
        Route::Unknown => Err(Error::NotFound),
        Route::Interfaces => adapter.handle_get_interfaces().await,
        Route::Log => adapter.handle_get_log().await,
        Route::GetConfig => adapter.handle_get_config().await,
        Route::PostConfig => {
            let body = read_body(incoming).await?;
            adapter
                .handle_post_config(&parts, &body, remote_address)
                .await
        }
        Route::PublicKey => adapter.handle_get_public_key().await,
        Route::RegisterUser => {
            let body = read_body(incoming).await?;
            adapter.handle_register_user(&parts, &body).await
        }
        Route::RegisterService => {
            let body = read_body(incoming).await?;
            adapter.handle_register_service(&parts, &body).await
        }
        Route::Login(kind) => adapter.handle_login(&parts, kind).await,
        Route::Authenticate => {
            let body = read_body(incoming).await?;
            adapter.handle_authenticate(&parts, &body).await
        }
        Route::Authorize => {
            let body = read_body(incoming).await?;
            adapter.handle_authorize(&parts, &body).await
        }
        Route::Userinfo => adapter.handle_userinfo(&parts).await,
        Route::Logout => adapter.handle_logout(&parts).await,
        Route::Refresh => {
            let body = read_body(incoming).await?;
            adapter.handle_refresh(&parts, &body).await
        }
        Route::Query(kind) => adapter.handle_query(&parts, kind).await,
        Route::Healthz => response::json(StatusCode::OK, &serde_json::json!({"status": "ok"})),
        Route::Metrics => {
            let (content_type, metrics) = METRICS_PROVIDER.gather()?;
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, content_type)
                .body(ResponseBody::fixed(Bytes::from(metrics)))?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::keycloak::MockIdentityProvider;
    use crate::adapter::tests::{body_of, build_adapter};
    use http_body_util::Full;

    fn request(method: &str, uri: &str, body: &'static [u8]) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from_static(body)))
            .unwrap()
    }

    async fn route(adapter: &Adapter, request: Request<Full<Bytes>>) -> Response<ResponseBody> {
        match router(adapter, request, None).await {
            Ok(response) => response,
            Err(error) => error_to_response(&error),
        }
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let test = build_adapter(MockIdentityProvider::new());

        let response = route(&test.adapter, request("GET", "/login", b"")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, r#"{"error":"Not found"}"#);

        let response = route(&test.adapter, request("PUT", "/config", b"")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_healthz() {
        let test = build_adapter(MockIdentityProvider::new());

        let response = route(&test.adapter, request("GET", "/healthz", b"")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_metrics() {
        let test = build_adapter(MockIdentityProvider::new());

        let response = route(&test.adapter, request("GET", "/metrics", b"")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_of(response).await.contains("http_requests_in_flight"));
    }

    #[tokio::test]
    async fn test_interfaces_list_every_route() {
        let test = build_adapter(MockIdentityProvider::new());

        let response = route(&test.adapter, request("GET", "/", b"")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let interfaces: Vec<serde_json::Value> =
            serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(interfaces.len(), 17);

        for interface in interfaces {
            let method = interface["method"].as_str().unwrap().parse().unwrap();
            let uri = interface["uri"].as_str().unwrap();
            assert_ne!(router::parse(&method, uri), Route::Unknown, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_post_config_without_peer_is_unauthorized() {
        let mut provider = MockIdentityProvider::new();
        provider.expect_discover().never();

        let test = build_adapter(provider);
        let response = route(
            &test.adapter,
            Request::builder()
                .method("POST")
                .uri("/config")
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(Full::new(Bytes::from_static(b"secret=s3cr3t")))
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_user_content_type_is_checked() {
        let test = build_adapter(MockIdentityProvider::new());

        let response = route(
            &test.adapter,
            request("POST", "/register/user", br#"{"username": "alice"}"#),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
