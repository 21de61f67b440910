use hyper::Method;

use super::route::Route;
use crate::adapter::api::{LoginKind, QueryKind};

pub fn parse(method: &Method, path: &str) -> Route {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };

    match (method, path) {
        (&Method::GET, "/") => Route::Interfaces,
        (&Method::GET, "/log") => Route::Log,
        (&Method::GET, "/config") => Route::GetConfig,
        (&Method::POST, "/config") => Route::PostConfig,
        (&Method::GET, "/public-key") => Route::PublicKey,
        (&Method::POST, "/register/user") => Route::RegisterUser,
        (&Method::POST, "/register/service") => Route::RegisterService,
        (&Method::POST, "/login/user") => Route::Login(LoginKind::User),
        (&Method::POST, "/login/service") => Route::Login(LoginKind::Service),
        (&Method::POST, "/authenticate") => Route::Authenticate,
        (&Method::GET, "/authorize") => Route::Authorize,
        (&Method::POST, "/userinfo") => Route::Userinfo,
        (&Method::POST, "/logout") => Route::Logout,
        (&Method::POST, "/refresh") => Route::Refresh,
        (&Method::GET, "/users") => Route::Query(QueryKind::Users),
        (&Method::GET, "/services") => Route::Query(QueryKind::Services),
        (&Method::GET, "/roles") => Route::Query(QueryKind::Roles),
        (&Method::GET, "/healthz") => Route::Healthz,
        (&Method::GET, "/metrics") => Route::Metrics,
        _ => Route::Unknown,
    }
}
