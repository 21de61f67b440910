use crate::adapter::api::{LoginKind, QueryKind};

/// Parsed request path and action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Interfaces,
    Log,
    GetConfig,
    PostConfig,
    PublicKey,
    RegisterUser,
    RegisterService,
    Login(LoginKind),
    Authenticate,
    Authorize,
    Userinfo,
    Logout,
    Refresh,
    Query(QueryKind),
    Healthz,
    Metrics,
    Unknown,
}
