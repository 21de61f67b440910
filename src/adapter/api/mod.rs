mod admin;
mod authorize;
mod login;
mod query;
mod register;

pub use admin::AdapterAdminHandlersExt;
pub use authorize::{AdapterAuthorizeHandlersExt, ValidatedToken};
pub use login::{AdapterLoginHandlersExt, LoginKind};
pub use query::{AdapterQueryHandlersExt, QueryKind};
pub use register::AdapterRegisterHandlersExt;
