pub mod http_server;
pub mod listeners;
pub mod request_ext;
mod route;
mod router;

pub use http_server::serve_request;
pub use listeners::insecure::InsecureListener;
pub use listeners::tls::TlsListener;
