mod error;
pub mod server;
pub mod validate;

pub use error::Error;
