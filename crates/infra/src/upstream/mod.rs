//! Access to the external hosted version-control service.

mod client;
mod credentials;
pub mod models;

pub use client::UpstreamClient;
pub use credentials::{Clients, login_exchange};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream rejected the credentials")]
    Unauthorized,
    #[error("could not decode upstream response: {0}")]
    Decode(String),
}
