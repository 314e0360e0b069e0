//! Web layer and service orchestration.

pub mod app;
pub mod context;
pub mod middleware;
pub mod service;

pub use service::{Service, ServiceError};
