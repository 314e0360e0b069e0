//! Infrastructure layer: persistence, the job engine, upstream clients, config.

pub mod config;
pub mod jobs;
pub mod store;
pub mod upstream;
