//! Versioned endpoint routing for axum services.

pub mod api;
pub mod config;
pub mod errors;
pub mod system;
pub mod versioning;

pub use config::VersioningConfig;
pub use errors::VersioningError;
