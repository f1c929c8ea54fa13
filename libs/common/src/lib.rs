//! Shared building blocks for the adapter services
//!
//! - logging bootstrap (console + daily rolling file, runtime level reload)
//! - graceful shutdown signal handling
//! - JSON response envelopes for the local HTTP API

pub mod api_types;
pub mod logging;
pub mod shutdown;

pub use api_types::{ErrorInfo, ErrorResponse, HealthStatus, ServiceStatus, SuccessResponse};
pub use logging::LogLevelError;

#[cfg(feature = "axum")]
pub use api_types::AppError;

// Re-export common dependencies
pub use anyhow;
pub use serde_json;
