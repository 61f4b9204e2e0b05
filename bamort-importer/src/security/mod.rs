//! Request guards applied before any business logic
//!
//! - Per-user rate limiting ([`rate_limit`])
//! - Upload byte ceiling ([`upload_limit`])
//! - JSON nesting depth ([`json_depth`])
//! - Adapter host allow-list ([`host_guard`])

pub mod host_guard;
pub mod json_depth;
pub mod rate_limit;
pub mod upload_limit;

pub use host_guard::HostGuard;
pub use json_depth::{check_json_depth, looks_like_json};
pub use rate_limit::{RateLimiter, RateLimits};
pub use upload_limit::CappedBuffer;

use std::time::Duration;
use thiserror::Error;

/// Rejection raised by a guard
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SecurityError {
    #[error("Rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Upload exceeds the {limit} byte limit")]
    FileTooLarge { limit: usize },

    #[error("JSON depth exceeds maximum of {max} levels")]
    JsonTooDeep { max: usize },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid adapter URL: {0}")]
    InvalidUrl(String),

    #[error("Adapter host {host} rejected: {reason}")]
    HostRejected { host: String, reason: String },

    #[error("User not authenticated")]
    MissingUser,
}
