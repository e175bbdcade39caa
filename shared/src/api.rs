//! Wire types for manager/worker communication
//!
//! All HTTP bodies are JSON. Task submissions carry a `TaskEvent` (see
//! [`crate::task`]); error responses use the envelope defined here so both
//! sides surface failures in the same shape.

use serde::{Deserialize, Serialize};

/// Error envelope returned on every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub http_status_code: u16,
    pub message: String,
}

impl ErrorResponse {
    /// Create an error envelope for the given status code
    pub fn new(http_status_code: u16, message: impl Into<String>) -> Self {
        Self {
            http_status_code,
            message: message.into(),
        }
    }
}

/// API endpoint paths
pub mod endpoints {
    pub const TASKS: &str = "/tasks";
    pub const STATS: &str = "/stats";
}
