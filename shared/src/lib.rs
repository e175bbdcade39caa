//! Shared data structures and utilities for the container orchestrator
//!
//! This crate contains the task model and lifecycle state machine, the wire
//! types exchanged between the manager and its workers, and the configuration
//! structures used by both binaries.

pub mod api;
pub mod config;
pub mod defaults;
pub mod task;

// Re-export commonly used types for convenience
pub use api::{endpoints, ErrorResponse};
pub use config::{ManagerConfig, WorkerConfig};
pub use task::{valid_transition, State, Task, TaskEvent, RESTART_LIMIT};

/// Result type alias used throughout the shared crate
pub type Result<T> = anyhow::Result<T>;

/// Common error types for the orchestrator
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: task::State, to: task::State },

    #[error("Unsupported desired state {0}")]
    UnsupportedState(task::State),

    #[error("Validation error: {0}")]
    Validation(String),
}
