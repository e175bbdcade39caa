//! Configuration types and validation for the orchestrator
//!
//! This module defines the configuration structures loaded by the manager and
//! worker binaries from their TOML files, including validation logic and the
//! serde plumbing for optional fields.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::defaults::*;
use crate::OrchestrationError;

/// Worker configuration loaded from worker.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    /// Name of this worker, used in logs and stats reporting
    #[serde(default = "default_worker_name")]
    pub name: String,
    /// Address the worker API listens on
    #[serde(default = "default_worker_listen_address")]
    pub listen_address: String,
    /// Seconds between dispatcher ticks (one queued task per tick)
    #[serde(default = "default_dispatch_interval_worker")]
    pub dispatch_interval_seconds: u64,
    /// Seconds between host metrics collections
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            listen_address: default_worker_listen_address(),
            dispatch_interval_seconds: default_dispatch_interval_worker(),
            stats_interval_seconds: default_stats_interval(),
        }
    }
}

impl WorkerConfig {
    /// Load and validate a worker configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            OrchestrationError::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| OrchestrationError::Config(format!("invalid worker config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values beyond what deserialization checks
    pub fn validate(&self) -> crate::Result<()> {
        parse_listen_address(&self.listen_address)?;
        if self.name.is_empty() {
            return Err(
                OrchestrationError::Validation("worker name cannot be empty".to_string()).into(),
            );
        }
        Ok(())
    }

    /// The listen address parsed into a socket address
    pub fn socket_address(&self) -> crate::Result<SocketAddr> {
        parse_listen_address(&self.listen_address)
    }
}

/// Manager configuration loaded from manager.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerConfig {
    /// Address the manager API listens on
    #[serde(default = "default_manager_listen_address")]
    pub listen_address: String,
    /// Worker endpoints (`host:port`) the manager places tasks on
    pub workers: Vec<String>,
    /// Seconds between dispatch ticks (one pending event per tick)
    #[serde(default = "default_dispatch_interval_manager")]
    pub dispatch_interval_seconds: u64,
    /// Seconds between reconcile passes over the workers
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,
    /// Seconds between health-check passes over the task DB
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
}

impl ManagerConfig {
    /// Load and validate a manager configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            OrchestrationError::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| OrchestrationError::Config(format!("invalid manager config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values beyond what deserialization checks
    ///
    /// Round-robin placement requires at least one worker, so an empty
    /// worker list is rejected at load time rather than at dispatch time.
    pub fn validate(&self) -> crate::Result<()> {
        parse_listen_address(&self.listen_address)?;
        if self.workers.is_empty() {
            return Err(OrchestrationError::Validation(
                "manager requires at least one worker endpoint".to_string(),
            )
            .into());
        }
        for worker in &self.workers {
            if worker.split(':').count() != 2 {
                return Err(OrchestrationError::Validation(format!(
                    "worker endpoint '{}' is not in host:port form",
                    worker
                ))
                .into());
            }
        }
        Ok(())
    }

    /// The listen address parsed into a socket address
    pub fn socket_address(&self) -> crate::Result<SocketAddr> {
        parse_listen_address(&self.listen_address)
    }
}

fn parse_listen_address(address: &str) -> crate::Result<SocketAddr> {
    address.parse().map_err(|e| {
        OrchestrationError::Config(format!("invalid listen address '{}': {}", address, e)).into()
    })
}
