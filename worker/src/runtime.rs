//! Container runtime client
//!
//! The worker reaches its container engine through the [`ContainerRuntime`]
//! trait so the dispatcher can be exercised against a scripted runtime in
//! tests. The production implementation, [`DockerCli`], shells out to the
//! `docker` binary: pull, create, start and inspect on the start path, stop
//! and remove on the stop path. Stderr from a failing invocation is surfaced
//! in the error, tagged with the action that failed.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use shared::task::{PortBinding, Task};

/// Runtime failure, tagged with the verb that was being executed
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("container start failed: {0}")]
    Start(String),
    #[error("container stop failed: {0}")]
    Stop(String),
}

/// What the worker needs from a successful container start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedContainer {
    /// Runtime handle for the new container
    pub container_id: String,
    /// Host port mappings the runtime assigned
    pub host_port: HashMap<String, Vec<PortBinding>>,
}

/// Container configuration derived from a task record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Memory limit in bytes, zero meaning unlimited
    pub memory: u64,
    /// Environment entries in `KEY=value` form
    pub env: Vec<String>,
    pub restart_policy: String,
    pub exposed_ports: Vec<String>,
    pub port_bindings: HashMap<String, String>,
}

impl ContainerSpec {
    /// Build the runtime configuration for a task
    pub fn from_task(task: &Task) -> Self {
        Self {
            name: task.name.clone(),
            image: task.image.clone(),
            memory: task.memory,
            env: Vec::new(),
            restart_policy: task.restart_policy.clone(),
            exposed_ports: task.exposed_ports.clone(),
            port_bindings: task.port_bindings.clone(),
        }
    }
}

/// The interface the dispatcher consumes
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Bring a container up for the given spec and report its handle and
    /// host port mappings.
    async fn start(&self, spec: &ContainerSpec) -> Result<StartedContainer, RuntimeError>;

    /// Stop and remove the container with the given handle.
    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError>;
}

/// Container runtime backed by the local `docker` CLI
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one docker invocation, returning trimmed stdout on success and
    /// trimmed stderr on failure.
    async fn run(&self, args: &[String]) -> Result<String, String> {
        debug!(binary = %self.binary, args = ?args, "Invoking container runtime");
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {}", self.binary, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(stderr.trim().to_string());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Arguments for `docker create` from a container spec.
///
/// Ports are published-all in addition to any explicit bindings, so the
/// runtime assigns host ports for every exposed container port.
fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["create".to_string()];
    if !spec.name.is_empty() {
        args.push("--name".to_string());
        args.push(spec.name.clone());
    }
    if spec.memory > 0 {
        args.push("--memory".to_string());
        args.push(format!("{}b", spec.memory));
    }
    if !spec.restart_policy.is_empty() {
        args.push("--restart".to_string());
        args.push(spec.restart_policy.clone());
    }
    for port in &spec.exposed_ports {
        args.push("--expose".to_string());
        args.push(port.clone());
    }
    for (container_port, host_port) in &spec.port_bindings {
        args.push("--publish".to_string());
        args.push(format!("{}:{}", host_port, container_port));
    }
    for entry in &spec.env {
        args.push("--env".to_string());
        args.push(entry.clone());
    }
    args.push("--publish-all".to_string());
    args.push(spec.image.clone());
    args
}

/// One binding as `docker inspect` reports it under `NetworkSettings.Ports`
#[derive(Debug, Deserialize)]
struct InspectBinding {
    #[serde(rename = "HostIp", default)]
    host_ip: String,
    #[serde(rename = "HostPort", default)]
    host_port: String,
}

/// Parse the `NetworkSettings.Ports` JSON into the task's host port map.
///
/// Unbound ports are reported as `null` and dropped.
fn parse_port_map(json: &str) -> Result<HashMap<String, Vec<PortBinding>>, serde_json::Error> {
    let raw: HashMap<String, Option<Vec<InspectBinding>>> = serde_json::from_str(json)?;
    Ok(raw
        .into_iter()
        .filter_map(|(port, bindings)| {
            let bindings = bindings?;
            if bindings.is_empty() {
                return None;
            }
            let bindings = bindings
                .into_iter()
                .map(|b| PortBinding {
                    host_ip: b.host_ip,
                    host_port: b.host_port,
                })
                .collect();
            Some((port, bindings))
        })
        .collect())
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start(&self, spec: &ContainerSpec) -> Result<StartedContainer, RuntimeError> {
        self.run(&["pull".to_string(), spec.image.clone()])
            .await
            .map_err(RuntimeError::Start)?;
        info!(image = %spec.image, "Image pulled");

        let container_id = self
            .run(&create_args(spec))
            .await
            .map_err(RuntimeError::Start)?;

        self.run(&["start".to_string(), container_id.clone()])
            .await
            .map_err(RuntimeError::Start)?;

        let ports_json = self
            .run(&[
                "inspect".to_string(),
                "--format".to_string(),
                "{{json .NetworkSettings.Ports}}".to_string(),
                container_id.clone(),
            ])
            .await
            .map_err(RuntimeError::Start)?;
        let host_port = parse_port_map(&ports_json)
            .map_err(|e| RuntimeError::Start(format!("failed to parse port mappings: {}", e)))?;

        info!(container_id = %container_id, "Container started");
        Ok(StartedContainer {
            container_id,
            host_port,
        })
    }

    async fn stop(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.run(&["stop".to_string(), container_id.to_string()])
            .await
            .map_err(RuntimeError::Stop)?;

        // A container may already be gone when the remove runs; that is not
        // a stop failure.
        if let Err(message) = self
            .run(&["rm".to_string(), container_id.to_string()])
            .await
        {
            if !message.contains("No such container") {
                return Err(RuntimeError::Stop(message));
            }
        }

        info!(container_id = %container_id, "Container stopped and removed");
        Ok(())
    }
}
