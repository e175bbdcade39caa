//! Task model and lifecycle state machine
//!
//! This module defines the unit of work the orchestrator manages: the `Task`
//! record, the `TaskEvent` command envelope, and the lifecycle `State` machine
//! with its transition oracle. Both the manager and the workers operate on
//! these types; they are serialized as-is on the wire.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of times the manager will restart a task.
///
/// Once `restart_count` reaches this ceiling the task is no longer probed or
/// restarted; it remains in whatever state the worker last reported.
pub const RESTART_LIMIT: u32 = 3;

/// Lifecycle state of a task.
///
/// A task is first observed in `Pending`, moves to `Scheduled` when the
/// manager places it on a worker, to `Running` when the worker's container
/// start succeeds, to `Completed` on a requested stop and to `Failed` when
/// the runtime errors. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    #[default]
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl State {
    /// Whether this state has no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Pending => "pending",
            State::Scheduled => "scheduled",
            State::Running => "running",
            State::Completed => "completed",
            State::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The transition oracle consulted by the worker before every start or stop.
///
/// Returns true when `to` may follow `from`. Idempotent re-delivery is
/// tolerated for `Scheduled` and `Running` (`from == to` is permitted there)
/// but terminal states admit nothing, including themselves.
pub fn valid_transition(from: State, to: State) -> bool {
    match from {
        State::Pending => matches!(to, State::Scheduled),
        State::Scheduled => matches!(to, State::Scheduled | State::Running | State::Failed),
        State::Running => matches!(to, State::Running | State::Completed | State::Failed),
        State::Completed | State::Failed => false,
    }
}

/// One host-side port mapping reported by the container runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PortBinding {
    /// Host interface the port is bound on (may be empty for wildcard binds)
    #[serde(default)]
    pub host_ip: String,
    /// Host port number, as reported by the runtime
    #[serde(default)]
    pub host_port: String,
}

/// Desired specification of one container and its observed state.
///
/// The submitter assigns `id`; the worker owns `container_id`, `host_port`,
/// `start_time` and `end_time` and the manager only copies them back during
/// reconcile. Everything else is authoritative on the manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Task {
    /// Stable unique identifier, assigned by the submitter
    pub id: Uuid,
    /// Opaque runtime handle, populated once the runtime reports a create
    #[serde(default)]
    pub container_id: Option<String>,
    /// Human-readable name, also passed to the runtime as the container name
    #[serde(default)]
    pub name: String,
    /// Current lifecycle state
    #[serde(default)]
    pub state: State,
    /// Runtime image reference
    #[serde(default)]
    pub image: String,
    /// Memory hint in bytes
    #[serde(default)]
    pub memory: u64,
    /// Disk hint in gigabytes
    #[serde(default)]
    pub disk: u64,
    /// Container ports to expose, in `"80/tcp"` form
    #[serde(default)]
    pub exposed_ports: Vec<String>,
    /// Host port mappings, populated by the runtime after a successful start
    #[serde(default)]
    pub host_port: HashMap<String, Vec<PortBinding>>,
    /// Requested container-port to host-port bindings
    #[serde(default)]
    pub port_bindings: HashMap<String, String>,
    /// Restart policy string passed through to the runtime
    #[serde(default)]
    pub restart_policy: String,
    /// Set by the worker when the container start succeeds
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Set by the worker when the container stop succeeds
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Optional HTTP path the manager probes for liveness
    #[serde(default)]
    pub health_check: Option<String>,
    /// Number of times the manager has restarted this task
    #[serde(default)]
    pub restart_count: u32,
}

impl Task {
    /// Create a task in `Pending` with the given identity and image.
    ///
    /// Everything else starts at its default; resource hints and ports are
    /// filled in by the submitter as needed.
    pub fn new(id: Uuid, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id,
            container_id: None,
            name: name.into(),
            state: State::Pending,
            image: image.into(),
            memory: 0,
            disk: 0,
            exposed_ports: Vec::new(),
            host_port: HashMap::new(),
            port_bindings: HashMap::new(),
            restart_policy: String::new(),
            start_time: None,
            end_time: None,
            health_check: None,
            restart_count: 0,
        }
    }

    /// First host port of the first binding, if the runtime reported any.
    pub fn first_host_port(&self) -> Option<&str> {
        self.host_port
            .values()
            .next()
            .and_then(|bindings| bindings.first())
            .map(|binding| binding.host_port.as_str())
    }
}

/// An inbound command carrying a full task with a desired state.
///
/// The worker interprets the embedded task's state as a verb: `Scheduled`
/// means start, `Completed` means stop. The envelope `state` is
/// informational.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TaskEvent {
    pub id: Uuid,
    #[serde(default)]
    pub state: State,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub task: Task,
}

impl TaskEvent {
    /// Wrap a task in a fresh event envelope.
    pub fn new(state: State, task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            state,
            timestamp: Utc::now(),
            task,
        }
    }
}
