//! Core worker state and the task dispatcher
//!
//! The worker owns a FIFO queue of pending task operations and the
//! authoritative map of task records for this host. The dispatcher drains the
//! queue one task per tick, interprets the dequeued task's desired state as a
//! verb against the container runtime and persists the observed outcome.
// The queue deliberately carries `Task` values (not events): the manager's
// dispatch loop already unwrapped the event and stamped the desired state on
// the embedded task before posting it here.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};
use uuid::Uuid;

use shared::task::{valid_transition, State, Task};
use shared::OrchestrationError;

use crate::runtime::{ContainerRuntime, ContainerSpec, RuntimeError};
use crate::stats::WorkerStats;

/// Execution agent state: pending queue, task records and the latest host
/// metrics snapshot.
pub struct Worker {
    /// Name of this worker, for logs and stats
    name: String,
    /// FIFO of tasks awaiting a start or stop
    queue: Mutex<VecDeque<Task>>,
    /// Authoritative task records for this host
    db: Mutex<HashMap<Uuid, Task>>,
    /// Most recent host metrics snapshot, published by the stats loop
    stats: RwLock<WorkerStats>,
    /// The container engine the dispatcher drives
    runtime: Arc<dyn ContainerRuntime>,
}

impl Worker {
    pub fn new(name: String, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            name,
            queue: Mutex::new(VecDeque::new()),
            db: Mutex::new(HashMap::new()),
            stats: RwLock::new(WorkerStats::default()),
            runtime,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a task operation. The task's state is the desired state the
    /// dispatcher will act on.
    pub async fn add_task(&self, task: Task) {
        debug!(task_id = %task.id, desired_state = %task.state, "Task queued");
        self.queue.lock().await.push_back(task);
    }

    /// Snapshot of all task records.
    pub async fn tasks(&self) -> Vec<Task> {
        self.db.lock().await.values().cloned().collect()
    }

    /// Look up one task record by id.
    pub async fn task(&self, task_id: Uuid) -> Option<Task> {
        self.db.lock().await.get(&task_id).cloned()
    }

    /// Number of task records on this worker.
    pub async fn task_count(&self) -> usize {
        self.db.lock().await.len()
    }

    /// Latest host metrics snapshot.
    pub async fn stats(&self) -> WorkerStats {
        self.stats.read().await.clone()
    }

    /// Publish a fresh host metrics snapshot.
    pub async fn update_stats(&self, snapshot: WorkerStats) {
        *self.stats.write().await = snapshot;
    }

    /// One dispatcher step: dequeue a single task and act on it.
    ///
    /// Returns `None` when the queue was empty. The dispatcher never retries;
    /// the caller logs a failed result and continues, and the manager's
    /// health loop is the only restart authority.
    pub async fn run_next_task(&self) -> Option<shared::Result<()>> {
        let queued = self.queue.lock().await.pop_front()?;
        Some(self.run_task(queued).await)
    }

    /// Interpret a dequeued task's desired state against the persisted record.
    async fn run_task(&self, queued: Task) -> shared::Result<()> {
        // Tasks never seen before are persisted as queued before the
        // transition check, so nothing is silently dropped.
        let persisted_state = {
            let mut db = self.db.lock().await;
            db.entry(queued.id).or_insert_with(|| queued.clone()).state
        };

        if !valid_transition(persisted_state, queued.state) {
            error!(
                task_id = %queued.id,
                from = %persisted_state,
                to = %queued.state,
                "Rejected invalid state transition"
            );
            return Err(OrchestrationError::InvalidTransition {
                from: persisted_state,
                to: queued.state,
            }
            .into());
        }

        match queued.state {
            State::Scheduled => self.start_task(queued).await,
            State::Completed => self.stop_task(queued).await,
            other => {
                error!(task_id = %queued.id, desired_state = %other, "Unsupported desired state");
                Err(OrchestrationError::UnsupportedState(other).into())
            }
        }
    }

    /// Start the container for a task and persist the observed outcome.
    async fn start_task(&self, mut task: Task) -> shared::Result<()> {
        task.start_time = Some(Utc::now());
        let spec = ContainerSpec::from_task(&task);

        match self.runtime.start(&spec).await {
            Ok(started) => {
                info!(
                    task_id = %task.id,
                    container_id = %started.container_id,
                    "Task is running"
                );
                task.container_id = Some(started.container_id);
                task.host_port = started.host_port;
                task.state = State::Running;
                self.persist(task).await;
                Ok(())
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to start task");
                task.state = State::Failed;
                self.persist(task).await;
                Err(e.into())
            }
        }
    }

    /// Stop the container for a task and persist the observed outcome.
    async fn stop_task(&self, mut task: Task) -> shared::Result<()> {
        let result = match task.container_id.as_deref().filter(|id| !id.is_empty()) {
            Some(container_id) => self.runtime.stop(container_id).await,
            None => Err(RuntimeError::Stop("task has no container id".to_string())),
        };

        match result {
            Ok(()) => {
                info!(task_id = %task.id, "Task completed");
                task.end_time = Some(Utc::now());
                task.state = State::Completed;
                self.persist(task).await;
                Ok(())
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to stop task");
                task.state = State::Failed;
                self.persist(task).await;
                Err(e.into())
            }
        }
    }

    async fn persist(&self, task: Task) {
        self.db.lock().await.insert(task.id, task);
    }
}
