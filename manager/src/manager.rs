//! Core manager state and the three control loops
//!
//! The manager owns global task placement and supervision: a FIFO of pending
//! task events drained by the dispatch loop, the authoritative task and event
//! maps, the worker inventory with its two placement indexes, and the
//! reconcile and health-check passes that pull observed state back from the
//! workers and restart unhealthy tasks up to a bounded count.

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared::api::endpoints;
use shared::task::{State, Task, TaskEvent, RESTART_LIMIT};
use shared::ErrorResponse;

use crate::scheduler::{RoundRobin, Scheduler};

/// Control-plane state shared by the API handlers and the periodic loops.
pub struct Manager {
    /// FIFO of task events awaiting dispatch
    pending: Mutex<VecDeque<TaskEvent>>,
    /// The manager's view of every task, keyed by task id
    task_db: Mutex<HashMap<Uuid, Task>>,
    /// Append-only history of accepted submissions, keyed by event id
    event_db: Mutex<HashMap<Uuid, TaskEvent>>,
    /// Worker endpoints (`host:port`) in configuration order
    workers: Vec<String>,
    /// Task ids placed on each worker
    worker_task_map: Mutex<HashMap<String, Vec<Uuid>>>,
    /// Which worker each task was placed on
    task_worker_map: Mutex<HashMap<Uuid, String>>,
    /// Placement policy holding the round-robin cursor
    scheduler: Mutex<Box<dyn Scheduler>>,
    client: reqwest::Client,
}

impl Manager {
    pub fn new(workers: Vec<String>) -> Self {
        let worker_task_map = workers
            .iter()
            .map(|worker| (worker.clone(), Vec::new()))
            .collect();
        Self {
            pending: Mutex::new(VecDeque::new()),
            task_db: Mutex::new(HashMap::new()),
            event_db: Mutex::new(HashMap::new()),
            workers,
            worker_task_map: Mutex::new(worker_task_map),
            task_worker_map: Mutex::new(HashMap::new()),
            scheduler: Mutex::new(Box::new(RoundRobin::default())),
            client: reqwest::Client::new(),
        }
    }

    /// Accept a task event for later dispatch.
    pub async fn add_event(&self, event: TaskEvent) {
        info!(
            event_id = %event.id,
            task_id = %event.task.id,
            state = %event.state,
            "Task event accepted"
        );
        self.pending.lock().await.push_back(event);
    }

    /// Number of events awaiting dispatch.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Snapshot of the manager's task view.
    pub async fn tasks(&self) -> Vec<Task> {
        self.task_db.lock().await.values().cloned().collect()
    }

    /// Look up one task by id.
    pub async fn task(&self, task_id: Uuid) -> Option<Task> {
        self.task_db.lock().await.get(&task_id).cloned()
    }

    /// One dispatch step: drain at most one pending event onto a worker.
    ///
    /// The task is recorded (placement maps, task DB, event DB) before the
    /// POST, so a transport failure re-enqueues the event without losing the
    /// placement decision. A worker that rejects the event has made its
    /// decision; retrying would loop, so the event is dropped with a log.
    pub async fn dispatch_next(&self) {
        let Some(mut event) = self.pending.lock().await.pop_front() else {
            debug!("No pending task events");
            return;
        };

        let worker = {
            let mut scheduler = self.scheduler.lock().await;
            match scheduler.pick(&self.workers) {
                Some(index) => self.workers[index].clone(),
                None => {
                    error!("No workers available, returning event to the queue");
                    self.pending.lock().await.push_front(event);
                    return;
                }
            }
        };

        {
            let mut worker_task_map = self.worker_task_map.lock().await;
            worker_task_map
                .entry(worker.clone())
                .or_default()
                .push(event.task.id);
        }
        self.task_worker_map
            .lock()
            .await
            .insert(event.task.id, worker.clone());

        // Stop requests keep Completed; new submissions move to Scheduled.
        if event.task.state != State::Completed {
            event.task.state = State::Scheduled;
        }
        self.task_db
            .lock()
            .await
            .insert(event.task.id, event.task.clone());
        self.event_db.lock().await.insert(event.id, event.clone());

        info!(
            task_id = %event.task.id,
            worker = %worker,
            desired_state = %event.task.state,
            "Dispatching task event"
        );

        let url = format!("http://{}{}", worker, endpoints::TASKS);
        match self.client.post(&url).json(&event).send().await {
            Err(e) => {
                warn!(
                    worker = %worker,
                    error = %e,
                    "Failed to reach worker, re-enqueueing event"
                );
                self.pending.lock().await.push_back(event);
            }
            Ok(response) if response.status() != reqwest::StatusCode::CREATED => {
                let status = response.status();
                match response.json::<ErrorResponse>().await {
                    Ok(envelope) => error!(
                        worker = %worker,
                        status = %status,
                        message = %envelope.message,
                        "Worker rejected task event"
                    ),
                    Err(e) => error!(
                        worker = %worker,
                        status = %status,
                        error = %e,
                        "Worker rejected task event with an undecodable body"
                    ),
                }
            }
            Ok(_) => debug!(task_id = %event.task.id, worker = %worker, "Task event delivered"),
        }
    }

    /// One reconcile pass: pull each worker's task list and merge the
    /// worker-owned fields into the local view.
    ///
    /// Transport or status failures skip that worker for this pass. A task
    /// the manager does not know aborts the rest of that worker's list.
    pub async fn reconcile(&self) {
        debug!("Reconciling task state from workers");
        for worker in &self.workers {
            let url = format!("http://{}{}", worker, endpoints::TASKS);
            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(worker = %worker, error = %e, "Failed to reach worker during reconcile");
                    continue;
                }
            };
            if !response.status().is_success() {
                warn!(
                    worker = %worker,
                    status = %response.status(),
                    "Worker returned an error during reconcile"
                );
                continue;
            }
            let remote_tasks: Vec<Task> = match response.json().await {
                Ok(tasks) => tasks,
                Err(e) => {
                    warn!(worker = %worker, error = %e, "Failed to decode worker task list");
                    continue;
                }
            };

            let mut task_db = self.task_db.lock().await;
            for remote in remote_tasks {
                match task_db.get_mut(&remote.id) {
                    Some(local) => {
                        // The worker is authoritative for what it observed;
                        // everything else stays as the manager recorded it.
                        local.state = remote.state;
                        local.start_time = remote.start_time;
                        local.end_time = remote.end_time;
                        local.container_id = remote.container_id;
                    }
                    None => {
                        error!(
                            task_id = %remote.id,
                            worker = %worker,
                            "Worker reported an unknown task, skipping the rest of its list"
                        );
                        break;
                    }
                }
            }
        }
    }

    /// One health pass over the task DB.
    ///
    /// Running tasks below the restart ceiling are probed over their
    /// advertised health endpoint; failed probes and tasks observed `Failed`
    /// trigger a restart. Tasks at the ceiling are left as observed.
    pub async fn health_checks(&self) {
        for task in self.tasks().await {
            if task.restart_count >= RESTART_LIMIT {
                continue;
            }
            match task.state {
                State::Running => {
                    // Tasks that never advertised a health path are not
                    // probed; they can still be restarted if observed Failed.
                    let Some(path) = task.health_check.clone() else {
                        continue;
                    };
                    if let Err(reason) = self.probe_task(&task, &path).await {
                        warn!(task_id = %task.id, reason = %reason, "Health probe failed");
                        self.restart_task(task).await;
                    }
                }
                State::Failed => {
                    self.restart_task(task).await;
                }
                _ => {}
            }
        }
    }

    /// Probe one running task's health endpoint.
    ///
    /// The URL is the owning worker's host joined with the first host port
    /// the runtime reported; a missing port, a transport error or any
    /// non-200 answer is a probe failure.
    async fn probe_task(&self, task: &Task, path: &str) -> Result<(), String> {
        let worker = self
            .task_worker_map
            .lock()
            .await
            .get(&task.id)
            .cloned()
            .ok_or_else(|| "task has no placed worker".to_string())?;
        let host = worker.split(':').next().unwrap_or(worker.as_str()).to_string();
        let port = task
            .first_host_port()
            .ok_or_else(|| "no host port reported".to_string())?
            .to_string();

        let url = format!("http://{}:{}{}", host, port, path);
        debug!(task_id = %task.id, url = %url, "Probing task health");
        match self.client.get(&url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => Ok(()),
            Ok(response) => Err(format!("health endpoint returned {}", response.status())),
            Err(e) => Err(format!("health probe transport error: {}", e)),
        }
    }

    /// Restart a task on the worker it was placed on, counting the attempt.
    ///
    /// The fresh event goes straight to the worker; if the worker is
    /// unreachable the event joins the pending queue for the dispatch loop
    /// to retry.
    async fn restart_task(&self, mut task: Task) {
        let Some(worker) = self.task_worker_map.lock().await.get(&task.id).cloned() else {
            error!(task_id = %task.id, "Cannot restart a task with no placed worker");
            return;
        };

        task.state = State::Scheduled;
        task.restart_count += 1;
        self.task_db.lock().await.insert(task.id, task.clone());
        info!(
            task_id = %task.id,
            worker = %worker,
            restart_count = task.restart_count,
            "Restarting task"
        );

        let event = TaskEvent::new(State::Running, task);
        let url = format!("http://{}{}", worker, endpoints::TASKS);
        match self.client.post(&url).json(&event).send().await {
            Err(e) => {
                warn!(
                    worker = %worker,
                    error = %e,
                    "Failed to reach worker for restart, queueing event for dispatch"
                );
                self.pending.lock().await.push_back(event);
            }
            Ok(response) if response.status() != reqwest::StatusCode::CREATED => {
                let status = response.status();
                match response.json::<ErrorResponse>().await {
                    Ok(envelope) => error!(
                        worker = %worker,
                        status = %status,
                        message = %envelope.message,
                        "Worker rejected restart event"
                    ),
                    Err(e) => error!(
                        worker = %worker,
                        status = %status,
                        error = %e,
                        "Worker rejected restart event with an undecodable body"
                    ),
                }
            }
            Ok(_) => debug!(task_id = %event.task.id, worker = %worker, "Restart event delivered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State as AxumState;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex as StdMutex};

    /// In-process worker double: records every POSTed event under a label,
    /// serves a scripted task list and a scripted health status.
    #[derive(Clone)]
    struct StubWorker {
        label: &'static str,
        log: Arc<StdMutex<Vec<(&'static str, TaskEvent)>>>,
        tasks: Arc<StdMutex<Vec<Task>>>,
        post_status: StatusCode,
        health_status: StatusCode,
    }

    impl StubWorker {
        fn new(label: &'static str, log: Arc<StdMutex<Vec<(&'static str, TaskEvent)>>>) -> Self {
            Self {
                label,
                log,
                tasks: Arc::new(StdMutex::new(Vec::new())),
                post_status: StatusCode::CREATED,
                health_status: StatusCode::OK,
            }
        }
    }

    async fn stub_submit(
        AxumState(stub): AxumState<StubWorker>,
        Json(event): Json<TaskEvent>,
    ) -> axum::response::Response {
        stub.log.lock().unwrap().push((stub.label, event));
        if stub.post_status == StatusCode::CREATED {
            StatusCode::CREATED.into_response()
        } else {
            (
                stub.post_status,
                Json(ErrorResponse::new(
                    stub.post_status.as_u16(),
                    "scripted rejection",
                )),
            )
                .into_response()
        }
    }

    async fn stub_list(AxumState(stub): AxumState<StubWorker>) -> Json<Vec<Task>> {
        Json(stub.tasks.lock().unwrap().clone())
    }

    async fn stub_health(AxumState(stub): AxumState<StubWorker>) -> StatusCode {
        stub.health_status
    }

    /// Serve a stub worker on an ephemeral port, returning its endpoint.
    async fn spawn_stub_worker(stub: StubWorker) -> String {
        let app = Router::new()
            .route("/tasks", get(stub_list).post(stub_submit))
            .route("/health", get(stub_health))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        endpoint
    }

    /// An endpoint nothing is listening on.
    async fn offline_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);
        endpoint
    }

    fn new_log() -> Arc<StdMutex<Vec<(&'static str, TaskEvent)>>> {
        Arc::new(StdMutex::new(Vec::new()))
    }

    fn submission(state: State) -> TaskEvent {
        let mut task = Task::new(Uuid::new_v4(), "test-container", "nginx:latest");
        task.state = state;
        TaskEvent::new(state, task)
    }

    #[tokio::test]
    async fn test_dispatch_round_robin_order() {
        let log = new_log();
        let w1 = spawn_stub_worker(StubWorker::new("w1", log.clone())).await;
        let w2 = spawn_stub_worker(StubWorker::new("w2", log.clone())).await;
        let w3 = spawn_stub_worker(StubWorker::new("w3", log.clone())).await;
        let manager = Manager::new(vec![w1, w2, w3]);

        for _ in 0..6 {
            manager.add_event(submission(State::Pending)).await;
        }
        for _ in 0..6 {
            manager.dispatch_next().await;
        }

        let labels: Vec<&'static str> = log.lock().unwrap().iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["w2", "w3", "w1", "w2", "w3", "w1"]);
    }

    #[tokio::test]
    async fn test_dispatch_records_task_before_posting() {
        let log = new_log();
        let endpoint = spawn_stub_worker(StubWorker::new("w1", log.clone())).await;
        let manager = Manager::new(vec![endpoint.clone()]);

        let event = submission(State::Pending);
        let task_id = event.task.id;
        let event_id = event.id;
        manager.add_event(event).await;
        manager.dispatch_next().await;

        // New submissions move to Scheduled before the POST.
        assert_eq!(manager.task(task_id).await.unwrap().state, State::Scheduled);
        assert!(manager.event_db.lock().await.contains_key(&event_id));
        let posted = &log.lock().unwrap()[0].1;
        assert_eq!(posted.task.state, State::Scheduled);

        // Placement maps are inverse of each other.
        assert_eq!(
            manager.task_worker_map.lock().await.get(&task_id),
            Some(&endpoint)
        );
        assert!(manager.worker_task_map.lock().await[&endpoint].contains(&task_id));
    }

    #[tokio::test]
    async fn test_dispatch_keeps_completed_state_for_stop_events() {
        let log = new_log();
        let endpoint = spawn_stub_worker(StubWorker::new("w1", log.clone())).await;
        let manager = Manager::new(vec![endpoint]);

        let event = submission(State::Completed);
        let task_id = event.task.id;
        manager.add_event(event).await;
        manager.dispatch_next().await;

        assert_eq!(manager.task(task_id).await.unwrap().state, State::Completed);
        assert_eq!(log.lock().unwrap()[0].1.task.state, State::Completed);
    }

    #[tokio::test]
    async fn test_dispatch_reenqueues_on_transport_failure() {
        let endpoint = offline_endpoint().await;
        let manager = Manager::new(vec![endpoint]);

        let event = submission(State::Pending);
        let task_id = event.task.id;
        manager.add_event(event).await;
        assert_eq!(manager.pending_len().await, 1);

        manager.dispatch_next().await;

        // The event is back in the queue and the task was recorded before
        // the POST was attempted.
        assert_eq!(manager.pending_len().await, 1);
        assert_eq!(manager.task(task_id).await.unwrap().state, State::Scheduled);

        manager.dispatch_next().await;
        assert_eq!(manager.pending_len().await, 1);
    }

    #[tokio::test]
    async fn test_dispatch_drops_event_rejected_by_worker() {
        let log = new_log();
        let mut stub = StubWorker::new("w1", log.clone());
        stub.post_status = StatusCode::BAD_REQUEST;
        let endpoint = spawn_stub_worker(stub).await;
        let manager = Manager::new(vec![endpoint]);

        manager.add_event(submission(State::Pending)).await;
        manager.dispatch_next().await;

        // The worker made its decision; retrying would loop.
        assert_eq!(manager.pending_len().await, 0);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_merges_observed_fields_only() {
        let log = new_log();
        let stub = StubWorker::new("w1", log.clone());
        let remote_tasks = stub.tasks.clone();
        let endpoint = spawn_stub_worker(stub).await;
        let manager = Manager::new(vec![endpoint]);

        let task_id = Uuid::new_v4();
        let mut local = Task::new(task_id, "web", "nginx:latest");
        local.state = State::Scheduled;
        local.restart_count = 2;
        manager.task_db.lock().await.insert(task_id, local);

        let mut remote = Task::new(task_id, "renamed-on-worker", "other:image");
        remote.state = State::Running;
        remote.container_id = Some("c-42".to_string());
        remote.start_time = Some(chrono::Utc::now());
        remote.restart_count = 9;
        remote_tasks.lock().unwrap().push(remote.clone());

        manager.reconcile().await;

        let merged = manager.task(task_id).await.unwrap();
        assert_eq!(merged.state, State::Running);
        assert_eq!(merged.container_id.as_deref(), Some("c-42"));
        assert_eq!(merged.start_time, remote.start_time);
        // Manager-authoritative fields are untouched.
        assert_eq!(merged.name, "web");
        assert_eq!(merged.image, "nginx:latest");
        assert_eq!(merged.restart_count, 2);
    }

    #[tokio::test]
    async fn test_reconcile_aborts_worker_list_on_unknown_task() {
        let log = new_log();
        let stub = StubWorker::new("w1", log.clone());
        let remote_tasks = stub.tasks.clone();
        let endpoint = spawn_stub_worker(stub).await;
        let manager = Manager::new(vec![endpoint]);

        let known_id = Uuid::new_v4();
        let mut known = Task::new(known_id, "known", "nginx:latest");
        known.state = State::Scheduled;
        manager.task_db.lock().await.insert(known_id, known);

        // The unknown task comes first; the known one after it is never
        // merged because the pass stops at the unknown id.
        let mut unknown = Task::new(Uuid::new_v4(), "stray", "nginx:latest");
        unknown.state = State::Running;
        let mut known_remote = Task::new(known_id, "known", "nginx:latest");
        known_remote.state = State::Running;
        {
            let mut tasks = remote_tasks.lock().unwrap();
            tasks.push(unknown);
            tasks.push(known_remote);
        }

        manager.reconcile().await;

        assert_eq!(manager.task(known_id).await.unwrap().state, State::Scheduled);
        // The stray task is not adopted either.
        assert_eq!(manager.tasks().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_skips_unreachable_worker() {
        let endpoint = offline_endpoint().await;
        let manager = Manager::new(vec![endpoint]);
        // Must not error or panic; the pass simply moves on.
        manager.reconcile().await;
        assert!(manager.tasks().await.is_empty());
    }

    /// Seed a placed task directly into the manager's records.
    async fn place_task(manager: &Manager, task: Task, worker: &str) {
        manager
            .task_worker_map
            .lock()
            .await
            .insert(task.id, worker.to_string());
        manager
            .worker_task_map
            .lock()
            .await
            .entry(worker.to_string())
            .or_default()
            .push(task.id);
        manager.task_db.lock().await.insert(task.id, task);
    }

    #[tokio::test]
    async fn test_failed_task_restarts_until_limit() {
        let log = new_log();
        let endpoint = spawn_stub_worker(StubWorker::new("w1", log.clone())).await;
        let manager = Manager::new(vec![endpoint.clone()]);

        let task_id = Uuid::new_v4();
        let mut task = Task::new(task_id, "flaky", "nginx:latest");
        task.state = State::Failed;
        place_task(&manager, task, &endpoint).await;

        let mut observed_counts = Vec::new();
        for _ in 0..5 {
            // Each pass sees the task as the reconcile loop would after the
            // worker reported another failure.
            manager.task_db.lock().await.get_mut(&task_id).unwrap().state = State::Failed;
            manager.health_checks().await;
            observed_counts.push(manager.task(task_id).await.unwrap().restart_count);
        }

        assert_eq!(observed_counts, vec![1, 2, 3, 3, 3]);
        // Exactly three restart events reached the worker.
        assert_eq!(log.lock().unwrap().len(), 3);
        // Once at the ceiling the task is left as observed.
        assert_eq!(manager.task(task_id).await.unwrap().state, State::Failed);
    }

    #[tokio::test]
    async fn test_probe_failure_triggers_restart() {
        let log = new_log();
        let mut stub = StubWorker::new("w1", log.clone());
        stub.health_status = StatusCode::INTERNAL_SERVER_ERROR;
        let endpoint = spawn_stub_worker(stub).await;
        let port = endpoint.rsplit(':').next().unwrap().to_string();
        let manager = Manager::new(vec![endpoint.clone()]);

        let task_id = Uuid::new_v4();
        let mut task = Task::new(task_id, "web", "nginx:latest");
        task.state = State::Running;
        task.health_check = Some("/health".to_string());
        task.host_port.insert(
            "80/tcp".to_string(),
            vec![shared::task::PortBinding {
                host_ip: "127.0.0.1".to_string(),
                host_port: port,
            }],
        );
        place_task(&manager, task, &endpoint).await;

        manager.health_checks().await;

        let restarted = manager.task(task_id).await.unwrap();
        assert_eq!(restarted.restart_count, 1);
        assert_eq!(restarted.state, State::Scheduled);
        let events = log.lock().unwrap();
        assert_eq!(events.len(), 1);
        // The restart envelope carries Running; the embedded task carries
        // the Scheduled verb for the worker's dispatcher.
        assert_eq!(events[0].1.state, State::Running);
        assert_eq!(events[0].1.task.state, State::Scheduled);
    }

    #[tokio::test]
    async fn test_healthy_probe_leaves_task_alone() {
        let log = new_log();
        let stub = StubWorker::new("w1", log.clone());
        let endpoint = spawn_stub_worker(stub).await;
        let port = endpoint.rsplit(':').next().unwrap().to_string();
        let manager = Manager::new(vec![endpoint.clone()]);

        let task_id = Uuid::new_v4();
        let mut task = Task::new(task_id, "web", "nginx:latest");
        task.state = State::Running;
        task.health_check = Some("/health".to_string());
        task.host_port.insert(
            "80/tcp".to_string(),
            vec![shared::task::PortBinding {
                host_ip: "127.0.0.1".to_string(),
                host_port: port,
            }],
        );
        place_task(&manager, task, &endpoint).await;

        manager.health_checks().await;

        let unchanged = manager.task(task_id).await.unwrap();
        assert_eq!(unchanged.state, State::Running);
        assert_eq!(unchanged.restart_count, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_running_task_with_missing_host_port_is_restarted() {
        let log = new_log();
        let endpoint = spawn_stub_worker(StubWorker::new("w1", log.clone())).await;
        let manager = Manager::new(vec![endpoint.clone()]);

        let task_id = Uuid::new_v4();
        let mut task = Task::new(task_id, "web", "nginx:latest");
        task.state = State::Running;
        task.health_check = Some("/health".to_string());
        // No host_port reported: the probe cannot be built, which counts as
        // a probe failure.
        place_task(&manager, task, &endpoint).await;

        manager.health_checks().await;
        assert_eq!(manager.task(task_id).await.unwrap().restart_count, 1);
    }

    #[tokio::test]
    async fn test_running_task_without_health_path_is_not_probed() {
        let log = new_log();
        let endpoint = spawn_stub_worker(StubWorker::new("w1", log.clone())).await;
        let manager = Manager::new(vec![endpoint.clone()]);

        let task_id = Uuid::new_v4();
        let mut task = Task::new(task_id, "quiet", "nginx:latest");
        task.state = State::Running;
        place_task(&manager, task, &endpoint).await;

        manager.health_checks().await;

        assert_eq!(manager.task(task_id).await.unwrap().restart_count, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restart_transport_failure_queues_wrapped_event() {
        let endpoint = offline_endpoint().await;
        let manager = Manager::new(vec![endpoint.clone()]);

        let task_id = Uuid::new_v4();
        let mut task = Task::new(task_id, "web", "nginx:latest");
        task.state = State::Failed;
        place_task(&manager, task, &endpoint).await;

        manager.health_checks().await;

        // The restart could not be delivered: the mutated task is wrapped in
        // an event and waits for the dispatch loop.
        assert_eq!(manager.pending_len().await, 1);
        let pending = manager.pending.lock().await;
        let queued = pending.front().unwrap();
        assert_eq!(queued.task.id, task_id);
        assert_eq!(queued.task.state, State::Scheduled);
        assert_eq!(queued.task.restart_count, 1);
    }

    #[tokio::test]
    async fn test_terminal_completed_task_is_never_restarted() {
        let log = new_log();
        let endpoint = spawn_stub_worker(StubWorker::new("w1", log.clone())).await;
        let manager = Manager::new(vec![endpoint.clone()]);

        let task_id = Uuid::new_v4();
        let mut task = Task::new(task_id, "done", "nginx:latest");
        task.state = State::Completed;
        place_task(&manager, task, &endpoint).await;

        manager.health_checks().await;

        assert_eq!(manager.task(task_id).await.unwrap().restart_count, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_placement_maps_stay_inverse_over_dispatches() {
        let log = new_log();
        let w1 = spawn_stub_worker(StubWorker::new("w1", log.clone())).await;
        let w2 = spawn_stub_worker(StubWorker::new("w2", log.clone())).await;
        let manager = Manager::new(vec![w1, w2]);

        for _ in 0..5 {
            manager.add_event(submission(State::Pending)).await;
            manager.dispatch_next().await;
        }

        let task_worker_map = manager.task_worker_map.lock().await;
        let worker_task_map = manager.worker_task_map.lock().await;
        assert_eq!(task_worker_map.len(), 5);
        for (task_id, worker) in task_worker_map.iter() {
            assert!(worker_task_map[worker].contains(task_id));
        }
    }
}
