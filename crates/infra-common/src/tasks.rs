//! Tracked task management
//!
//! Every long-running task in the control plane (dispatch workers, the
//! garbage collector loop) is spawned through a [`TaskManager`] so shutdown
//! can cancel all of them and wait for completion with a bound.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::types::{Error, Result};

/// Task priority, used to order forced aborts on shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    /// Must complete even during shutdown
    Critical,
    /// Important tasks
    High,
    /// Regular tasks
    Normal,
    /// Can be cancelled early during shutdown
    Low,
}

/// Handle to a tracked task
#[derive(Debug)]
pub struct TaskHandle {
    id: usize,
    name: String,
    handle: JoinHandle<()>,
    priority: TaskPriority,
    started_at: Instant,
}

impl TaskHandle {
    /// Get task ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get task name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if task is finished
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the task
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Get task runtime
    pub fn runtime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Tracked tasks of one component of the media server
pub struct TaskManager {
    next_task_id: AtomicUsize,
    tasks: Mutex<Vec<TaskHandle>>,
    cancel_token: CancellationToken,
    active_count: Arc<AtomicUsize>,
    owner: String,
    max_tasks: usize,
    shutdown_timeout: Duration,
}

impl TaskManager {
    /// Create a task manager for the named component
    pub fn new(owner: impl Into<String>) -> Self {
        Self::with_config(owner, 1000, Duration::from_secs(5))
    }

    /// Create with custom limits
    pub fn with_config(owner: impl Into<String>, max_tasks: usize, shutdown_timeout: Duration) -> Self {
        Self {
            next_task_id: AtomicUsize::new(0),
            tasks: Mutex::new(Vec::new()),
            cancel_token: CancellationToken::new(),
            active_count: Arc::new(AtomicUsize::new(0)),
            owner: owner.into(),
            max_tasks,
            shutdown_timeout,
        }
    }

    /// Token cancelled when the owner shuts down. Tasks may watch it to
    /// finish in-progress work before exiting.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Spawn a tracked task. The future is dropped when the owner is cancelled.
    pub async fn spawn_tracked<F>(&self, name: impl Into<String>, priority: TaskPriority, future: F) -> Result<usize>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel_token.is_cancelled() {
            return Err(Error::Task(format!("{} is shutting down", self.owner)));
        }

        let active = self.active_count.load(Ordering::SeqCst);
        if active >= self.max_tasks {
            return Err(Error::Task(format!(
                "Task limit reached for {}: {} active tasks",
                self.owner, active
            )));
        }

        let task_name = name.into();
        let task_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let cancel_token = self.cancel_token.clone();
        let active_count = self.active_count.clone();
        let owner = self.owner.clone();
        let name_for_task = task_name.clone();

        self.active_count.fetch_add(1, Ordering::SeqCst);
        let wrapped = async move {
            debug!("Task started: {} [{}] of {}", name_for_task, task_id, owner);
            tokio::select! {
                _ = future => {
                    debug!("Task completed: {} [{}] of {}", name_for_task, task_id, owner);
                }
                _ = cancel_token.cancelled() => {
                    debug!("Task cancelled: {} [{}] of {}", name_for_task, task_id, owner);
                }
            }
            active_count.fetch_sub(1, Ordering::SeqCst);
        };

        let handle = tokio::spawn(wrapped);
        self.tasks.lock().await.push(TaskHandle {
            id: task_id,
            name: task_name,
            handle,
            priority,
            started_at: Instant::now(),
        });

        Ok(task_id)
    }

    /// Get number of active tasks
    pub fn active_task_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Whether `shutdown_all`/`cancel_all` has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Cancel all tasks cooperatively
    pub fn cancel_all(&self) {
        debug!("Cancelling all tasks of {}", self.owner);
        self.cancel_token.cancel();
    }

    /// Cancel all tasks and wait for them, aborting stragglers after the
    /// shutdown timeout.
    pub async fn shutdown_all(&self) -> Result<()> {
        let start = Instant::now();
        debug!(
            "Starting shutdown for {} with {} active tasks",
            self.owner,
            self.active_task_count()
        );

        self.cancel_all();

        match tokio::time::timeout(self.shutdown_timeout, self.wait_for_completion()).await {
            Ok(()) => {
                debug!("{} shutdown completed in {:?}", self.owner, start.elapsed());
            }
            Err(_) => {
                warn!(
                    "{} shutdown timed out after {:?}, forcing abort",
                    self.owner, self.shutdown_timeout
                );
                self.abort_all().await;
            }
        }

        self.tasks.lock().await.clear();
        Ok(())
    }

    async fn wait_for_completion(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn abort_all(&self) {
        let mut tasks = self.tasks.lock().await;
        // Low priority first
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));

        for task in tasks.iter() {
            if !task.is_finished() {
                warn!("Force aborting task: {} [{}] after {:?}", task.name, task.id, task.runtime());
                task.abort();
            }
        }
        // Aborted futures never reach the decrement
        self.active_count.store(0, Ordering::SeqCst);
    }

    /// Drop handles of finished tasks
    pub async fn cleanup_finished(&self) {
        self.tasks.lock().await.retain(|task| !task.is_finished());
    }

    /// Get task statistics
    pub async fn stats(&self) -> TaskStats {
        let tasks = self.tasks.lock().await;
        TaskStats {
            owner: self.owner.clone(),
            total_tasks: tasks.len(),
            active_tasks: self.active_count.load(Ordering::SeqCst),
            finished_tasks: tasks.iter().filter(|t| t.is_finished()).count(),
        }
    }
}

/// Task statistics
#[derive(Debug, Clone)]
pub struct TaskStats {
    pub owner: String,
    pub total_tasks: usize,
    pub active_tasks: usize,
    pub finished_tasks: usize,
}
