//! Progress tracking for multi-page document jobs.
//!
//! PDF analysis can take minutes for a long paper, so each job registers a
//! [`ProcessingTask`] in the shared [`TaskRegistry`] and keeps it updated
//! as pages complete. Clients poll `GET /api/tasks/{id}` to drive progress
//! UI. The registry is in-memory only; entries do not survive a restart.
//!
//! Finished tasks (done or failed) are kept for a retention window so a
//! client can still read the terminal state, then evicted on the next
//! registration. Without eviction the map would grow by one entry per
//! upload for the life of the process.

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How long finished tasks stay readable before eviction.
const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Lifecycle states of a document-analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, not yet started.
    Pending,
    /// Rasterising PDF pages to images.
    Converting,
    /// Running segmentation over rendered pages.
    Processing,
    /// Assembling the final result.
    Saving,
    /// Finished successfully.
    Done,
    /// Finished with an error; see [`ProcessingTask::error`].
    Failed,
}

impl TaskStatus {
    fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

/// Point-in-time snapshot of a document-analysis job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingTask {
    pub id: String,
    pub file_name: String,
    pub status: TaskStatus,
    /// Human-readable description of the current phase, e.g.
    /// "Analyzing page 2/5".
    pub progress: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions_found: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct TaskEntry {
    task: ProcessingTask,
    /// Set when the task reaches a terminal status; drives eviction.
    finished_at: Option<Instant>,
}

/// Concurrent map of in-flight and recently finished tasks.
pub struct TaskRegistry {
    tasks: DashMap<String, TaskEntry>,
    retention: Duration,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that evicts finished tasks after `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            tasks: DashMap::new(),
            retention,
        }
    }

    /// Process-wide shared registry.
    pub fn shared() -> &'static TaskRegistry {
        static REGISTRY: OnceCell<TaskRegistry> = OnceCell::new();
        REGISTRY.get_or_init(TaskRegistry::new)
    }

    /// Register a new pending task. Also sweeps out finished tasks whose
    /// retention window has passed, so the map stays bounded by the number
    /// of in-flight and recently finished jobs.
    pub fn create(&self, id: &str, file_name: &str) {
        self.evict_expired();
        self.tasks.insert(
            id.to_string(),
            TaskEntry {
                task: ProcessingTask {
                    id: id.to_string(),
                    file_name: file_name.to_string(),
                    status: TaskStatus::Pending,
                    progress: "Queued".to_string(),
                    current_page: None,
                    total_pages: None,
                    questions_found: None,
                    error: None,
                },
                finished_at: None,
            },
        );
    }

    /// Apply a mutation to a task if it exists. Unknown ids are ignored so
    /// pipeline stages never have to care whether their job was registered.
    pub fn update(&self, id: &str, apply: impl FnOnce(&mut ProcessingTask)) {
        if let Some(mut entry) = self.tasks.get_mut(id) {
            apply(&mut entry.task);
            entry.finished_at = if entry.task.status.is_terminal() {
                entry.finished_at.or_else(|| Some(Instant::now()))
            } else {
                None
            };
        }
    }

    /// Snapshot of a task by id.
    pub fn get(&self, id: &str) -> Option<ProcessingTask> {
        self.tasks.get(id).map(|entry| entry.task.clone())
    }

    fn evict_expired(&self) {
        self.tasks.retain(|_, entry| match entry.finished_at {
            Some(finished) => finished.elapsed() < self.retention,
            None => true,
        });
    }
}
