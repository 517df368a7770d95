use std::sync::Arc;
use uuid::Uuid;

use crate::db::{StoreError, TaskStore};
use crate::models::task::{
    ApplyPayload, InterviewPayload, ScrapePayload, TaskOutcome, TaskPayload, TaskStatusView,
};
use crate::services::queue::{QueueError, QueuedTask, TaskQueue};
use crate::services::reporter::StatusReporter;

/// Request-time entry point: persists a task and hands it to its queue.
#[derive(Clone)]
pub struct TaskSubmitter {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn TaskQueue>,
    reporter: StatusReporter,
}

impl TaskSubmitter {
    pub fn new(store: Arc<dyn TaskStore>, queue: Arc<dyn TaskQueue>, reporter: StatusReporter) -> Self {
        Self {
            store,
            queue,
            reporter,
        }
    }

    pub async fn submit_apply(&self, payload: ApplyPayload) -> Result<Uuid, SubmitError> {
        if payload.target_url.trim().is_empty() {
            return Err(SubmitError::InvalidRequest("target URL is empty".to_string()));
        }
        self.submit(TaskPayload::Apply(payload)).await
    }

    pub async fn submit_scrape(&self, payload: ScrapePayload) -> Result<Uuid, SubmitError> {
        if payload.url.trim().is_empty() {
            return Err(SubmitError::InvalidRequest("job URL is empty".to_string()));
        }
        self.submit(TaskPayload::Scrape(payload)).await
    }

    pub async fn submit_interview(&self, payload: InterviewPayload) -> Result<Uuid, SubmitError> {
        if payload.job_title.trim().is_empty() {
            return Err(SubmitError::InvalidRequest("job title is empty".to_string()));
        }
        self.submit(TaskPayload::Interview(payload)).await
    }

    /// Persist first, then enqueue. A task whose enqueue fails is marked
    /// failed so it never sits in `queued` with nothing to run it.
    async fn submit(&self, payload: TaskPayload) -> Result<Uuid, SubmitError> {
        let task_id = Uuid::new_v4();
        self.store.create(task_id, &payload).await?;

        let task = QueuedTask::new(task_id, payload);
        if let Err(e) = self.queue.enqueue(&task).await {
            tracing::error!(task_id = %task_id, kind = %task.kind(), error = %e, "Failed to enqueue task");
            let outcome = TaskOutcome::failed(Vec::new(), format!("enqueue failed: {e}"));
            if let Err(report_err) = self.reporter.report(&task, &outcome).await {
                tracing::error!(task_id = %task_id, error = %report_err, "Failed to record enqueue failure");
            }
            return Err(SubmitError::Queue(e));
        }

        metrics::counter!("automation_tasks_submitted", "kind" => task.kind().as_str()).increment(1);
        tracing::info!(task_id = %task_id, kind = %task.kind(), target = %task.payload.target(), "Task submitted");

        Ok(task_id)
    }

    /// Current status of a task. Terminal tasks always return the same view.
    pub async fn status(&self, task_id: Uuid) -> Result<TaskStatusView, SubmitError> {
        self.store
            .get(task_id)
            .await?
            .map(TaskStatusView::from)
            .ok_or(SubmitError::NotFound(task_id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Task {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}
