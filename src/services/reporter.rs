use std::sync::Arc;

use crate::db::{StoreError, TaskStore};
use crate::models::task::TaskOutcome;
use crate::services::notifier::{Notifier, TaskEvent};
use crate::services::queue::QueuedTask;

/// Records task outcomes durably and forwards terminal ones to the
/// notification webhook.
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<dyn TaskStore>,
    notifier: Arc<dyn Notifier>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn TaskStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Persist `outcome` for `task`. Returns whether the row changed; a task
    /// that was already terminal is left untouched and not re-notified.
    ///
    /// The notification runs on its own spawned task and is never awaited.
    pub async fn report(&self, task: &QueuedTask, outcome: &TaskOutcome) -> Result<bool, StoreError> {
        let recorded = self.store.record(task.task_id, outcome).await?;

        if !recorded {
            tracing::info!(task_id = %task.task_id, "Task already terminal, outcome not recorded");
            return Ok(false);
        }

        tracing::info!(
            task_id = %task.task_id,
            kind = %task.kind(),
            status = %outcome.status,
            manual_review = outcome.requires_manual_review,
            "Task status recorded"
        );

        if outcome.status.is_terminal() {
            let event = TaskEvent {
                task_id: task.task_id,
                user_id: task.payload.user_id().to_string(),
                status: outcome.status,
                target_url: task.payload.target().to_string(),
                kind: task.kind(),
            };
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&event).await {
                    tracing::warn!(task_id = %event.task_id, error = %e, "Notification failed");
                }
            });
        }

        Ok(true)
    }
}
