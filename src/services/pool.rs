use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};

use crate::db::{StoreError, TaskStore};
use crate::models::task::{TaskKind, TaskOutcome, TaskStatus};
use crate::services::handlers::TaskHandler;
use crate::services::queue::{Delivery, QueueError, TaskQueue};
use crate::services::reporter::StatusReporter;

pub const EXHAUSTED_MESSAGE: &str = "delivery attempts exhausted";

const REPORT_ATTEMPTS: u32 = 3;
const REPORT_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub concurrency: usize,
    pub max_delivery_attempts: i32,
    pub poll_interval: Duration,
}

/// Fixed-size pool of consumers for one task kind.
///
/// A permit is taken before dequeueing and held until the delivery is
/// acknowledged, so at most `concurrency` executions of this kind are live at
/// any moment.
pub struct WorkerPool {
    kind: TaskKind,
    settings: PoolSettings,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn TaskStore>,
    reporter: StatusReporter,
    handler: Arc<dyn TaskHandler>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        settings: PoolSettings,
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn TaskStore>,
        reporter: StatusReporter,
        handler: Arc<dyn TaskHandler>,
    ) -> Self {
        let settings = PoolSettings {
            concurrency: settings.concurrency.max(1),
            ..settings
        };
        Self {
            kind: handler.kind(),
            permits: Arc::new(Semaphore::new(settings.concurrency)),
            settings,
            queue,
            store,
            reporter,
            handler,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Consume the queue until `shutdown` flips to true, then wait for
    /// in-flight executions to finish.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            kind = %self.kind,
            concurrency = self.settings.concurrency,
            "Worker pool started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.queue.dequeue(self.kind).await {
                Ok(Some(delivery)) => {
                    let pool = Arc::clone(&self);
                    tokio::spawn(async move {
                        let task_id = delivery.task.task_id;
                        if let Err(e) = pool.process(delivery).await {
                            tracing::error!(
                                task_id = %task_id,
                                kind = %pool.kind,
                                error = %e,
                                "Delivery not settled"
                            );
                            // Back off before this slot dequeues again.
                            tokio::time::sleep(pool.settings.poll_interval).await;
                        }
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    self.record_depth().await;
                    tracing::trace!(kind = %self.kind, "No tasks available, sleeping");
                    self.idle(&mut shutdown).await;
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(kind = %self.kind, error = %e, "Dequeue failed, will retry");
                    self.idle(&mut shutdown).await;
                }
            }
        }

        // Wait for in-flight executions by taking every permit back.
        let _ = self
            .permits
            .acquire_many(self.settings.concurrency as u32)
            .await;
        tracing::info!(kind = %self.kind, "Worker pool stopped");
    }

    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }

    async fn record_depth(&self) {
        if let Ok(depth) = self.queue.queue_depth(self.kind).await {
            metrics::gauge!("automation_queue_depth", "kind" => self.kind.as_str()).set(depth as f64);
        }
    }

    /// Run one delivery to a recorded outcome, then acknowledge it.
    ///
    /// The delivery is only acknowledged once its outcome is stored. If the
    /// store stays unavailable the delivery is put back on the pending lane
    /// and the error is returned.
    pub async fn process(&self, delivery: Delivery) -> Result<(), PoolError> {
        match self.settle(&delivery).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.queue.requeue(&delivery).await?;
                tracing::warn!(
                    task_id = %delivery.task.task_id,
                    kind = %self.kind,
                    error = %e,
                    "Delivery returned to pending"
                );
                Err(e)
            }
        }
    }

    async fn settle(&self, delivery: &Delivery) -> Result<(), PoolError> {
        let task_id = delivery.task.task_id;

        let Some(attempts) = self.store.claim(task_id).await? else {
            tracing::info!(task_id = %task_id, kind = %self.kind, "Task terminal or unknown, skipping delivery");
            self.queue.ack(delivery).await?;
            return Ok(());
        };

        tracing::info!(
            task_id = %task_id,
            kind = %self.kind,
            attempt = attempts,
            target = %delivery.task.payload.target(),
            "Processing task"
        );

        let outcome = if attempts > self.settings.max_delivery_attempts {
            tracing::warn!(
                task_id = %task_id,
                attempts,
                max = self.settings.max_delivery_attempts,
                "Delivery attempts exhausted"
            );
            TaskOutcome::failed(Vec::new(), EXHAUSTED_MESSAGE)
        } else {
            metrics::counter!("automation_tasks_started", "kind" => self.kind.as_str()).increment(1);
            self.execute(delivery).await
        };

        self.report(delivery, &outcome).await?;

        match outcome.status {
            TaskStatus::Failed => {
                metrics::counter!("automation_tasks_failed", "kind" => self.kind.as_str()).increment(1);
                tracing::warn!(
                    task_id = %task_id,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "Task failed"
                );
            }
            _ => {
                metrics::counter!("automation_tasks_completed", "kind" => self.kind.as_str()).increment(1);
                tracing::info!(task_id = %task_id, manual_review = outcome.requires_manual_review, "Task completed");
            }
        }

        self.queue.ack(delivery).await?;
        Ok(())
    }

    /// Record the outcome, retrying with doubling backoff while the store is
    /// unavailable.
    async fn report(&self, delivery: &Delivery, outcome: &TaskOutcome) -> Result<(), StoreError> {
        let mut backoff = REPORT_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.reporter.report(&delivery.task, outcome).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < REPORT_ATTEMPTS => {
                    tracing::warn!(
                        task_id = %delivery.task.task_id,
                        attempt,
                        error = %e,
                        "Recording outcome failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute(&self, delivery: &Delivery) -> TaskOutcome {
        let start = Instant::now();
        let outcome = match AssertUnwindSafe(self.handler.handle(&delivery.task))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(task_id = %delivery.task.task_id, panic = %message, "Task handler panicked");
                TaskOutcome::failed(Vec::new(), format!("unexpected fault: {message}"))
            }
        };
        metrics::histogram!("automation_task_seconds", "kind" => self.kind.as_str())
            .record(start.elapsed().as_secs_f64());
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
