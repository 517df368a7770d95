use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::models::posting::JobPosting;
use crate::models::task::{AutomationTask, TaskOutcome, TaskPayload};

/// Durable task state shared by the submitter, the worker pools and the
/// status reporter. Every mutation is a single-row update keyed by task id.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new `queued` task.
    async fn create(&self, task_id: Uuid, payload: &TaskPayload) -> Result<AutomationTask, StoreError>;

    /// Mark a delivery as started. `None` means the task must not run
    /// (unknown or already terminal).
    async fn claim(&self, task_id: Uuid) -> Result<Option<i32>, StoreError>;

    /// Record an outcome. Returns false if the task was already terminal.
    async fn record(&self, task_id: Uuid, outcome: &TaskOutcome) -> Result<bool, StoreError>;

    async fn get(&self, task_id: Uuid) -> Result<Option<AutomationTask>, StoreError>;

    async fn save_posting(
        &self,
        user_id: &str,
        posting: &JobPosting,
        raw_html: Option<&str>,
    ) -> Result<Uuid, StoreError>;
}

/// PostgreSQL-backed task store.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, task_id: Uuid, payload: &TaskPayload) -> Result<AutomationTask, StoreError> {
        Ok(queries::create_task(&self.pool, task_id, payload).await?)
    }

    async fn claim(&self, task_id: Uuid) -> Result<Option<i32>, StoreError> {
        Ok(queries::claim_task(&self.pool, task_id).await?)
    }

    async fn record(&self, task_id: Uuid, outcome: &TaskOutcome) -> Result<bool, StoreError> {
        Ok(queries::record_outcome(&self.pool, task_id, outcome).await?)
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<AutomationTask>, StoreError> {
        Ok(queries::get_task(&self.pool, task_id).await?)
    }

    async fn save_posting(
        &self,
        user_id: &str,
        posting: &JobPosting,
        raw_html: Option<&str>,
    ) -> Result<Uuid, StoreError> {
        Ok(queries::upsert_job_posting(&self.pool, user_id, posting, raw_html).await?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task store unavailable: {0}")]
    Unavailable(String),
}
