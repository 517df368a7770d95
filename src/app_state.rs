use sqlx::PgPool;
use std::sync::Arc;

use crate::services::queue::JobQueue;

/// Shared state of the worker's operational HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
}

impl AppState {
    pub fn new(db: PgPool, queue: Arc<JobQueue>) -> Self {
        Self { db, queue }
    }
}
