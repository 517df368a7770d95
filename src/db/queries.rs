use sqlx::types::Json;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::posting::JobPosting;
use crate::models::task::{AutomationTask, LogEntry, TaskKind, TaskOutcome, TaskPayload, TaskStatus};

const TASK_COLUMNS: &str = "id, kind, user_id, target, status, attempts, logs, screenshot_ref, \
                            error, manual_review, result, created_at, updated_at";

/// Outcome counts for one user and task kind.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskStats {
    pub total: i64,
    pub success: i64,
    pub pending: i64,
    pub failed: i64,
}

impl TaskStats {
    /// Percentage of tasks that succeeded, 0 when there are none.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 * 100.0 / self.total as f64
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn task_from_row(row: &PgRow) -> Result<AutomationTask, sqlx::Error> {
    let logs: Json<Vec<LogEntry>> = row.try_get("logs")?;

    Ok(AutomationTask {
        id: row.try_get("id")?,
        kind: parse_column::<TaskKind>(row, "kind")?,
        user_id: row.try_get("user_id")?,
        target: row.try_get("target")?,
        status: parse_column::<TaskStatus>(row, "status")?,
        attempts: row.try_get("attempts")?,
        logs: logs.0,
        screenshot_ref: row.try_get("screenshot_ref")?,
        error: row.try_get("error")?,
        requires_manual_review: row.try_get("manual_review")?,
        result: row.try_get("result")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new task in the `queued` state.
pub async fn create_task(
    pool: &PgPool,
    task_id: Uuid,
    payload: &TaskPayload,
) -> Result<AutomationTask, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO automation_tasks (id, kind, user_id, target, status, payload)
        VALUES ($1, $2, $3, $4, 'queued', $5)
        RETURNING {TASK_COLUMNS}
        "#
    ))
    .bind(task_id)
    .bind(payload.kind().as_str())
    .bind(payload.user_id())
    .bind(payload.target())
    .bind(Json(payload))
    .fetch_one(pool)
    .await?;

    task_from_row(&row)
}

/// Get a task by ID
pub async fn get_task(pool: &PgPool, task_id: Uuid) -> Result<Option<AutomationTask>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {TASK_COLUMNS} FROM automation_tasks WHERE id = $1"
    ))
    .bind(task_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(task_from_row).transpose()
}

/// Move a non-terminal task to `processing` and count the delivery.
///
/// Returns the new attempt count, or `None` when the task is unknown or
/// already terminal.
pub async fn claim_task(pool: &PgPool, task_id: Uuid) -> Result<Option<i32>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE automation_tasks
        SET status = 'processing',
            attempts = attempts + 1,
            processing_started_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('queued', 'processing')
        RETURNING attempts
        "#,
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| r.try_get("attempts")).transpose()
}

/// Write an outcome onto a task that has not reached a terminal state yet.
///
/// Returns false when the row is missing or already terminal.
pub async fn record_outcome(
    pool: &PgPool,
    task_id: Uuid,
    outcome: &TaskOutcome,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE automation_tasks
        SET status = $2,
            logs = $3,
            screenshot_ref = COALESCE($4, screenshot_ref),
            error = $5,
            manual_review = $6,
            result = COALESCE($7, result),
            updated_at = NOW(),
            completed_at = CASE WHEN $2 IN ('success', 'failed') THEN NOW() ELSE completed_at END
        WHERE id = $1 AND status NOT IN ('success', 'failed')
        "#,
    )
    .bind(task_id)
    .bind(outcome.status.as_str())
    .bind(Json(&outcome.logs))
    .bind(outcome.screenshot_ref.as_deref())
    .bind(outcome.error.as_deref())
    .bind(outcome.requires_manual_review)
    .bind(outcome.result.as_ref())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Most recent tasks for a user, newest first.
pub async fn list_user_tasks(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<AutomationTask>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {TASK_COLUMNS}
        FROM automation_tasks
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(task_from_row).collect()
}

/// Outcome counts for one user and task kind.
pub async fn task_stats(
    pool: &PgPool,
    user_id: &str,
    kind: TaskKind,
) -> Result<TaskStats, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE status = 'success') AS success,
               COUNT(*) FILTER (WHERE status IN ('queued', 'processing')) AS pending,
               COUNT(*) FILTER (WHERE status = 'failed') AS failed
        FROM automation_tasks
        WHERE user_id = $1 AND kind = $2
        "#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .fetch_one(pool)
    .await?;

    Ok(TaskStats {
        total: row.try_get("total")?,
        success: row.try_get("success")?,
        pending: row.try_get("pending")?,
        failed: row.try_get("failed")?,
    })
}

/// Insert or refresh a scraped posting, keyed by URL.
pub async fn upsert_job_posting(
    pool: &PgPool,
    user_id: &str,
    posting: &JobPosting,
    raw_html: Option<&str>,
) -> Result<Uuid, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO job_postings
            (id, url, user_id, title, company, location, description,
             requirements, skills, salary, job_type, raw_html, scraped_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
        ON CONFLICT (url) DO UPDATE
        SET user_id = EXCLUDED.user_id,
            title = EXCLUDED.title,
            company = EXCLUDED.company,
            location = EXCLUDED.location,
            description = EXCLUDED.description,
            requirements = EXCLUDED.requirements,
            skills = EXCLUDED.skills,
            salary = EXCLUDED.salary,
            job_type = EXCLUDED.job_type,
            raw_html = EXCLUDED.raw_html,
            scraped_at = NOW()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&posting.url)
    .bind(user_id)
    .bind(&posting.title)
    .bind(&posting.company)
    .bind(&posting.location)
    .bind(&posting.description)
    .bind(Json(&posting.requirements))
    .bind(Json(&posting.skills))
    .bind(&posting.salary)
    .bind(&posting.job_type)
    .bind(raw_html)
    .fetch_one(pool)
    .await?;

    row.try_get("id")
}
