use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::models::task::{TaskKind, TaskStatus};

/// Terminal-state event forwarded to the notification webhook.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    pub task_id: Uuid,
    pub user_id: String,
    pub status: TaskStatus,
    pub target_url: String,
    #[serde(skip)]
    pub kind: TaskKind,
}

impl TaskEvent {
    /// Webhook path for this event's kind.
    pub fn path(&self) -> &'static str {
        match self.kind {
            TaskKind::Apply => "application-completed",
            TaskKind::Scrape => "job-scraped",
            TaskKind::Interview => "interview-ready",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &TaskEvent) -> Result<(), NotifyError>;
}

/// Posts task events as JSON to `{base_url}/{event path}`.
pub struct WebhookNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl WebhookNotifier {
    pub fn new(base_url: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(NotifyError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, event: &TaskEvent) -> String {
        format!("{}/{}", self.base_url, event.path())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &TaskEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url_for(event))
            .json(event)
            .send()
            .await
            .map_err(NotifyError::Http)?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Rejected { status, body })
        }
    }
}

/// Used when no webhook is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: &TaskEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
