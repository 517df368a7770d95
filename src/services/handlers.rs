use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::automation::{
    ApplyRequest, Dispatcher, InteractionEngine, SessionError, SessionFactory, SessionGuard,
};
use crate::db::{StoreError, TaskStore};
use crate::models::task::{LogEntry, TaskKind, TaskOutcome, TaskPayload};
use crate::services::content::{ContentError, ContentGenerator};
use crate::services::extraction::{extract_posting, ExtractionError};
use crate::services::queue::QueuedTask;

/// Executes one task of a single kind. Every failure is folded into a
/// failed [`TaskOutcome`]; handlers never return errors.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn handle(&self, task: &QueuedTask) -> TaskOutcome;
}

#[derive(Debug, thiserror::Error)]
enum HandlerError {
    #[error("payload kind mismatch, expected {0}")]
    PayloadMismatch(TaskKind),

    #[error("browser session unavailable after close")]
    SessionClosed,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("failed to save posting: {0}")]
    Store(#[from] StoreError),

    #[error("question generation failed: {0}")]
    Content(#[from] ContentError),
}

/// Runs the interaction engine against the adapter the URL dispatches to.
pub struct ApplyHandler {
    dispatcher: Dispatcher,
    engine: InteractionEngine,
    sessions: Arc<dyn SessionFactory>,
    resume_root: PathBuf,
}

impl ApplyHandler {
    pub fn new(
        dispatcher: Dispatcher,
        engine: InteractionEngine,
        sessions: Arc<dyn SessionFactory>,
        resume_root: PathBuf,
    ) -> Self {
        Self {
            dispatcher,
            engine,
            sessions,
            resume_root,
        }
    }

    fn resolve_resume(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference.trim_start_matches("file://"));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.resume_root.join(path)
        }
    }
}

#[async_trait]
impl TaskHandler for ApplyHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Apply
    }

    async fn handle(&self, task: &QueuedTask) -> TaskOutcome {
        let TaskPayload::Apply(payload) = &task.payload else {
            return TaskOutcome::failed(Vec::new(), HandlerError::PayloadMismatch(TaskKind::Apply).to_string());
        };

        let adapter = self.dispatcher.dispatch(&payload.target_url);
        tracing::info!(task_id = %task.task_id, adapter = adapter.name, "Dispatched apply task");

        let request = ApplyRequest {
            target_url: payload.target_url.clone(),
            profile: payload.profile.clone(),
            resume_path: payload.resume_ref.as_deref().map(|r| self.resolve_resume(r)),
            cover_letter: payload.cover_letter.clone(),
        };

        let session = match self.sessions.open().await {
            Ok(session) => session,
            Err(e) => return TaskOutcome::failed(Vec::new(), e.to_string()),
        };
        let mut guard = SessionGuard::new(session);

        let result = match guard.session() {
            Some(session) => self.engine.run(adapter, session, &request).await,
            None => return TaskOutcome::failed(Vec::new(), HandlerError::SessionClosed.to_string()),
        };

        if let Err(e) = guard.close().await {
            tracing::warn!(task_id = %task.task_id, error = %e, "Failed to close browser session");
        }

        TaskOutcome::from(result).with_result(serde_json::json!({ "platform": adapter.platform }))
    }
}

/// Loads a posting page, extracts its fields and upserts it by URL.
pub struct ScrapeHandler {
    dispatcher: Dispatcher,
    sessions: Arc<dyn SessionFactory>,
    store: Arc<dyn TaskStore>,
    navigation: Duration,
    settle: Duration,
}

impl ScrapeHandler {
    pub fn new(sessions: Arc<dyn SessionFactory>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            dispatcher: Dispatcher::default(),
            sessions,
            store,
            navigation: Duration::from_secs(30),
            settle: Duration::from_secs(2),
        }
    }

    pub fn with_waits(mut self, navigation: Duration, settle: Duration) -> Self {
        self.navigation = navigation;
        self.settle = settle;
        self
    }

    async fn fetch_html(&self, url: &str, logs: &mut Vec<LogEntry>) -> Result<String, HandlerError> {
        let mut guard = SessionGuard::new(self.sessions.open().await?);
        let fetched = match guard.session() {
            Some(session) => {
                logs.push(LogEntry::info(format!("Navigating to {url}")));
                match timeout(self.navigation, session.goto(url, self.navigation)).await {
                    Ok(Ok(())) => {
                        sleep(self.settle).await;
                        session.content().await.map_err(HandlerError::from)
                    }
                    Ok(Err(e)) => Err(e.into()),
                    Err(_) => Err(SessionError::NavigationTimeout {
                        url: url.to_string(),
                        timeout: self.navigation,
                    }
                    .into()),
                }
            }
            None => Err(HandlerError::SessionClosed),
        };

        if let Err(e) = guard.close().await {
            tracing::warn!(url = %url, error = %e, "Failed to close browser session");
        }
        fetched
    }

    async fn scrape(
        &self,
        user_id: &str,
        url: &str,
        logs: &mut Vec<LogEntry>,
    ) -> Result<serde_json::Value, HandlerError> {
        let html = self.fetch_html(url, logs).await?;

        let platform = self.dispatcher.dispatch(url).platform;
        let posting = extract_posting(&html, url, platform)?;
        logs.push(LogEntry::info(format!(
            "Extracted {} at {} ({} skills)",
            posting.title,
            posting.company,
            posting.skills.len()
        )));

        let posting_id = self.store.save_posting(user_id, &posting, Some(&html)).await?;
        logs.push(LogEntry::info(format!("Saved posting {posting_id}")));

        Ok(serde_json::json!({
            "postingId": posting_id,
            "platform": platform,
            "posting": posting,
        }))
    }
}

#[async_trait]
impl TaskHandler for ScrapeHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Scrape
    }

    async fn handle(&self, task: &QueuedTask) -> TaskOutcome {
        let TaskPayload::Scrape(payload) = &task.payload else {
            return TaskOutcome::failed(Vec::new(), HandlerError::PayloadMismatch(TaskKind::Scrape).to_string());
        };

        let mut logs = Vec::new();
        match self.scrape(&payload.user_id, &payload.url, &mut logs).await {
            Ok(result) => TaskOutcome::success(logs).with_result(result),
            Err(e) => {
                tracing::warn!(task_id = %task.task_id, url = %payload.url, error = %e, "Scrape failed");
                TaskOutcome::failed(logs, format!("Scraping failed: {e}"))
            }
        }
    }
}

/// Generates interview preparation questions for a role.
pub struct InterviewHandler {
    generator: Arc<dyn ContentGenerator>,
}

impl InterviewHandler {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl TaskHandler for InterviewHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Interview
    }

    async fn handle(&self, task: &QueuedTask) -> TaskOutcome {
        let TaskPayload::Interview(payload) = &task.payload else {
            return TaskOutcome::failed(
                Vec::new(),
                HandlerError::PayloadMismatch(TaskKind::Interview).to_string(),
            );
        };

        match self
            .generator
            .interview_questions(&payload.job_title, &payload.skills)
            .await
        {
            Ok(questions) => {
                let logs = vec![LogEntry::info(format!(
                    "Generated {} questions for {}",
                    questions.len(),
                    payload.job_title
                ))];
                TaskOutcome::success(logs).with_result(serde_json::json!({
                    "jobTitle": payload.job_title,
                    "company": payload.company,
                    "questions": questions,
                }))
            }
            Err(e) => TaskOutcome::failed(Vec::new(), HandlerError::from(e).to_string()),
        }
    }
}
