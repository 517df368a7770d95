use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::task::TaskKind;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bind address for the worker's /health and /metrics endpoints.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the task queues
    pub redis_url: String,

    /// Base URL for completion notifications (e.g. an n8n webhook).
    /// Notifications are disabled when unset.
    #[serde(default)]
    pub notification_webhook_url: Option<String>,

    /// Directory screenshots are written to.
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,

    /// Public prefix used when referencing stored screenshots.
    #[serde(default = "default_screenshot_url_prefix")]
    pub screenshot_url_prefix: String,

    /// Directory relative resume references are resolved against.
    #[serde(default = "default_resume_root")]
    pub resume_root: PathBuf,

    /// DevTools websocket URL of an already running Chromium. A local
    /// browser is launched when unset.
    #[serde(default)]
    pub chromium_remote_url: Option<String>,

    /// Chromium binary to launch instead of the auto-detected one.
    #[serde(default)]
    pub chromium_executable: Option<PathBuf>,

    #[serde(default = "default_apply_concurrency")]
    pub apply_concurrency: usize,

    #[serde(default = "default_scrape_concurrency")]
    pub scrape_concurrency: usize,

    #[serde(default = "default_interview_concurrency")]
    pub interview_concurrency: usize,

    /// Deliveries allowed per task before it is failed as exhausted.
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: i32,

    /// Idle sleep between empty queue polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on one apply run, navigation included.
    #[serde(default = "default_task_budget_secs")]
    pub task_budget_secs: u64,

    /// Lifetime of this worker's queue lease. In-flight deliveries of a
    /// worker that misses its heartbeats this long are handed out again.
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,

    /// OpenAI-compatible chat completions base URL for interview questions.
    /// Template questions are used when unset.
    #[serde(default)]
    pub content_api_url: Option<String>,

    #[serde(default)]
    pub content_api_key: Option<String>,

    #[serde(default = "default_content_model")]
    pub content_model: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("uploads/screenshots")
}

fn default_screenshot_url_prefix() -> String {
    "/uploads/screenshots".to_string()
}

fn default_resume_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_apply_concurrency() -> usize {
    2
}

fn default_scrape_concurrency() -> usize {
    3
}

fn default_interview_concurrency() -> usize {
    5
}

fn default_max_delivery_attempts() -> i32 {
    3
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_task_budget_secs() -> u64 {
    90
}

fn default_lease_ttl_secs() -> u64 {
    30
}

fn default_content_model() -> String {
    "gpt-3.5-turbo".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Concurrent executions allowed in the pool for `kind`.
    pub fn concurrency(&self, kind: TaskKind) -> usize {
        match kind {
            TaskKind::Apply => self.apply_concurrency,
            TaskKind::Scrape => self.scrape_concurrency,
            TaskKind::Interview => self.interview_concurrency,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn task_budget(&self) -> Duration {
        Duration::from_secs(self.task_budget_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}
