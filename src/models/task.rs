use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Kind of automation work. Each kind has its own queue and worker pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskKind {
    Apply,
    Scrape,
    Interview,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::Apply, TaskKind::Scrape, TaskKind::Interview];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Apply => "apply",
            TaskKind::Scrape => "scrape",
            TaskKind::Interview => "interview",
        }
    }
}

/// Lifecycle status of an automation task.
///
/// `queued -> processing -> {success, failed}`. Terminal rows only accept
/// log and screenshot attachment afterwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Applicant details copied into the task at submission time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

/// One timestamped observation inside a single attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            error: true,
        }
    }
}

/// Request to apply to one job posting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPayload {
    pub user_id: String,
    pub target_url: String,
    pub profile: ApplicantProfile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_letter: Option<String>,
}

/// Request to retrieve and extract one job posting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScrapePayload {
    pub user_id: String,
    pub url: String,
}

/// Request to generate interview questions for a role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterviewPayload {
    pub user_id: String,
    pub job_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

/// Kind-specific task input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    Apply(ApplyPayload),
    Scrape(ScrapePayload),
    Interview(InterviewPayload),
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Apply(_) => TaskKind::Apply,
            TaskPayload::Scrape(_) => TaskKind::Scrape,
            TaskPayload::Interview(_) => TaskKind::Interview,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            TaskPayload::Apply(p) => &p.user_id,
            TaskPayload::Scrape(p) => &p.user_id,
            TaskPayload::Interview(p) => &p.user_id,
        }
    }

    /// URL (or, for interview tasks, job title) the task works against.
    pub fn target(&self) -> &str {
        match self {
            TaskPayload::Apply(p) => &p.target_url,
            TaskPayload::Scrape(p) => &p.url,
            TaskPayload::Interview(p) => &p.job_title,
        }
    }
}

/// Terminal (or intermediate) outcome handed to the status reporter.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub logs: Vec<LogEntry>,
    pub screenshot_ref: Option<String>,
    pub error: Option<String>,
    pub requires_manual_review: bool,
    pub result: Option<serde_json::Value>,
}

impl TaskOutcome {
    pub fn success(logs: Vec<LogEntry>) -> Self {
        Self {
            status: TaskStatus::Success,
            logs,
            screenshot_ref: None,
            error: None,
            requires_manual_review: false,
            result: None,
        }
    }

    /// Failed outcome. The message is also appended to the log so a failed
    /// task never ends with an empty log.
    pub fn failed(mut logs: Vec<LogEntry>, error: impl Into<String>) -> Self {
        let error = error.into();
        logs.push(LogEntry::error(error.clone()));
        Self {
            status: TaskStatus::Failed,
            logs,
            screenshot_ref: None,
            error: Some(error),
            requires_manual_review: false,
            result: None,
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }
}

/// A persisted automation task row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationTask {
    pub id: Uuid,
    pub kind: TaskKind,
    pub user_id: String,
    pub target: String,
    pub status: TaskStatus,
    pub attempts: i32,
    pub logs: Vec<LogEntry>,
    pub screenshot_ref: Option<String>,
    pub error: Option<String>,
    pub requires_manual_review: bool,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response for querying task status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusView {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub logs: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub requires_manual_review: bool,
}

impl From<AutomationTask> for TaskStatusView {
    fn from(task: AutomationTask) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            logs: task.logs,
            screenshot_ref: task.screenshot_ref,
            error_message: task.error,
            requires_manual_review: task.requires_manual_review,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trips_through_strum() {
        for status in [
            TaskStatus::Queued,
            TaskStatus::Processing,
            TaskStatus::Success,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()).unwrap(), status);
            assert_eq!(status.to_string(), status.as_str());
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_failed_outcome_always_has_log() {
        let outcome = TaskOutcome::failed(Vec::new(), "submit control not found");
        assert_eq!(outcome.status, TaskStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("submit control not found"));
        assert_eq!(outcome.logs.len(), 1);
        assert!(outcome.logs[0].error);
    }

    #[test]
    fn test_log_entry_omits_error_flag_when_false() {
        let json = serde_json::to_value(LogEntry::info("Navigating")).unwrap();
        assert!(json.get("error").is_none());
        let json = serde_json::to_value(LogEntry::error("boom")).unwrap();
        assert_eq!(json["error"], serde_json::json!(true));
    }

    #[test]
    fn test_payload_is_tagged_by_kind() {
        let payload = TaskPayload::Scrape(ScrapePayload {
            user_id: "u1".to_string(),
            url: "https://www.indeed.com/viewjob?jk=1".to_string(),
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "scrape");
        assert_eq!(json["userId"], "u1");
        assert_eq!(payload.kind(), TaskKind::Scrape);
    }
}
