use serde::{Deserialize, Serialize};

use crate::models::task::{LogEntry, TaskOutcome, TaskStatus};

/// Output of one interaction engine run against a job page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteAdapterResult {
    pub success: bool,
    pub logs: Vec<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the adapter cannot vouch for the page having been submitted.
    #[serde(default)]
    pub requires_manual_review: bool,
}

impl From<SiteAdapterResult> for TaskOutcome {
    fn from(result: SiteAdapterResult) -> Self {
        TaskOutcome {
            status: if result.success {
                TaskStatus::Success
            } else {
                TaskStatus::Failed
            },
            logs: result.logs,
            screenshot_ref: result.screenshot_ref,
            error: result.error,
            requires_manual_review: result.requires_manual_review,
            result: None,
        }
    }
}
