// Guarded execution and scheduler job domain models
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome handed back to callers of a triggered execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub message: String,
    pub execution_id: Option<String>,
}

impl ExecutionReport {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            execution_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionStatus {
    pub is_running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub next_scheduled_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl TriggerKind {
    pub fn job_prefix(self) -> &'static str {
        match self {
            TriggerKind::Scheduled => "daily_run",
            TriggerKind::Manual => "manual_run",
        }
    }
}

/// One scheduler firing. Immutable once appended to the history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub execution_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    pub message: String,
    pub trigger: TriggerKind,
    pub user_id: Option<String>,
}

impl JobRecord {
    pub fn job_id_for(trigger: TriggerKind, start: DateTime<Utc>) -> String {
        format!("{}_{}", trigger.job_prefix(), start.format("%Y%m%d_%H%M%S"))
    }
}
