use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackupKind {
    /// Database dump only.
    #[default]
    Database,
    /// Database plus uploaded files and trained models.
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub file_name: String,
    #[serde(default, rename = "type")]
    pub kind: BackupKind,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Scheduler overview from `/api/backup/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStatus {
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default, with = "timestamp::option")]
    pub last_backup_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub next_scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub backup_count: u32,
    #[serde(default)]
    pub total_size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackupRunStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl BackupRunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BackupRunStatus::Completed | BackupRunStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStep {
    pub name: String,
    #[serde(default)]
    pub status: BackupRunStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProgress {
    pub backup_id: String,
    #[serde(default, rename = "type")]
    pub kind: BackupKind,
    #[serde(default)]
    pub percentage: u8,
    #[serde(default)]
    pub status: BackupRunStatus,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub steps: Vec<BackupStep>,
    #[serde(default, with = "timestamp::option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Answer of the two create endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStarted {
    pub backup_id: String,
    #[serde(default)]
    pub message: Option<String>,
}
