use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TrainingStatus {
    #[default]
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl TrainingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingStatus::Succeeded | TrainingStatus::Failed)
    }
}

/// OCR model trained on the operator's own documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomModel {
    pub model_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TrainingStatus,
}

/// Vendor-provided model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltModel {
    pub model_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingOperation {
    pub operation_id: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub status: TrainingStatus,
    #[serde(default)]
    pub percent_completed: u8,
    #[serde(default)]
    pub error_message: Option<String>,
}
