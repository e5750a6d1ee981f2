use super::machine::MagazineProperties;
use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One machine record recognised in an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMachine {
    pub machine_number: String,
    #[serde(default)]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub operating_hours: Option<i32>,
    #[serde(default, with = "timestamp::option")]
    pub installation_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub magazine: MagazineProperties,
    #[serde(default)]
    pub is_valid: bool,
    #[serde(default)]
    pub already_exists: bool,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub existing_machine_id: Option<i64>,
}

impl ExtractedMachine {
    /// Valid and not yet known to the backend.
    pub fn is_selectable(&self) -> bool {
        self.is_valid && !self.already_exists
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfExtractionResponse {
    pub success: bool,
    #[serde(default)]
    pub extracted_machines: Vec<ExtractedMachine>,
    #[serde(default)]
    pub total_machines_found: usize,
    #[serde(default)]
    pub valid_machines: usize,
    #[serde(default)]
    pub duplicate_machines: usize,
    #[serde(default)]
    pub ocr_engine: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub message: Option<String>,
}
