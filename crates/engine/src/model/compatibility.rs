use super::part::MaintenancePart;
use serde::{Deserialize, Serialize};

/// Links a machine series/year/model to a compatible part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compatibility {
    pub id: i64,
    pub part_id: i64,
    #[serde(default)]
    pub machine_series: Option<String>,
    #[serde(default)]
    pub machine_year: Option<i32>,
    #[serde(default)]
    pub machine_model: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<MaintenancePart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityRequest {
    pub part_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Query for parts compatible with a machine; unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSearch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl MachineSearch {
    pub fn is_empty(&self) -> bool {
        self.series.is_none() && self.year.is_none() && self.model.is_none()
    }
}
