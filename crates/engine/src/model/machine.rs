use super::timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum MachineStatus {
    #[default]
    Active,
    InMaintenance,
    OutOfService,
}

impl MachineStatus {
    pub const ALL: [MachineStatus; 3] = [
        MachineStatus::Active,
        MachineStatus::InMaintenance,
        MachineStatus::OutOfService,
    ];

    pub fn label_de(&self) -> &'static str {
        match self {
            MachineStatus::Active => "Aktiv",
            MachineStatus::InMaintenance => "In Wartung",
            MachineStatus::OutOfService => "Außer Betrieb",
        }
    }
}

impl std::str::FromStr for MachineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(MachineStatus::Active),
            "inmaintenance" | "in_maintenance" | "maintenance" => Ok(MachineStatus::InMaintenance),
            "outofservice" | "out_of_service" => Ok(MachineStatus::OutOfService),
            other => Err(format!("unknown machine status: {}", other)),
        }
    }
}

/// Bar-feed magazine attached to a machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MagazineProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magazine_type: Option<String>,
    /// Millimetres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_bar_length: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_synchronization_device: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_rod: Option<String>,
}

impl MagazineProperties {
    /// True when at least one property carries a value; blank strings do not count.
    pub fn is_present(&self) -> bool {
        fn filled(s: &Option<String>) -> bool {
            s.as_deref().is_some_and(|v| !v.trim().is_empty())
        }
        filled(&self.magazine_type)
            || self.material_bar_length.is_some()
            || self.has_synchronization_device.is_some()
            || filled(&self.feed_channel)
            || filled(&self.feed_rod)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    pub id: i64,
    pub number: String,
    #[serde(rename = "type")]
    pub machine_type: String,
    #[serde(default)]
    pub operating_hours: i32,
    #[serde(with = "timestamp")]
    pub installation_date: DateTime<Utc>,
    #[serde(default)]
    pub status: MachineStatus,
    #[serde(flatten)]
    pub magazine: MagazineProperties,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMachineRequest {
    pub number: String,
    #[serde(rename = "type")]
    pub machine_type: String,
    pub operating_hours: i32,
    #[serde(with = "timestamp")]
    pub installation_date: DateTime<Utc>,
    pub status: MachineStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMachineRequest {
    pub number: String,
    #[serde(rename = "type")]
    pub machine_type: String,
    pub operating_hours: i32,
    #[serde(with = "timestamp")]
    pub installation_date: DateTime<Utc>,
    pub status: MachineStatus,
}

impl From<&Machine> for UpdateMachineRequest {
    fn from(m: &Machine) -> Self {
        Self {
            number: m.number.clone(),
            machine_type: m.machine_type.clone(),
            operating_hours: m.operating_hours,
            installation_date: m.installation_date,
            status: m.status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: MachineStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_from_backend_json() {
        let json = serde_json::json!({
            "id": 7,
            "number": "M-100",
            "type": "Drehmaschine",
            "operatingHours": 12500,
            "installationDate": "2019-05-02T00:00:00",
            "status": "InMaintenance",
            "magazineType": "LM 1200",
            "materialBarLength": 3200,
            "feedChannel": null
        });
        let m: Machine = serde_json::from_value(json).unwrap();
        assert_eq!(m.machine_type, "Drehmaschine");
        assert_eq!(m.status, MachineStatus::InMaintenance);
        assert_eq!(m.magazine.material_bar_length, Some(3200));
        assert!(m.magazine.is_present());
        assert!(m.created_at.is_none());
    }

    #[test]
    fn test_magazine_blank_strings_are_absent() {
        let props = MagazineProperties {
            magazine_type: Some("  ".into()),
            feed_rod: Some(String::new()),
            ..Default::default()
        };
        assert!(!props.is_present());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("outofservice".parse::<MachineStatus>(), Ok(MachineStatus::OutOfService));
        assert!("broken".parse::<MachineStatus>().is_err());
    }
}
