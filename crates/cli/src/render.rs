//! Human-readable views for the list and summary commands.
//!
//! Anything without a view here is printed as pretty JSON.

use engine::format;
use engine::model::{BackupInfo, Machine};
use serde_json::Value;

/// Lines for `target`'s result data, or `None` when there is no view.
pub fn render(target: &str, data: &Value) -> Option<Vec<String>> {
    match target {
        "dashboard.summary" => Some(dashboard(data)),
        "machines.list" => {
            let machines: Vec<Machine> = serde_json::from_value(data.clone()).ok()?;
            Some(machines.iter().map(machine_line).collect())
        }
        "backups.list" => {
            let backups: Vec<BackupInfo> = serde_json::from_value(data.clone()).ok()?;
            Some(backups.iter().map(backup_line).collect())
        }
        _ => None,
    }
}

fn machine_line(m: &Machine) -> String {
    format!(
        "{:<12} {:<20} {:>10}  seit {}  {:?}",
        m.number,
        m.machine_type,
        format::hours(m.operating_hours.into()),
        format::local_date(&m.installation_date),
        m.status
    )
}

fn backup_line(b: &BackupInfo) -> String {
    format!(
        "{:<32} {:<9} {:>9}  {}",
        b.file_name,
        format!("{:?}", b.kind),
        format::bytes(b.size_bytes),
        format::local_datetime(&b.created_at)
    )
}

fn dashboard(data: &Value) -> Vec<String> {
    let int = |key: &str| data[key].as_i64().unwrap_or_default();
    let mut lines = vec![
        format!("Maschinen:        {}", format::integer(int("totalMachines"))),
        format!("Betriebsstunden:  {}", format::hours(int("totalOperatingHours"))),
        format!("Ersatzteile:      {}", format::integer(int("totalParts"))),
        format!(
            "Lagerwert:        {}",
            format::currency(data["totalStockValue"].as_f64().unwrap_or_default())
        ),
    ];
    if let Some(low) = data["lowStock"].as_array().filter(|l| !l.is_empty()) {
        lines.push("Niedriger Bestand:".to_string());
        for p in low {
            lines.push(format!(
                "  {:<12} {:<24} {:>6}",
                p["partNumber"].as_str().unwrap_or_default(),
                p["name"].as_str().unwrap_or_default(),
                format::integer(p["stockQuantity"].as_i64().unwrap_or_default())
            ));
        }
    }
    if let Some(top) = data["topMachinesByHours"].as_array().filter(|t| !t.is_empty()) {
        lines.push("Meiste Betriebsstunden:".to_string());
        for m in top {
            lines.push(format!(
                "  {:<12} {:>10}",
                m["number"].as_str().unwrap_or_default(),
                format::hours(m["operatingHours"].as_i64().unwrap_or_default())
            ));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dashboard_uses_german_formats() {
        let data = json!({
            "totalMachines": 1204,
            "totalOperatingHours": 45210,
            "totalParts": 87,
            "totalStockValue": 12345.5,
            "lowStock": [{ "id": 1, "partNumber": "VS-2040", "name": "Führungsbuchse", "stockQuantity": 2 }],
            "topMachinesByHours": [{ "id": 12, "number": "M-055", "machineType": "NLX", "operatingHours": 15320, "status": "Active" }]
        });
        let lines = render("dashboard.summary", &data).unwrap();
        assert!(lines[0].ends_with("1.204"));
        assert!(lines[1].ends_with("45.210 h"));
        assert!(lines[3].ends_with("12.345,50 €"));
        assert!(lines.iter().any(|l| l.contains("VS-2040")));
        assert!(lines.iter().any(|l| l.contains("M-055") && l.contains("15.320 h")));
    }

    #[test]
    fn test_backup_sizes_are_humanized() {
        let data = json!([{
            "fileName": "backup_20241001.zip", "type": "Complete",
            "sizeBytes": 1048576, "createdAt": "2024-10-01T02:00:00Z"
        }]);
        let lines = render("backups.list", &data).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("1 MB"));
        assert!(lines[0].contains(".2024"));
    }

    #[test]
    fn test_machine_line_shows_hours() {
        let data = json!([{
            "id": 12, "number": "M-055", "type": "NLX 2500", "operatingHours": 1520,
            "installationDate": "2019-04-01T12:00:00Z", "status": "Active"
        }]);
        let lines = render("machines.list", &data).unwrap();
        assert!(lines[0].contains("1.520 h"));
        assert!(lines[0].contains(".2019"));
    }

    #[test]
    fn test_unknown_target_has_no_view() {
        assert!(render("ping", &json!({"pong": true})).is_none());
        assert!(render("machines.list", &json!({"unexpected": 1})).is_none());
    }
}
