//! Dashboard aggregates computed from the machine and part lists.

use crate::config::DashboardConfig;
use crate::model::{Machine, MachineStatus, MaintenancePart, PartCategory};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSummary {
    pub id: i64,
    pub number: String,
    pub machine_type: String,
    pub operating_hours: i32,
    pub status: MachineStatus,
}

impl From<&Machine> for MachineSummary {
    fn from(m: &Machine) -> Self {
        Self {
            id: m.id,
            number: m.number.clone(),
            machine_type: m.machine_type.clone(),
            operating_hours: m.operating_hours,
            status: m.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockPart {
    pub id: i64,
    pub part_number: String,
    pub name: String,
    pub stock_quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_machines: usize,
    pub machines_by_status: BTreeMap<MachineStatus, usize>,
    pub total_operating_hours: i64,
    pub total_parts: usize,
    pub parts_by_category: BTreeMap<PartCategory, usize>,
    pub total_stock_value: f64,
    pub low_stock: Vec<LowStockPart>,
    pub top_machines_by_hours: Vec<MachineSummary>,
}

impl DashboardSummary {
    pub fn compute(machines: &[Machine], parts: &[MaintenancePart], config: &DashboardConfig) -> Self {
        let mut machines_by_status: BTreeMap<MachineStatus, usize> =
            MachineStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for m in machines {
            *machines_by_status.entry(m.status).or_default() += 1;
        }

        let mut parts_by_category: BTreeMap<PartCategory, usize> =
            PartCategory::ALL.iter().map(|c| (*c, 0)).collect();
        for p in parts {
            *parts_by_category.entry(p.category).or_default() += 1;
        }

        let mut low_stock: Vec<LowStockPart> = parts
            .iter()
            .filter(|p| p.stock_quantity <= config.low_stock_threshold)
            .map(|p| LowStockPart {
                id: p.id,
                part_number: p.part_number.clone(),
                name: p.name.clone(),
                stock_quantity: p.stock_quantity,
            })
            .collect();
        low_stock.sort_by(|a, b| {
            a.stock_quantity
                .cmp(&b.stock_quantity)
                .then_with(|| a.part_number.cmp(&b.part_number))
        });

        let mut by_hours: Vec<&Machine> = machines.iter().collect();
        by_hours.sort_by(|a, b| {
            b.operating_hours
                .cmp(&a.operating_hours)
                .then_with(|| a.number.cmp(&b.number))
        });

        Self {
            total_machines: machines.len(),
            machines_by_status,
            total_operating_hours: machines.iter().map(|m| m.operating_hours as i64).sum(),
            total_parts: parts.len(),
            parts_by_category,
            total_stock_value: parts
                .iter()
                .map(|p| p.price * p.stock_quantity.max(0) as f64)
                .sum(),
            low_stock,
            top_machines_by_hours: by_hours
                .into_iter()
                .take(config.top_machines)
                .map(MachineSummary::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(id: i64, hours: i32, status: &str) -> Machine {
        serde_json::from_value(serde_json::json!({
            "id": id, "number": format!("M-{}", id), "type": "CTX",
            "operatingHours": hours, "installationDate": "2018-01-01", "status": status
        }))
        .unwrap()
    }

    fn part(id: i64, category: u8, price: f64, stock: i32) -> MaintenancePart {
        serde_json::from_value(serde_json::json!({
            "id": id, "partNumber": format!("P-{}", id), "name": "Teil",
            "category": category, "price": price, "stockQuantity": stock
        }))
        .unwrap()
    }

    #[test]
    fn test_summary() {
        let machines = vec![
            machine(1, 500, "Active"),
            machine(2, 9000, "InMaintenance"),
            machine(3, 1200, "Active"),
        ];
        let parts = vec![part(1, 0, 10.0, 3), part(2, 1, 2.5, 40), part(3, 0, 100.0, 0)];
        let config = DashboardConfig {
            low_stock_threshold: 5,
            top_machines: 2,
        };

        let s = DashboardSummary::compute(&machines, &parts, &config);
        assert_eq!(s.total_machines, 3);
        assert_eq!(s.machines_by_status[&MachineStatus::Active], 2);
        assert_eq!(s.machines_by_status[&MachineStatus::OutOfService], 0);
        assert_eq!(s.parts_by_category[&PartCategory::WearPart], 2);
        assert_eq!(s.total_stock_value, 130.0);
        assert_eq!(
            s.low_stock.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec![3, 1]
        );
        assert_eq!(
            s.top_machines_by_hours.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(s.total_operating_hours, 10_700);
    }
}
