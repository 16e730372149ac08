use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{BloodGroup, Inventory};

/// POST /blood-requests. Enumerated fields arrive as strings so bad values
/// come back as field errors.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBloodRequest {
    #[serde(default)]
    pub patient_name: String,
    pub blood_group: Option<String>,
    pub required_units: Option<i32>,
    pub urgency: Option<String>,
    pub notes: Option<String>,
}

/// PUT /blood-requests/:id/status
#[derive(Debug, Default, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// PUT /hospitals/:id/blood-inventory
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryUpdateRequest {
    pub blood_group: Option<String>,
    pub units: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Donor listings only.
    pub blood_group: Option<String>,
}
fn default_limit() -> i64 { 20 }

#[derive(Debug, Serialize, PartialEq)]
pub struct InventoryEntry {
    pub name: BloodGroup,
    pub units: i32,
}

/// Units for all eight groups; unstocked groups read 0.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryResponse {
    pub hospital_id: Uuid,
    pub inventory: Vec<InventoryEntry>,
    pub total_units: i64,
}

impl InventoryResponse {
    pub fn new(hospital_id: Uuid, stock: &Inventory) -> Self {
        let inventory: Vec<InventoryEntry> = BloodGroup::ALL
            .into_iter()
            .map(|name| InventoryEntry {
                name,
                units: stock.get(&name).copied().unwrap_or(0),
            })
            .collect();
        let total_units = inventory.iter().map(|e| i64::from(e.units)).sum();
        Self {
            hospital_id,
            inventory,
            total_units,
        }
    }
}
