use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Breakdown categories a mechanic organization can service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Battery,
    Engine,
    Tyre,
    Brakes,
    Fuel,
    Towing,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mechanic {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub location: GeoPoint,
    pub rating: f64,
    /// Empty list means the shop takes any issue type.
    pub specialties: Vec<IssueType>,
    pub registered_at: DateTime<Utc>,
}

impl Mechanic {
    pub fn services(&self, issue: IssueType) -> bool {
        self.specialties.is_empty() || self.specialties.contains(&issue)
    }
}
