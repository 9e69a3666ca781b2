use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerAvailability {
    Available,
    OnJob,
    OffDuty,
}

/// A field technician belonging to one mechanic organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: Uuid,
    pub mechanic_id: Uuid,
    pub name: String,
    pub phone: String,
    pub availability: WorkerAvailability,
}
