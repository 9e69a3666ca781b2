use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::mechanic::{GeoPoint, IssueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Created,
    Broadcasting,
    MechanicAccepted,
    TimedOut,
    WorkerAssigned,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// Forward edges of the request state machine. Transitions never move
    /// backward; `Cancelled` is reachable from every non-terminal state.
    pub fn allows(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;

        if next == Cancelled {
            return !self.is_terminal();
        }

        matches!(
            (self, next),
            (Created, Broadcasting)
                | (Broadcasting, MechanicAccepted)
                | (Broadcasting, TimedOut)
                | (TimedOut, MechanicAccepted)
                | (MechanicAccepted, WorkerAssigned)
                | (WorkerAssigned, Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

/// One mechanic organization's standing against a specific request.
/// List position is the search rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMatch {
    pub mechanic_id: Uuid,
    pub mechanic_name: String,
    pub distance_km: f64,
    pub rating: f64,
    pub status: CandidateStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: RequestStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub requester_name: String,
    pub requester_phone: String,
    pub origin: GeoPoint,
    pub issue_type: IssueType,
    pub description: String,
    pub image_ref: Option<String>,
    pub status: RequestStatus,
    pub candidates: Vec<CandidateMatch>,
    pub assigned_worker: Option<Uuid>,
    pub otp_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub history: Vec<StatusChange>,
}

impl ServiceRequest {
    /// Applies a validated transition and stamps it into the audit trail.
    pub fn transition(&mut self, next: RequestStatus) {
        self.status = next;
        self.history.push(StatusChange {
            status: next,
            at: Utc::now(),
        });
    }

    pub fn accepted_candidate(&self) -> Option<&CandidateMatch> {
        self.candidates
            .iter()
            .find(|c| c.status == CandidateStatus::Accepted)
    }

    pub fn candidate_mut(&mut self, mechanic_id: Uuid) -> Option<&mut CandidateMatch> {
        self.candidates
            .iter_mut()
            .find(|c| c.mechanic_id == mechanic_id)
    }
}
