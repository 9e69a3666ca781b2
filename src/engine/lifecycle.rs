use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::escalation::EscalationTimer;
use crate::engine::matching::find_candidates;
use crate::error::AppError;
use crate::models::mechanic::{GeoPoint, IssueType};
use crate::models::request::{CandidateStatus, RequestStatus, ServiceRequest};
use crate::models::worker::WorkerAvailability;
use crate::state::AppState;
use crate::sync::alerts::spawn_alerts;

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub requester_id: Uuid,
    pub requester_name: String,
    pub requester_phone: String,
    pub origin: GeoPoint,
    pub issue_type: IssueType,
    pub description: String,
    pub image_ref: Option<String>,
    pub emergency_contacts: Vec<String>,
}

/// Persists the request with its ranked candidate list, moves it to
/// `broadcasting`, arms the escalation countdown, and fires any emergency
/// alerts. Must run inside a tokio runtime (the countdown is a spawned task).
pub fn create_request(state: &Arc<AppState>, new: NewRequest) -> Result<ServiceRequest, AppError> {
    let candidates = find_candidates(state, &new.origin, new.issue_type, 0, None, false)?;

    let mut request = ServiceRequest {
        id: Uuid::new_v4(),
        requester_id: new.requester_id,
        requester_name: new.requester_name,
        requester_phone: new.requester_phone,
        origin: new.origin,
        issue_type: new.issue_type,
        description: new.description,
        image_ref: new.image_ref,
        status: RequestStatus::Created,
        candidates,
        assigned_worker: None,
        otp_code: None,
        created_at: Utc::now(),
        completed_at: None,
        history: Vec::new(),
    };
    request.transition(RequestStatus::Created);
    request.transition(RequestStatus::Broadcasting);

    state.requests.insert(request.id, request.clone());
    state.metrics.requests_active.inc();

    let timer_state = state.clone();
    let request_id = request.id;
    let timer = EscalationTimer::arm(state.config.escalation_window(), move || {
        escalate(timer_state, request_id)
    });
    state.escalations.insert(request.id, timer);

    spawn_alerts(
        state.alerts.clone(),
        new.emergency_contacts,
        format!(
            "{} reported a {:?} breakdown at ({}, {})",
            request.requester_name, request.issue_type, request.origin.lat, request.origin.lng
        ),
    );

    info!(
        request_id = %request.id,
        candidates = request.candidates.len(),
        "request broadcasting"
    );

    Ok(request)
}

/// Claims the request for one mechanic. The whole check-and-set runs under
/// the request's map entry lock, so two racing accepts resolve to exactly
/// one winner; the loser sees `Conflict`. Re-accepting an already-won
/// request with the same mechanic id returns the existing result.
pub fn mechanic_accept(
    state: &AppState,
    request_id: Uuid,
    mechanic_id: Uuid,
) -> Result<ServiceRequest, AppError> {
    let updated = {
        let mut request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

        if let Some(winner) = request.accepted_candidate() {
            if winner.mechanic_id == mechanic_id {
                state
                    .metrics
                    .accepts_total
                    .with_label_values(&["idempotent"])
                    .inc();
                return Ok(request.clone());
            }
            state
                .metrics
                .accepts_total
                .with_label_values(&["conflict"])
                .inc();
            return Err(AppError::Conflict(format!(
                "request {request_id} already accepted by another mechanic"
            )));
        }

        if !request.status.allows(RequestStatus::MechanicAccepted) {
            return Err(AppError::Conflict(format!(
                "request {request_id} is not accepting responses (status {:?})",
                request.status
            )));
        }

        let candidate = request
            .candidate_mut(mechanic_id)
            .ok_or_else(|| AppError::NotFound(format!("mechanic {mechanic_id} is not a candidate")))?;
        candidate.status = CandidateStatus::Accepted;
        request.transition(RequestStatus::MechanicAccepted);
        request.clone()
    };

    // The scan countdown loses the race; dropping the handle cancels it.
    state.escalations.remove(&request_id);
    state
        .metrics
        .accepts_total
        .with_label_values(&["won"])
        .inc();

    info!(request_id = %request_id, mechanic_id = %mechanic_id, "mechanic accepted");
    Ok(updated)
}

/// Records one mechanic's decline. When every candidate has declined and
/// none holds the request, the broadcast is marked timed out, mirroring the
/// nobody-accepted outcome of the scan window.
pub fn mechanic_reject(
    state: &AppState,
    request_id: Uuid,
    mechanic_id: Uuid,
) -> Result<ServiceRequest, AppError> {
    let mut request = state
        .requests
        .get_mut(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

    if request.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "request {request_id} is already resolved"
        )));
    }

    let candidate = request
        .candidate_mut(mechanic_id)
        .ok_or_else(|| AppError::NotFound(format!("mechanic {mechanic_id} is not a candidate")))?;

    if candidate.status == CandidateStatus::Rejected {
        return Ok(request.clone());
    }
    candidate.status = CandidateStatus::Rejected;

    let everyone_declined = request
        .candidates
        .iter()
        .all(|c| c.status == CandidateStatus::Rejected);
    if everyone_declined && request.status.allows(RequestStatus::TimedOut) {
        request.transition(RequestStatus::TimedOut);
        warn!(request_id = %request_id, "all candidates declined");
    }

    Ok(request.clone())
}

/// Binds a field worker to an accepted request and mints the completion
/// code. Only the mechanic holding the accepted candidate may delegate.
pub fn assign_worker(
    state: &AppState,
    request_id: Uuid,
    mechanic_id: Uuid,
    worker_id: Uuid,
) -> Result<ServiceRequest, AppError> {
    let mut request = state
        .requests
        .get_mut(&request_id)
        .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

    if request.status != RequestStatus::MechanicAccepted {
        return Err(AppError::Conflict(format!(
            "request {request_id} is not awaiting worker assignment (status {:?})",
            request.status
        )));
    }

    let winner = request
        .accepted_candidate()
        .ok_or_else(|| AppError::Internal("accepted request without winner".to_string()))?;
    if winner.mechanic_id != mechanic_id {
        return Err(AppError::Forbidden(format!(
            "mechanic {mechanic_id} does not hold request {request_id}"
        )));
    }

    {
        let mut worker = state
            .workers
            .get_mut(&worker_id)
            .ok_or_else(|| AppError::NotFound(format!("worker {worker_id} not found")))?;
        if worker.mechanic_id != mechanic_id {
            return Err(AppError::NotFound(format!(
                "worker {worker_id} not found for mechanic {mechanic_id}"
            )));
        }
        worker.availability = WorkerAvailability::OnJob;
    }

    if request.otp_code.is_none() {
        request.otp_code = Some(generate_otp());
    }
    request.assigned_worker = Some(worker_id);
    request.transition(RequestStatus::WorkerAssigned);

    info!(request_id = %request_id, worker_id = %worker_id, "worker assigned");
    Ok(request.clone())
}

/// Closes out the job. Only the mechanic that was assigned may complete.
pub fn complete(
    state: &AppState,
    request_id: Uuid,
    mechanic_id: Uuid,
) -> Result<ServiceRequest, AppError> {
    let updated = {
        let mut request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

        if request.status != RequestStatus::WorkerAssigned {
            return Err(AppError::Conflict(format!(
                "request {request_id} is not in progress (status {:?})",
                request.status
            )));
        }

        let winner = request
            .accepted_candidate()
            .ok_or_else(|| AppError::Internal("assigned request without winner".to_string()))?;
        if winner.mechanic_id != mechanic_id {
            return Err(AppError::Forbidden(format!(
                "mechanic {mechanic_id} does not hold request {request_id}"
            )));
        }

        if let Some(candidate) = request.candidate_mut(mechanic_id) {
            candidate.status = CandidateStatus::Completed;
        }
        request.completed_at = Some(Utc::now());
        request.transition(RequestStatus::Completed);
        free_worker(state, request.assigned_worker);
        request.clone()
    };

    finish_request(state, &updated, "completed");
    info!(request_id = %request_id, "request completed");
    Ok(updated)
}

/// Requester-initiated abort, allowed from any non-terminal state.
pub fn cancel_request(state: &AppState, request_id: Uuid) -> Result<ServiceRequest, AppError> {
    let updated = {
        let mut request = state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

        if request.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "request {request_id} is already resolved"
            )));
        }

        request.transition(RequestStatus::Cancelled);
        free_worker(state, request.assigned_worker);
        request.clone()
    };

    finish_request(state, &updated, "cancelled");
    info!(request_id = %request_id, "request cancelled");
    Ok(updated)
}

/// Escalation fallback: runs when the scan window expires with nobody
/// holding the request. Widens the search, refreshes the candidate list
/// (declines already recorded are kept), and marks the broadcast timed out
/// so the requester can pick manually. Never auto-accepts.
pub async fn escalate(state: Arc<AppState>, request_id: Uuid) {
    let widened = {
        let Some(request) = state.requests.get(&request_id) else {
            return;
        };
        if request.accepted_candidate().is_some() || request.status.is_terminal() {
            return;
        }
        find_candidates(&state, &request.origin, request.issue_type, 0, None, true)
    };

    let refreshed = match widened {
        Ok(candidates) => candidates,
        Err(err) => {
            warn!(request_id = %request_id, error = %err, "fallback scan failed");
            return;
        }
    };

    {
        let Some(mut request) = state.requests.get_mut(&request_id) else {
            return;
        };
        if request.accepted_candidate().is_some() || request.status.is_terminal() {
            return;
        }

        let previous = std::mem::take(&mut request.candidates);
        let mut merged = refreshed;
        for candidate in &mut merged {
            if let Some(old) = previous
                .iter()
                .find(|c| c.mechanic_id == candidate.mechanic_id)
            {
                candidate.status = old.status;
            }
        }
        // A shop that declined stays visible as declined even if the
        // widened scan no longer lists it.
        for old in previous {
            if old.status == CandidateStatus::Rejected
                && !merged.iter().any(|c| c.mechanic_id == old.mechanic_id)
            {
                merged.push(old);
            }
        }
        request.candidates = merged;

        if request.status == RequestStatus::Broadcasting {
            request.transition(RequestStatus::TimedOut);
        }
    }

    state.metrics.escalations_fired_total.inc();
    state.escalations.remove(&request_id);
    warn!(request_id = %request_id, "scan window expired; widened search surfaced");
}

fn finish_request(state: &AppState, request: &ServiceRequest, outcome: &str) {
    state.escalations.remove(&request.id);
    state.metrics.requests_active.dec();

    let elapsed = (Utc::now() - request.created_at).num_milliseconds().max(0) as f64 / 1000.0;
    state
        .metrics
        .resolution_latency_seconds
        .with_label_values(&[outcome])
        .observe(elapsed);
}

fn free_worker(state: &AppState, worker_id: Option<Uuid>) {
    if let Some(worker_id) = worker_id {
        if let Some(mut worker) = state.workers.get_mut(&worker_id) {
            worker.availability = WorkerAvailability::Available;
        }
    }
}

fn generate_otp() -> String {
    format!("{:04}", rand::thread_rng().gen_range(0..10_000))
}
