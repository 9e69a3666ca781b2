use uuid::Uuid;

use crate::engine::lifecycle;
use crate::error::AppError;
use crate::models::request::ServiceRequest;
use crate::models::worker::Worker;
use crate::state::AppState;

/// Roster of one mechanic organization, with availability, in stable name
/// order so repeated polls render the same list.
pub fn list_workers(state: &AppState, mechanic_id: Uuid) -> Result<Vec<Worker>, AppError> {
    if !state.mechanics.contains_key(&mechanic_id) {
        return Err(AppError::NotFound(format!(
            "mechanic {mechanic_id} not found"
        )));
    }

    let mut roster: Vec<Worker> = state
        .workers
        .iter()
        .filter(|entry| entry.value().mechanic_id == mechanic_id)
        .map(|entry| entry.value().clone())
        .collect();
    roster.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    Ok(roster)
}

/// Delegates an accepted request to one field worker. The raw id is
/// validated here so a malformed submission fails before any state work.
pub fn assign(
    state: &AppState,
    request_id: Uuid,
    mechanic_id: Uuid,
    raw_worker_id: &str,
) -> Result<ServiceRequest, AppError> {
    let worker_id = parse_worker_id(raw_worker_id)?;
    lifecycle::assign_worker(state, request_id, mechanic_id, worker_id)
}

fn parse_worker_id(raw: &str) -> Result<Uuid, AppError> {
    let worker_id = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::BadRequest(format!("malformed worker id: {raw:?}")))?;
    if worker_id.is_nil() {
        return Err(AppError::BadRequest("worker id must not be nil".to_string()));
    }
    Ok(worker_id)
}
