use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::workers;
use crate::error::AppError;
use crate::geo::ensure_finite;
use crate::models::mechanic::{GeoPoint, IssueType, Mechanic};
use crate::models::request::{CandidateStatus, RequestStatus, ServiceRequest};
use crate::models::worker::{Worker, WorkerAvailability};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mechanics", post(register_mechanic).get(list_mechanics))
        .route("/mechanics/:id/location", patch(update_location))
        .route(
            "/mechanics/:id/workers",
            post(register_worker).get(list_workers),
        )
        .route("/mechanics/:id/requests", get(pending_requests))
        .route("/mechanics/:id/active", get(active_request))
        .route("/mechanics/:id/assigned", get(assigned_requests))
}

#[derive(Deserialize)]
pub struct RegisterMechanicRequest {
    pub name: String,
    pub phone: String,
    pub location: GeoPoint,
    pub rating: f64,
    #[serde(default)]
    pub specialties: Vec<IssueType>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct RegisterWorkerRequest {
    pub name: String,
    pub phone: String,
}

async fn register_mechanic(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterMechanicRequest>,
) -> Result<Json<Mechanic>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    ensure_finite(&payload.location)?;

    let mechanic = Mechanic {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        location: payload.location,
        rating: payload.rating.clamp(0.0, 5.0),
        specialties: payload.specialties,
        registered_at: Utc::now(),
    };

    state.mechanics.insert(mechanic.id, mechanic.clone());
    Ok(Json(mechanic))
}

async fn list_mechanics(State(state): State<Arc<AppState>>) -> Json<Vec<Mechanic>> {
    let mechanics = state
        .mechanics
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(mechanics)
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Mechanic>, AppError> {
    ensure_finite(&payload.location)?;

    let mut mechanic = state
        .mechanics
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("mechanic {id} not found")))?;

    mechanic.location = payload.location;
    Ok(Json(mechanic.clone()))
}

async fn register_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RegisterWorkerRequest>,
) -> Result<Json<Worker>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if !state.mechanics.contains_key(&id) {
        return Err(AppError::NotFound(format!("mechanic {id} not found")));
    }

    let worker = Worker {
        id: Uuid::new_v4(),
        mechanic_id: id,
        name: payload.name,
        phone: payload.phone,
        availability: WorkerAvailability::Available,
    };

    state.workers.insert(worker.id, worker.clone());
    Ok(Json(worker))
}

async fn list_workers(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Worker>>, AppError> {
    Ok(Json(workers::list_workers(&state, id)?))
}

/// Open broadcasts naming this mechanic as a still-pending candidate.
async fn pending_requests(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ServiceRequest>>, AppError> {
    if !state.mechanics.contains_key(&id) {
        return Err(AppError::NotFound(format!("mechanic {id} not found")));
    }

    let mut pending: Vec<ServiceRequest> = state
        .requests
        .iter()
        .filter(|entry| {
            let request = entry.value();
            matches!(
                request.status,
                RequestStatus::Broadcasting | RequestStatus::TimedOut
            ) && request
                .candidates
                .iter()
                .any(|c| c.mechanic_id == id && c.status == CandidateStatus::Pending)
        })
        .map(|entry| entry.value().clone())
        .collect();
    pending.sort_by_key(|r| r.created_at);

    Ok(Json(pending))
}

/// The one in-flight request this mechanic currently holds, if any.
async fn active_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Option<ServiceRequest>> {
    let active = state
        .requests
        .iter()
        .filter(|entry| {
            let request = entry.value();
            !request.status.is_terminal()
                && request
                    .accepted_candidate()
                    .is_some_and(|c| c.mechanic_id == id)
        })
        .map(|entry| entry.value().clone())
        .max_by_key(|r| r.created_at);
    Json(active)
}

/// Every request this mechanic has held, newest first. The broader poll
/// source consulted when the active lookup misses.
async fn assigned_requests(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Vec<ServiceRequest>> {
    let mut assigned: Vec<ServiceRequest> = state
        .requests
        .iter()
        .filter(|entry| {
            entry.value().candidates.iter().any(|c| {
                c.mechanic_id == id
                    && matches!(
                        c.status,
                        CandidateStatus::Accepted | CandidateStatus::Completed
                    )
            })
        })
        .map(|entry| entry.value().clone())
        .collect();
    assigned.sort_by_key(|r| std::cmp::Reverse(r.created_at));
    Json(assigned)
}
