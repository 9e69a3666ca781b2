use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::{lifecycle, matching, workers};
use crate::error::AppError;
use crate::models::mechanic::{GeoPoint, IssueType};
use crate::models::request::{CandidateMatch, ServiceRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/matches", get(find_matches))
        .route("/requests", post(create_request))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/accept", post(accept_request))
        .route("/requests/:id/reject", post(reject_request))
        .route("/requests/:id/assign", post(assign_worker))
        .route("/requests/:id/complete", post(complete_request))
        .route("/requests/:id/cancel", post(cancel_request))
        .route("/requesters/:id/active", get(requester_active))
}

#[derive(Deserialize)]
pub struct MatchQuery {
    pub lat: f64,
    pub lng: f64,
    pub issue_type: IssueType,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CreateRequestBody {
    pub requester_id: Uuid,
    pub requester_name: String,
    pub requester_phone: String,
    pub origin: GeoPoint,
    pub issue_type: IssueType,
    pub description: String,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub emergency_contacts: Vec<String>,
}

#[derive(Deserialize)]
pub struct MechanicAction {
    pub mechanic_id: Uuid,
}

#[derive(Deserialize)]
pub struct AssignWorkerBody {
    pub mechanic_id: Uuid,
    /// Raw on purpose: malformed ids are refused before any state work.
    pub worker_id: String,
}

async fn find_matches(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<Vec<CandidateMatch>>, AppError> {
    let origin = GeoPoint {
        lat: query.lat,
        lng: query.lng,
    };
    let found = matching::find_candidates(
        &state,
        &origin,
        query.issue_type,
        query.offset,
        query.limit,
        false,
    )?;
    Ok(Json(found))
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRequestBody>,
) -> Result<Json<ServiceRequest>, AppError> {
    if payload.requester_name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let request = lifecycle::create_request(
        &state,
        lifecycle::NewRequest {
            requester_id: payload.requester_id,
            requester_name: payload.requester_name,
            requester_phone: payload.requester_phone,
            origin: payload.origin,
            issue_type: payload.issue_type,
            description: payload.description,
            image_ref: payload.image_ref,
            emergency_contacts: payload.emergency_contacts,
        },
    )?;
    Ok(Json(request))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state
        .requests
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;
    Ok(Json(request.value().clone()))
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MechanicAction>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(lifecycle::mechanic_accept(
        &state,
        id,
        payload.mechanic_id,
    )?))
}

async fn reject_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MechanicAction>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(lifecycle::mechanic_reject(
        &state,
        id,
        payload.mechanic_id,
    )?))
}

async fn assign_worker(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignWorkerBody>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(workers::assign(
        &state,
        id,
        payload.mechanic_id,
        &payload.worker_id,
    )?))
}

async fn complete_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MechanicAction>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(lifecycle::complete(&state, id, payload.mechanic_id)?))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    Ok(Json(lifecycle::cancel_request(&state, id)?))
}

/// The requester's own in-flight request, newest first. Poll source for
/// the requester client.
async fn requester_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<Option<ServiceRequest>> {
    let active = state
        .requests
        .iter()
        .filter(|entry| {
            let request = entry.value();
            request.requester_id == id && !request.status.is_terminal()
        })
        .map(|entry| entry.value().clone())
        .max_by_key(|r| r.created_at);
    Json(active)
}
