use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::request::ServiceRequest;
use crate::sync::cache::SessionCache;

/// The authoritative read seam the reconciliation loop polls through. An
/// HTTP client implements this against the coordinator's REST surface;
/// tests script it directly.
pub trait SnapshotFetch: Send + Sync {
    fn request_by_id(&self, id: Uuid)
        -> BoxFuture<'_, Result<Option<ServiceRequest>, AppError>>;

    fn active_for_requester(
        &self,
        requester_id: Uuid,
    ) -> BoxFuture<'_, Result<Option<ServiceRequest>, AppError>>;

    fn active_for_mechanic(
        &self,
        mechanic_id: Uuid,
    ) -> BoxFuture<'_, Result<Option<ServiceRequest>, AppError>>;

    fn assigned_to_mechanic(
        &self,
        mechanic_id: Uuid,
    ) -> BoxFuture<'_, Result<Vec<ServiceRequest>, AppError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRef {
    Requester(Uuid),
    Mechanic(Uuid),
}

/// Probes the lookup sources for one actor in fixed priority order — cached
/// last-request id, then the actor's active-request query, then (mechanics
/// only) the broader assigned-requests query — and short-circuits on the
/// first authoritative hit, so lower-priority sources can never contribute
/// a conflicting partial view.
pub async fn resolve_snapshot<'a, F: SnapshotFetch>(
    fetch: &'a F,
    cache: &SessionCache,
    actor: &ActorRef,
) -> Result<Option<ServiceRequest>, AppError> {
    let mut sources: Vec<(
        &'static str,
        BoxFuture<'a, Result<Option<ServiceRequest>, AppError>>,
    )> = Vec::new();

    if let Some(cached_id) = cache.last_request_id() {
        sources.push(("cached_request_id", fetch.request_by_id(cached_id)));
    }

    match *actor {
        ActorRef::Requester(requester_id) => {
            sources.push(("active_request", fetch.active_for_requester(requester_id)));
        }
        ActorRef::Mechanic(mechanic_id) => {
            sources.push(("active_request", fetch.active_for_mechanic(mechanic_id)));
            sources.push((
                "assigned_requests",
                Box::pin(async move {
                    let assigned = fetch.assigned_to_mechanic(mechanic_id).await?;
                    Ok(assigned
                        .into_iter()
                        .find(|request| !request.status.is_terminal()))
                }),
            ));
        }
    }

    for (label, source) in sources {
        if let Some(snapshot) = source.await? {
            tracing::debug!(source = label, request_id = %snapshot.id, "snapshot resolved");
            return Ok(Some(snapshot));
        }
    }

    Ok(None)
}
