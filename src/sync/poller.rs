use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::sync::cache::SessionCache;
use crate::sync::sources::{resolve_snapshot, ActorRef, SnapshotFetch};

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAssignment {
    pub request_id: Uuid,
    pub worker_id: Uuid,
    pub otp_code: Option<String>,
}

/// The local view one client renders between polls. Only `apply` and
/// `record_failure` mutate it, so reconciliation stays idempotent.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ViewState {
    pub request: Option<ServiceRequest>,
    pub active_assignment: Option<ActiveAssignment>,
    /// Set on a failed cycle; the UI renders this as a retry affordance.
    /// The rest of the view keeps its last-known-good contents.
    pub last_error: Option<String>,
    pub stopped: bool,
}

impl ViewState {
    /// Merges one authoritative snapshot. Returns whether anything
    /// observable changed; an identical snapshot is a no-op.
    pub fn apply(&mut self, snapshot: ServiceRequest) -> bool {
        let same = self.request.as_ref() == Some(&snapshot);
        let recovered = self.last_error.take().is_some();

        if snapshot.status == RequestStatus::WorkerAssigned {
            self.active_assignment = snapshot.assigned_worker.map(|worker_id| ActiveAssignment {
                request_id: snapshot.id,
                worker_id,
                otp_code: snapshot.otp_code.clone(),
            });
        }

        if snapshot.status.is_terminal() {
            self.active_assignment = None;
            self.stopped = true;
        }

        self.request = Some(snapshot);
        !same || recovered
    }

    pub fn record_failure(&mut self, err: &AppError) {
        self.last_error = Some(err.to_string());
    }
}

/// Client-side reconciliation loop: periodically re-reads authoritative
/// request state and merges it into the local view, tolerating transient
/// fetch failures and stale data. Requester and mechanic clients each run
/// their own instance.
pub struct PollingSync<F: SnapshotFetch> {
    fetch: F,
    cache: Arc<SessionCache>,
    actor: ActorRef,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
    pub view: ViewState,
}

impl<F: SnapshotFetch> PollingSync<F> {
    pub fn new(
        fetch: F,
        actor: ActorRef,
        interval: Duration,
        cache: Arc<SessionCache>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            fetch,
            cache,
            actor,
            interval,
            shutdown,
            view: ViewState::default(),
        }
    }

    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            if !self.poll_once().await {
                break;
            }
        }
    }

    /// One reconciliation cycle. Returns false when polling should stop:
    /// shutdown (an in-flight fetch is dropped and its result discarded) or
    /// a terminal snapshot.
    pub async fn poll_once(&mut self) -> bool {
        let outcome = tokio::select! {
            _ = self.shutdown.changed() => return false,
            outcome = resolve_snapshot(&self.fetch, &self.cache, &self.actor) => outcome,
        };

        match outcome {
            Ok(Some(snapshot)) => {
                if snapshot.status.is_terminal() {
                    self.cache.forget_request();
                } else {
                    self.cache.remember_request(snapshot.id);
                    self.cache.remember_candidates(&snapshot.candidates);
                }
                self.view.apply(snapshot);
                !self.view.stopped
            }
            Ok(None) => true,
            Err(err) => {
                self.view.record_failure(&err);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::Utc;
    use futures::future::BoxFuture;
    use tokio::sync::watch;
    use uuid::Uuid;

    use super::{ActiveAssignment, PollingSync, ViewState};
    use crate::error::AppError;
    use crate::models::mechanic::{GeoPoint, IssueType};
    use crate::models::request::{RequestStatus, ServiceRequest};
    use crate::sync::cache::SessionCache;
    use crate::sync::sources::{ActorRef, SnapshotFetch};

    fn snapshot(status: RequestStatus) -> ServiceRequest {
        let mut request = ServiceRequest {
            id: Uuid::from_u128(77),
            requester_id: Uuid::from_u128(900),
            requester_name: "Asha".to_string(),
            requester_phone: "9822222222".to_string(),
            origin: GeoPoint {
                lat: 22.99,
                lng: 72.49,
            },
            issue_type: IssueType::Battery,
            description: "won't start".to_string(),
            image_ref: None,
            status,
            candidates: vec![],
            assigned_worker: None,
            otp_code: None,
            created_at: Utc::now(),
            completed_at: None,
            history: vec![],
        };
        if matches!(
            status,
            RequestStatus::WorkerAssigned | RequestStatus::Completed
        ) {
            request.assigned_worker = Some(Uuid::from_u128(11));
            request.otp_code = Some("0042".to_string());
        }
        request
    }

    #[derive(Default)]
    struct ScriptedFetch {
        by_id: Mutex<VecDeque<Result<Option<ServiceRequest>, AppError>>>,
        active: Mutex<VecDeque<Result<Option<ServiceRequest>, AppError>>>,
        by_id_calls: AtomicUsize,
        active_calls: AtomicUsize,
        hang: bool,
    }

    impl SnapshotFetch for ScriptedFetch {
        fn request_by_id(
            &self,
            _id: Uuid,
        ) -> BoxFuture<'_, Result<Option<ServiceRequest>, AppError>> {
            Box::pin(async move {
                if self.hang {
                    futures::future::pending::<()>().await;
                }
                self.by_id_calls.fetch_add(1, Ordering::SeqCst);
                self.by_id
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Ok(None))
            })
        }

        fn active_for_requester(
            &self,
            _requester_id: Uuid,
        ) -> BoxFuture<'_, Result<Option<ServiceRequest>, AppError>> {
            Box::pin(async move {
                if self.hang {
                    futures::future::pending::<()>().await;
                }
                self.active_calls.fetch_add(1, Ordering::SeqCst);
                self.active
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or(Ok(None))
            })
        }

        fn active_for_mechanic(
            &self,
            mechanic_id: Uuid,
        ) -> BoxFuture<'_, Result<Option<ServiceRequest>, AppError>> {
            self.active_for_requester(mechanic_id)
        }

        fn assigned_to_mechanic(
            &self,
            _mechanic_id: Uuid,
        ) -> BoxFuture<'_, Result<Vec<ServiceRequest>, AppError>> {
            Box::pin(async { Ok(vec![]) })
        }
    }

    fn poller(
        fetch: ScriptedFetch,
        cache: Arc<SessionCache>,
    ) -> (PollingSync<ScriptedFetch>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let sync = PollingSync::new(
            fetch,
            ActorRef::Requester(Uuid::from_u128(900)),
            Duration::from_secs(5),
            cache,
            rx,
        );
        (sync, tx)
    }

    #[test]
    fn applying_an_identical_snapshot_twice_changes_nothing() {
        let mut view = ViewState::default();
        let snap = snapshot(RequestStatus::Broadcasting);

        assert!(view.apply(snap.clone()));
        let frozen = view.clone();

        assert!(!view.apply(snap));
        assert_eq!(view, frozen);
    }

    #[test]
    fn completed_snapshot_clears_the_active_assignment() {
        let mut view = ViewState::default();

        view.apply(snapshot(RequestStatus::WorkerAssigned));
        assert_eq!(
            view.active_assignment,
            Some(ActiveAssignment {
                request_id: Uuid::from_u128(77),
                worker_id: Uuid::from_u128(11),
                otp_code: Some("0042".to_string()),
            })
        );

        view.apply(snapshot(RequestStatus::Completed));
        assert!(view.active_assignment.is_none());
        assert!(view.stopped);
    }

    #[tokio::test]
    async fn fetch_failure_retains_last_known_good_state() {
        let fetch = ScriptedFetch::default();
        fetch
            .active
            .lock()
            .unwrap()
            .push_back(Ok(Some(snapshot(RequestStatus::Broadcasting))));
        fetch
            .by_id
            .lock()
            .unwrap()
            .push_back(Err(AppError::Transient("network flaked".to_string())));

        let cache = Arc::new(SessionCache::default());
        let (mut sync, _tx) = poller(fetch, cache);

        assert!(sync.poll_once().await);
        assert!(sync.view.request.is_some());
        assert!(sync.view.last_error.is_none());

        // Second cycle hits the cached-id source, which now fails.
        assert!(sync.poll_once().await);
        assert!(sync.view.request.is_some());
        assert_eq!(
            sync.view.request.as_ref().unwrap().status,
            RequestStatus::Broadcasting
        );
        assert!(sync.view.last_error.is_some());
    }

    #[tokio::test]
    async fn cached_id_hit_short_circuits_lower_priority_sources() {
        let fetch = ScriptedFetch::default();
        fetch
            .by_id
            .lock()
            .unwrap()
            .push_back(Ok(Some(snapshot(RequestStatus::Broadcasting))));

        let cache = Arc::new(SessionCache::default());
        cache.remember_request(Uuid::from_u128(77));
        let (mut sync, _tx) = poller(fetch, cache);

        assert!(sync.poll_once().await);
        assert_eq!(sync.fetch.by_id_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sync.fetch.active_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn terminal_snapshot_stops_polling_within_one_cycle() {
        let fetch = ScriptedFetch::default();
        fetch
            .active
            .lock()
            .unwrap()
            .push_back(Ok(Some(snapshot(RequestStatus::Completed))));

        let cache = Arc::new(SessionCache::default());
        cache.remember_request(Uuid::from_u128(77));
        let (mut sync, _tx) = poller(fetch, cache.clone());

        assert!(!sync.poll_once().await);
        assert!(sync.view.stopped);
        assert!(sync.view.active_assignment.is_none());
        assert!(cache.last_request_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_the_in_flight_fetch() {
        let fetch = ScriptedFetch {
            hang: true,
            ..ScriptedFetch::default()
        };
        let cache = Arc::new(SessionCache::default());
        cache.remember_request(Uuid::from_u128(77));
        let (mut sync, tx) = poller(fetch, cache);

        let poll = tokio::spawn(async move {
            let keep_going = sync.poll_once().await;
            (keep_going, sync)
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let (keep_going, sync) = poll.await.unwrap();
        assert!(!keep_going);
        assert!(sync.view.request.is_none());
        assert!(sync.view.last_error.is_none());
    }
}
