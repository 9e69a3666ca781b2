use std::sync::Mutex;

use uuid::Uuid;

use crate::models::request::CandidateMatch;

/// Best-effort per-session cache: the last request this session touched and
/// the last candidate page it rendered. A fallback read path only; the
/// polled server state stays authoritative.
#[derive(Default)]
pub struct SessionCache {
    last_request_id: Mutex<Option<Uuid>>,
    last_candidates: Mutex<Vec<CandidateMatch>>,
}

impl SessionCache {
    pub fn remember_request(&self, id: Uuid) {
        if let Ok(mut slot) = self.last_request_id.lock() {
            *slot = Some(id);
        }
    }

    pub fn last_request_id(&self) -> Option<Uuid> {
        self.last_request_id.lock().ok().and_then(|slot| *slot)
    }

    pub fn forget_request(&self) {
        if let Ok(mut slot) = self.last_request_id.lock() {
            *slot = None;
        }
    }

    pub fn remember_candidates(&self, candidates: &[CandidateMatch]) {
        if let Ok(mut slot) = self.last_candidates.lock() {
            *slot = candidates.to_vec();
        }
    }

    pub fn last_candidates(&self) -> Vec<CandidateMatch> {
        self.last_candidates
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::SessionCache;

    #[test]
    fn remembers_and_forgets_the_last_request() {
        let cache = SessionCache::default();
        assert!(cache.last_request_id().is_none());

        let id = Uuid::from_u128(7);
        cache.remember_request(id);
        assert_eq!(cache.last_request_id(), Some(id));

        cache.forget_request();
        assert!(cache.last_request_id().is_none());
    }
}
