use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::escalation::EscalationTimer;
use crate::models::mechanic::Mechanic;
use crate::models::request::ServiceRequest;
use crate::models::worker::Worker;
use crate::observability::metrics::Metrics;
use crate::sync::alerts::{EmergencyNotifier, LogNotifier};

pub struct AppState {
    pub config: Config,
    pub mechanics: DashMap<Uuid, Mechanic>,
    pub workers: DashMap<Uuid, Worker>,
    pub requests: DashMap<Uuid, ServiceRequest>,
    /// Armed escalation countdowns, keyed by request id. Removing an entry
    /// cancels the timer.
    pub escalations: DashMap<Uuid, EscalationTimer>,
    pub alerts: Arc<dyn EmergencyNotifier>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: Config, alerts: Arc<dyn EmergencyNotifier>) -> Self {
        Self {
            config,
            mechanics: DashMap::new(),
            workers: DashMap::new(),
            requests: DashMap::new(),
            escalations: DashMap::new(),
            alerts,
            metrics: Metrics::new(),
        }
    }
}
