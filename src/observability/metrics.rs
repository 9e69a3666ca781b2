use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub requests_active: IntGauge,
    pub accepts_total: IntCounterVec,
    pub escalations_fired_total: IntCounter,
    pub resolution_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_active = IntGauge::new(
            "requests_active",
            "Breakdown requests currently in a non-terminal state",
        )
        .expect("valid requests_active metric");

        let accepts_total = IntCounterVec::new(
            Opts::new("accepts_total", "Accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accepts_total metric");

        let escalations_fired_total = IntCounter::new(
            "escalations_fired_total",
            "Scan windows that expired into a widened fallback search",
        )
        .expect("valid escalations_fired_total metric");

        let resolution_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "resolution_latency_seconds",
                "Time from request creation to a terminal state in seconds",
            ),
            &["outcome"],
        )
        .expect("valid resolution_latency_seconds metric");

        registry
            .register(Box::new(requests_active.clone()))
            .expect("register requests_active");
        registry
            .register(Box::new(accepts_total.clone()))
            .expect("register accepts_total");
        registry
            .register(Box::new(escalations_fired_total.clone()))
            .expect("register escalations_fired_total");
        registry
            .register(Box::new(resolution_latency_seconds.clone()))
            .expect("register resolution_latency_seconds");

        Self {
            registry,
            requests_active,
            accepts_total,
            escalations_fired_total,
            resolution_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
