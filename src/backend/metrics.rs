use once_cell::sync::Lazy;
use prometheus::{Counter, Histogram, HistogramOpts, Registry, TextEncoder};

pub struct VerifierMetrics {
    pub decisions_granted: Counter,
    pub decisions_denied: Counter,
    pub decisions_pending: Counter,
    pub storage_failures: Counter,
    pub auth_failures: Counter,
    pub resolve_duration: Histogram,
    registry: Registry,
}

impl VerifierMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let decisions_granted = Counter::new(
            "entitled_decisions_granted_total",
            "Resolutions that granted access",
        )
        .unwrap();
        let decisions_denied = Counter::new(
            "entitled_decisions_denied_total",
            "Resolutions that denied access",
        )
        .unwrap();
        let decisions_pending = Counter::new(
            "entitled_decisions_pending_total",
            "Resolutions awaiting beta approval",
        )
        .unwrap();
        let storage_failures = Counter::new(
            "entitled_storage_failures_total",
            "Resolutions aborted because every tier lookup failed",
        )
        .unwrap();
        let auth_failures = Counter::new(
            "entitled_auth_failures_total",
            "Verification requests with a missing or rejected credential",
        )
        .unwrap();
        let resolve_duration = Histogram::with_opts(
            HistogramOpts::new(
                "entitled_resolve_duration_seconds",
                "Time spent resolving one principal",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )
        .unwrap();

        registry
            .register(Box::new(decisions_granted.clone()))
            .unwrap();
        registry
            .register(Box::new(decisions_denied.clone()))
            .unwrap();
        registry
            .register(Box::new(decisions_pending.clone()))
            .unwrap();
        registry
            .register(Box::new(storage_failures.clone()))
            .unwrap();
        registry.register(Box::new(auth_failures.clone())).unwrap();
        registry
            .register(Box::new(resolve_duration.clone()))
            .unwrap();

        Self {
            decisions_granted,
            decisions_denied,
            decisions_pending,
            storage_failures,
            auth_failures,
            resolve_duration,
            registry,
        }
    }

    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode_to_string(&families).unwrap_or_default()
    }
}

pub static METRICS: Lazy<VerifierMetrics> = Lazy::new(VerifierMetrics::new);

pub async fn metrics_handler() -> String {
    METRICS.encode()
}
