// Prometheus metrics definitions for the roster backend.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Whether an audit sweep is currently running (0 or 1).
    pub static ref AUDIT_SWEEP_RUNNING: IntGauge =
        IntGauge::new("gauntlet_audit_sweep_running", "Audit sweep in progress").unwrap();

    /// Substitution timers currently pending revocation.
    pub static ref ACTIVE_SUBSTITUTIONS: IntGauge =
        IntGauge::new("gauntlet_active_substitutions", "Pending substitution revocations").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Rank API requests, by endpoint and outcome.
    pub static ref RIOT_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gauntlet_riot_requests_total", "Rank API requests"),
        &["endpoint", "outcome"],
    )
    .unwrap();

    /// Rank API retries, by endpoint.
    pub static ref RIOT_RETRIES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gauntlet_riot_retries_total", "Rank API retries"),
        &["endpoint"],
    )
    .unwrap();

    /// Audit sweep member outcomes (processed, skipped, errored).
    pub static ref AUDIT_MEMBERS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gauntlet_audit_members_total", "Audit sweep member outcomes"),
        &["outcome"],
    )
    .unwrap();

    /// Completed audit sweeps.
    pub static ref AUDIT_SWEEPS_TOTAL: IntCounter = IntCounter::new(
        "gauntlet_audit_sweeps_total",
        "Completed audit sweeps",
    )
    .unwrap();

    /// Roster transactions, by kind and outcome.
    pub static ref TRANSACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("gauntlet_transactions_total", "Roster transactions"),
        &["kind", "outcome"],
    )
    .unwrap();
}

/// Register all metrics with the shared registry. Call once at startup.
pub fn register_metrics() {
    REGISTRY
        .register(Box::new(AUDIT_SWEEP_RUNNING.clone()))
        .ok();
    REGISTRY
        .register(Box::new(ACTIVE_SUBSTITUTIONS.clone()))
        .ok();
    REGISTRY
        .register(Box::new(RIOT_REQUESTS_TOTAL.clone()))
        .ok();
    REGISTRY.register(Box::new(RIOT_RETRIES_TOTAL.clone())).ok();
    REGISTRY
        .register(Box::new(AUDIT_MEMBERS_TOTAL.clone()))
        .ok();
    REGISTRY.register(Box::new(AUDIT_SWEEPS_TOTAL.clone())).ok();
    REGISTRY.register(Box::new(TRANSACTIONS_TOTAL.clone())).ok();
}

/// Encode all registered metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_gather() {
        register_metrics();
        // Registering twice must not panic.
        register_metrics();

        AUDIT_MEMBERS_TOTAL.with_label_values(&["processed"]).inc();
        let text = gather_metrics();
        assert!(text.contains("gauntlet_audit_members_total"));
    }
}
