use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;

/// Metrics for a [LedgerSync](super::LedgerSync).
#[derive(Default)]
pub struct Metrics {
    /// Number of batches verified and applied
    pub batches_applied: Counter,
    /// Number of batches that failed verification
    pub batches_rejected: Counter,
    /// Number of consistency proofs accepted as evidence
    pub proofs_accepted: Counter,
    /// Number of consistency proofs rejected
    pub proofs_rejected: Counter,
    /// Number of catch-up episodes completed
    pub episodes_completed: Counter,
    /// Current ledger state (0 = not synced, 1 = syncing, 2 = synced)
    pub state: Gauge,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given registry.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "batches_applied",
            "Number of batches verified and applied",
            metrics.batches_applied.clone(),
        );
        registry.register(
            "batches_rejected",
            "Number of batches that failed verification",
            metrics.batches_rejected.clone(),
        );
        registry.register(
            "proofs_accepted",
            "Number of consistency proofs accepted as evidence",
            metrics.proofs_accepted.clone(),
        );
        registry.register(
            "proofs_rejected",
            "Number of consistency proofs rejected",
            metrics.proofs_rejected.clone(),
        );
        registry.register(
            "episodes_completed",
            "Number of catch-up episodes completed",
            metrics.episodes_completed.clone(),
        );
        registry.register(
            "state",
            "Current ledger state (0 = not synced, 1 = syncing, 2 = synced)",
            metrics.state.clone(),
        );
        metrics
    }
}
