use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;

/// Metrics for the [super::Coordinator].
#[derive(Default)]
pub struct Metrics {
    /// Number of proposals accepted
    pub proposals: Counter,
    /// Number of votes accepted
    pub votes: Counter,
    /// Number of messages rejected
    pub rejected: Counter,
    /// Number of certificates saved
    pub certificates: Counter,
    /// Number of in-flight ordering instances
    pub instances: Gauge,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given registry.
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "proposals",
            "Number of proposals accepted",
            metrics.proposals.clone(),
        );
        registry.register("votes", "Number of votes accepted", metrics.votes.clone());
        registry.register(
            "rejected",
            "Number of messages rejected",
            metrics.rejected.clone(),
        );
        registry.register(
            "certificates",
            "Number of certificates saved",
            metrics.certificates.clone(),
        );
        registry.register(
            "instances",
            "Number of in-flight ordering instances",
            metrics.instances.clone(),
        );
        metrics
    }
}
