//! Process-wide counters: a `lazy_static!` +
//! `prometheus::register_int_counter!` registry over this runtime's own
//! vocabulary (epochs, messages, reductions, RDMA ops).

use crate::TelemetryError;
use lazy_static::lazy_static;
use prometheus::{IntCounter, Registry};

lazy_static! {
    pub static ref EPOCHS_OPENED: IntCounter =
        IntCounter::new("rt_epochs_opened_total", "Epochs constructed (rooted + collective)").unwrap();
    pub static ref EPOCHS_TERMINATED: IntCounter =
        IntCounter::new("rt_epochs_terminated_total", "Epochs detected terminated").unwrap();
    pub static ref MESSAGES_SENT: IntCounter =
        IntCounter::new("rt_messages_sent_total", "Active messages posted to the transport or dispatched inline").unwrap();
    pub static ref MESSAGES_DISPATCHED: IntCounter =
        IntCounter::new("rt_messages_dispatched_total", "Active messages handed to a registered handler").unwrap();
    pub static ref BROADCASTS_SENT: IntCounter =
        IntCounter::new("rt_broadcasts_sent_total", "Broadcast fan-outs initiated").unwrap();
    pub static ref REDUCTIONS_COMPLETED: IntCounter =
        IntCounter::new("rt_reductions_completed_total", "Reductions that reached their root callback").unwrap();
    pub static ref RDMA_GETS_SERVED: IntCounter =
        IntCounter::new("rt_rdma_gets_served_total", "RDMA get requests served by a handle's home node").unwrap();
    pub static ref RDMA_PUTS_SERVED: IntCounter =
        IntCounter::new("rt_rdma_puts_served_total", "RDMA put requests absorbed by a handle's home node").unwrap();
    pub static ref LOCATION_CACHE_HITS: IntCounter =
        IntCounter::new("rt_location_cache_hits_total", "Location resolutions served from the local cache").unwrap();
    pub static ref LOCATION_CACHE_MISSES: IntCounter =
        IntCounter::new("rt_location_cache_misses_total", "Location resolutions requiring a lookup round trip").unwrap();
    pub static ref MIGRATIONS: IntCounter =
        IntCounter::new("rt_migrations_total", "Entities migrated between nodes").unwrap();
    pub static ref SUBSYSTEM_ERRORS: IntCounter =
        IntCounter::new("rt_subsystem_errors_total", "Fatal errors surfaced by any manager").unwrap();
}

/// Holds the registry the counters above are bound to; dropping it does
/// not unregister them (process-lifetime singletons).
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Register every counter above with a fresh [`Registry`] and return a
/// handle. Call once per process.
///
/// # Errors
///
/// Returns [`TelemetryError::MetricsInit`] if a counter is already bound to
/// another registry (should not happen outside of tests that call this
/// more than once).
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let registry = Registry::new();
    let counters: [&IntCounter; 11] = [
        &EPOCHS_OPENED,
        &EPOCHS_TERMINATED,
        &MESSAGES_SENT,
        &MESSAGES_DISPATCHED,
        &BROADCASTS_SENT,
        &REDUCTIONS_COMPLETED,
        &RDMA_GETS_SERVED,
        &RDMA_PUTS_SERVED,
        &LOCATION_CACHE_HITS,
        &LOCATION_CACHE_MISSES,
        &MIGRATIONS,
    ];
    for counter in counters {
        registry
            .register(Box::new(counter.clone()))
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(MetricsHandle { registry })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let before = MESSAGES_SENT.get();
        MESSAGES_SENT.inc();
        assert_eq!(MESSAGES_SENT.get(), before + 1);
    }
}
