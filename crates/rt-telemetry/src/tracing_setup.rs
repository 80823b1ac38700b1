//! Span-lifetime guard and timing helpers: a guard type held for the
//! process lifetime plus a small helper for timing handler dispatch,
//! since no trace exporter ships — tracing backends are out of scope.

use std::time::Instant;

/// Held for the lifetime of the process; dropping it is currently a no-op
/// but keeps `rt_telemetry::init_telemetry`'s guard composition symmetric
/// with its `_tracing: TracingGuard` field.
pub struct TracingGuard;

/// Initialize the tracing half of the telemetry stack. Logging
/// (subscriber installation) happens in [`crate::logging::init_logging`];
/// this step exists so a future trace exporter can be slotted in here
/// without moving call sites.
pub fn init_tracing() -> TracingGuard {
    TracingGuard
}

/// Times a handler dispatch and records it as a `tracing` event on drop:
/// a per-handler trace event without a full event-log backend.
pub struct DispatchTimer {
    handler_name: &'static str,
    started: Instant,
}

impl DispatchTimer {
    #[must_use]
    pub fn start(handler_name: &'static str) -> Self {
        Self { handler_name, started: Instant::now() }
    }
}

impl Drop for DispatchTimer {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        tracing::trace!(handler = self.handler_name, micros = elapsed.as_micros(), "handler dispatched");
    }
}
