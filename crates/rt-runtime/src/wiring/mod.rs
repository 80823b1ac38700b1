//! `initialize`/`finalize` entry points: a thin
//! layer above [`crate::container::RuntimeContainer`] that owns telemetry
//! setup/teardown and the top-level barrier a node's peers rendezvous on
//! before tearing down.

use std::sync::Arc;

use rt_transport::Transport;

use crate::config::RuntimeConfig;
use crate::container::RuntimeContainer;
use crate::RuntimeError;

/// A running node: its container plus the telemetry guard that must
/// outlive it.
pub struct Runtime {
    pub container: Arc<RuntimeContainer>,
    _telemetry: rt_telemetry::TelemetryGuard,
}

/// Bring up one node: install telemetry, then wire the managers.
///
/// # Errors
///
/// Returns [`RuntimeError::Telemetry`] if metrics registration or
/// subscriber installation fails.
///
/// # Panics
///
/// Panics if `config` fails [`RuntimeConfig::validate_for_production`]
/// (propagated from [`RuntimeContainer::build`]).
pub fn initialize(transport: Arc<dyn Transport>, config: RuntimeConfig) -> Result<Runtime, RuntimeError> {
    let telemetry = rt_telemetry::init_telemetry(config.telemetry.clone())?;
    tracing::info!(node = ?transport.this_node(), "initializing node");
    let container = RuntimeContainer::build(transport, config);
    Ok(Runtime {
        container,
        _telemetry: telemetry,
    })
}

/// Tear down a node: block until every other node has entered
/// `finalize` too, the same "don't let one node race ahead and drop its
/// transport" guarantee collective epochs rely on.
impl Runtime {
    pub fn finalize(self) {
        tracing::info!("finalizing node");
        let handle = self.container.engine.transport().barrier_start();
        self.container
            .engine
            .run_until(|_| self.container.engine.transport().barrier_poll(&handle));
    }
}
