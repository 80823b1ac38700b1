//! # rt-runtime
//!
//! The node process: wires the
//! engine, epoch manager, location manager, reduction manager, and RDMA
//! manager together behind one [`config::RuntimeConfig`], owns the
//! `vt_debug_*` flag set, and exposes [`wiring::initialize`]/
//! [`wiring::Runtime::finalize`] as the process's entry and exit points.
//! A `container` module (config + subsystem container) pairs with a
//! `wiring` module (initialization ordering), plus a thin `main.rs`.

pub mod config;
pub mod container;
pub mod wiring;

pub use config::{DebugFlags, EngineConfig, EpochConfig, LocationConfig, RuntimeConfig};
pub use container::RuntimeContainer;
pub use wiring::{initialize, Runtime};

use thiserror::Error;

/// Errors that can prevent a node from standing up.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Telemetry(#[from] rt_telemetry::TelemetryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_transport::local::LocalCluster;
    use std::sync::Arc;

    #[test]
    fn initialize_wires_every_manager_and_finalize_releases_the_barrier() {
        // A single-node cluster clears its own barrier immediately
        // (`arrived == num_nodes` on the first `barrier_start`), so
        // `finalize` here only exercises that `initialize` wired a
        // working transport/engine pair — see `rt-tests` for a
        // multi-node finalize rendezvous.
        let cluster = LocalCluster::new(1);
        let t0 = Arc::new(cluster.transport_for(rt_types::NodeId::new(0)));

        let rt0 = initialize(t0, RuntimeConfig::default()).unwrap();
        assert_eq!(rt0.container.engine.num_nodes().get(), 1);
        rt0.finalize();
    }
}
