//! The per-node subsystem container: one struct holding an `Arc` to
//! every manager a node owns, built once at startup and handed to
//! application code. Every manager crate here
//! is already its own `Arc`-shared, interior-mutable type wired through
//! `Arc::new_cyclic`, so the container just holds the handles — there is
//! no separate running/not-running state to track, since a manager is
//! live the moment its handlers are registered on the engine.
//!
//! `CollectionManager<T, M, F>` is deliberately absent: it is generic
//! over the application's element and message types, so application code
//! constructs its own collections against the managers this container
//! exposes rather than the container owning one itself.

use std::sync::Arc;

use rt_engine::Engine;
use rt_epoch::EpochManager;
use rt_location::LocationManager;
use rt_rdma::RdmaManager;
use rt_reduce::ReductionManager;
use rt_transport::Transport;

use crate::config::RuntimeConfig;

/// Every manager a node owns, wired together in dependency order.
pub struct RuntimeContainer {
    pub config: RuntimeConfig,
    pub engine: Arc<Engine>,
    pub epoch: Arc<EpochManager>,
    pub location: Arc<LocationManager>,
    pub reduce: Arc<ReductionManager>,
    pub rdma: Arc<RdmaManager>,
}

impl RuntimeContainer {
    /// Build the container for one node over the given transport.
    /// Mirrors `SubsystemRegistry::initialize_all`'s dependency-ordered
    /// phases, but synchronously: every manager's constructor fully wires
    /// its handlers before returning, so there is no separate "start"
    /// step.
    ///
    /// # Panics
    ///
    /// Panics if `config` fails [`RuntimeConfig::validate_for_production`].
    pub fn build(transport: Arc<dyn Transport>, config: RuntimeConfig) -> Arc<Self> {
        config.validate_for_production();

        tracing::info!("phase 1: engine (no dependencies)");
        let engine = Engine::with_drain_batch(transport, config.engine.drain_batch);

        tracing::info!("phase 2: epoch manager (depends on engine)");
        let epoch = EpochManager::new(Arc::clone(&engine));
        engine.set_accounting(epoch.clone());

        tracing::info!("phase 3: location, reduce, rdma (depend on engine + epoch accounting)");
        let hop_cap = config.location.resolve_hop_cap(engine.num_nodes());
        let location = LocationManager::new(Arc::clone(&engine), hop_cap);
        let reduce = ReductionManager::new(Arc::clone(&engine));
        let rdma = RdmaManager::new(Arc::clone(&engine));

        Arc::new(Self {
            config,
            engine,
            epoch,
            location,
            reduce,
            rdma,
        })
    }
}
