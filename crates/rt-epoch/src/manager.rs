//! The epoch manager and termination detector: owns both
//! per-epoch state machines (four-counter wave for collective epochs,
//! Dijkstra-Scholten credit accounting for rooted epochs), the ambient
//! push/pop stack delegated to [`rt_engine::Engine`], dependency/nesting
//! bookkeeping, and continuations. Registered with the engine as its
//! [`rt_engine::EpochAccounting`] implementation at process wiring time
//! (see Design Notes on the `rt-engine`/`rt-epoch` seam).

use crate::ds_state::DsState;
use crate::errors::EpochError;
use crate::messages::{DsAck, WaveContinue, WaveSubmit, WaveTerminated};
use crate::wave_state::WaveState;
use rt_engine::{Engine, EpochAccounting};
use rt_types::{children, default_root, parent, EpochCategory, EpochId, HandlerId, NodeId, Payload, RegistryKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Continuation = Box<dyn FnOnce() + Send>;

/// Per-node epoch manager. One instance per [`Engine`], wired in as its
/// [`EpochAccounting`] implementation.
pub struct EpochManager {
    engine: Arc<Engine>,
    peers: Mutex<Vec<Arc<EpochManager>>>,
    wave_states: Mutex<HashMap<EpochId, WaveState>>,
    ds_states: Mutex<HashMap<EpochId, DsState>>,
    continuations: Mutex<HashMap<EpochId, Vec<Continuation>>>,
    dependencies: Mutex<HashMap<EpochId, Vec<EpochId>>>,
    next_collective_seq: AtomicU64,
    next_rooted_seq: AtomicU64,
    wave_submit_handler: HandlerId,
    wave_continue_handler: HandlerId,
    wave_terminated_handler: HandlerId,
    ds_ack_handler: HandlerId,
}

impl EpochManager {
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<EpochManager>| {
            let mut registry = engine.registry().lock().unwrap();

            let w = weak.clone();
            let wave_submit_handler = registry.register(
                RegistryKind::Plain,
                "rt_epoch::wave_submit",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], from: NodeId| {
                    let msg = WaveSubmit::unpack(bytes).expect("wave submit decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_wave_submit(msg, from);
                    }
                }),
            );

            let w = weak.clone();
            let wave_continue_handler = registry.register(
                RegistryKind::Plain,
                "rt_epoch::wave_continue",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = WaveContinue::unpack(bytes).expect("wave continue decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_wave_continue(msg);
                    }
                }),
            );

            let w = weak.clone();
            let wave_terminated_handler = registry.register(
                RegistryKind::Plain,
                "rt_epoch::wave_terminated",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = WaveTerminated::unpack(bytes).expect("wave terminated decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_wave_terminated(msg);
                    }
                }),
            );

            let w = weak.clone();
            let ds_ack_handler = registry.register(
                RegistryKind::Plain,
                "rt_epoch::ds_ack",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = DsAck::unpack(bytes).expect("ds ack decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_ds_ack(msg);
                    }
                }),
            );
            drop(registry);

            Self {
                engine,
                peers: Mutex::new(Vec::new()),
                wave_states: Mutex::new(HashMap::new()),
                ds_states: Mutex::new(HashMap::new()),
                continuations: Mutex::new(HashMap::new()),
                dependencies: Mutex::new(HashMap::new()),
                next_collective_seq: AtomicU64::new(0),
                next_rooted_seq: AtomicU64::new(0),
                wave_submit_handler,
                wave_continue_handler,
                wave_terminated_handler,
                ds_ack_handler,
            }
        })
    }

    /// Register the other nodes' epoch managers sharing this simulated
    /// job, so this node's wait loop can cooperatively pump their
    /// schedulers between ticks. A real deployment runs one node per
    /// process, each independently driving its own `Engine`, so peers
    /// stays empty there; single-process multi-node simulations
    /// (`rt_transport::local::LocalCluster`) have nothing else advancing
    /// the other nodes' engines and must call this.
    pub fn set_peers(&self, peers: Vec<Arc<EpochManager>>) {
        *self.peers.lock().unwrap() = peers;
    }

    /// Tick and pump this node's scheduler, plus every registered peer's,
    /// one round at a time until `terminated` holds. Four-counter waves
    /// and Dijkstra-Scholten acks are otherwise driven by handlers that
    /// fire as messages are dispatched, but a leaf's first submission and
    /// idleness sampling both require an explicit `tick()` per node
    ///, so every participant needs its own tick, not
    /// just the caller's.
    fn drive_until(&self, mut terminated: impl FnMut() -> bool) {
        while !terminated() {
            self.tick();
            self.engine.run_scheduler();
            for peer in self.peers.lock().unwrap().iter() {
                peer.tick();
                peer.engine.run_scheduler();
            }
        }
    }

    fn subtree_children_count(&self) -> u32 {
        children(self.engine.this_node(), default_root(), self.engine.num_nodes()).len() as u32
    }

    fn is_root(&self) -> bool {
        parent(self.engine.this_node(), default_root(), self.engine.num_nodes()).is_none()
    }

    // ---- construction ----------------------------------------------------

    /// Construct a collective epoch. Every node must call this in the same
    /// relative order — the sequence number is derived purely from symmetric call
    /// order rather than a wire handshake.
    fn construct_collective(&self) -> EpochId {
        let sequence = self.next_collective_seq.fetch_add(1, Ordering::SeqCst);
        let epoch = EpochId::collective(sequence);
        let state = WaveState::new(self.subtree_children_count(), false);
        self.wave_states.lock().unwrap().insert(epoch, state);
        rt_telemetry::EPOCHS_OPENED.inc();
        epoch
    }

    /// Construct a rooted epoch with this node as home.
    pub fn construct_rooted(&self) -> EpochId {
        let sequence = self.next_rooted_seq.fetch_add(1, Ordering::SeqCst);
        let epoch = EpochId::rooted(self.engine.this_node(), sequence);
        self.ds_states.lock().unwrap().insert(epoch, DsState::new(true));
        rt_telemetry::EPOCHS_OPENED.inc();
        epoch
    }

    fn ensure_wave_state(&self, epoch: EpochId) {
        self.wave_states
            .lock()
            .unwrap()
            .entry(epoch)
            .or_insert_with(|| WaveState::new(self.subtree_children_count(), true));
    }

    fn ensure_ds_state(&self, epoch: EpochId) {
        let is_home = epoch.home_node() == self.engine.this_node();
        self.ds_states.lock().unwrap().entry(epoch).or_insert_with(|| DsState::new(is_home));
    }

    // ---- public scoping helpers -------------------------------------------

    /// Run `work` under a freshly constructed collective epoch and block
    /// until every node has detected its termination.
    pub fn run_in_epoch_collective(self: &Arc<Self>, work: impl FnOnce()) -> EpochId {
        let epoch = self.construct_collective();
        self.engine.push_epoch(epoch);
        work();
        self.engine.pop_epoch();
        {
            let mut states = self.wave_states.lock().unwrap();
            states.get_mut(&epoch).expect("just constructed").notify_locally_ready();
        }
        self.try_submit(epoch);
        self.drive_until(|| self.is_terminated(epoch));
        epoch
    }

    /// Run `work` under a freshly constructed rooted epoch (this node is
    /// home) and block until this node has detected its own termination.
    pub fn run_in_epoch_rooted(self: &Arc<Self>, work: impl FnOnce()) -> EpochId {
        let epoch = self.construct_rooted();
        self.engine.push_epoch(epoch);
        work();
        self.engine.pop_epoch();
        self.drive_until(|| self.is_terminated(epoch));
        epoch
    }

    #[must_use]
    pub fn is_terminated(&self, epoch: EpochId) -> bool {
        match epoch.category() {
            EpochCategory::FourCounterWave => {
                self.wave_states.lock().unwrap().get(&epoch).is_some_and(WaveState::is_terminated)
            }
            EpochCategory::DijkstraScholten => {
                self.ds_states.lock().unwrap().get(&epoch).is_some_and(DsState::is_terminated)
            }
        }
    }

    /// Multiple continuations on the same epoch are invoked in
    /// registration order.
    ///
    /// # Errors
    ///
    /// Returns [`EpochError::AlreadyTerminated`] if the epoch already
    /// finished; the continuation would never fire.
    pub fn add_action(&self, epoch: EpochId, action: impl FnOnce() + Send + 'static) -> Result<(), EpochError> {
        if self.is_terminated(epoch) {
            return Err(EpochError::AlreadyTerminated(epoch));
        }
        self.continuations.lock().unwrap().entry(epoch).or_default().push(Box::new(action));
        Ok(())
    }

    /// A dependent epoch is not closed until its predecessor is
    /// terminated.
    pub fn add_dependency(&self, epoch: EpochId, prerequisite: EpochId) {
        self.dependencies.lock().unwrap().entry(epoch).or_default().push(prerequisite);
    }

    fn dependencies_satisfied(&self, epoch: EpochId) -> bool {
        let deps = self.dependencies.lock().unwrap();
        match deps.get(&epoch) {
            None => true,
            Some(prereqs) => prereqs.iter().all(|&p| self.is_terminated(p)),
        }
    }

    fn run_continuations(&self, epoch: EpochId) {
        let fns = self.continuations.lock().unwrap().remove(&epoch);
        if let Some(fns) = fns {
            for f in fns {
                f();
            }
        }
    }

    // ---- four-counter wave protocol ---------------------------------------

    fn try_submit(&self, epoch: EpochId) {
        let (psum, csum) = {
            let mut states = self.wave_states.lock().unwrap();
            let Some(state) = states.get_mut(&epoch) else { return };
            if !state.ready_submit_parent(true) {
                return;
            }
            state.submit_to_parent(false)
        };

        if self.is_root() {
            self.handle_root_wave(epoch, psum, csum);
        } else {
            let p = parent(self.engine.this_node(), default_root(), self.engine.num_nodes())
                .expect("non-root always has a parent");
            self.engine.send(p, self.wave_submit_handler, &WaveSubmit { epoch, producer: psum, consumer: csum });
        }
    }

    fn handle_root_wave(&self, epoch: EpochId, producer: u64, consumer: u64) {
        let balanced = {
            let mut states = self.wave_states.lock().unwrap();
            let state = states.get_mut(&epoch).expect("root state exists");
            state.record_root_wave(producer, consumer)
        };

        if balanced && self.dependencies_satisfied(epoch) {
            self.declare_wave_terminated(epoch);
        } else {
            let next_wave = {
                let mut states = self.wave_states.lock().unwrap();
                let state = states.get_mut(&epoch).expect("root state exists");
                let next_wave = state.wave_number + 1;
                state.receive_continue_signal(next_wave);
                state.notify_locally_ready();
                next_wave
            };
            let kids = children(self.engine.this_node(), default_root(), self.engine.num_nodes());
            if !kids.is_empty() {
                self.engine.multicast(&kids, self.wave_continue_handler, &WaveContinue { epoch, wave: next_wave }, None);
            }
        }
    }

    fn declare_wave_terminated(&self, epoch: EpochId) {
        {
            let mut states = self.wave_states.lock().unwrap();
            states.get_mut(&epoch).expect("root state exists").set_terminated();
        }
        rt_telemetry::EPOCHS_TERMINATED.inc();
        self.run_continuations(epoch);
        let kids = children(self.engine.this_node(), default_root(), self.engine.num_nodes());
        if !kids.is_empty() {
            self.engine.multicast(&kids, self.wave_terminated_handler, &WaveTerminated { epoch }, None);
        }
    }

    fn on_wave_submit(&self, msg: WaveSubmit, _from: NodeId) {
        self.ensure_wave_state(msg.epoch);
        {
            let mut states = self.wave_states.lock().unwrap();
            states.get_mut(&msg.epoch).expect("just ensured").notify_child_receive(msg.producer, msg.consumer);
        }
        self.try_submit(msg.epoch);
    }

    fn on_wave_continue(&self, msg: WaveContinue) {
        self.ensure_wave_state(msg.epoch);
        {
            let mut states = self.wave_states.lock().unwrap();
            let state = states.get_mut(&msg.epoch).expect("just ensured");
            state.receive_continue_signal(msg.wave);
        }
        let kids = children(self.engine.this_node(), default_root(), self.engine.num_nodes());
        if !kids.is_empty() {
            self.engine.multicast(&kids, self.wave_continue_handler, &msg, None);
        }
        self.try_submit(msg.epoch);
    }

    fn on_wave_terminated(&self, msg: WaveTerminated) {
        let already = {
            let mut states = self.wave_states.lock().unwrap();
            let state = states.entry(msg.epoch).or_insert_with(|| WaveState::new(self.subtree_children_count(), true));
            let already = state.is_terminated();
            state.set_terminated();
            already
        };
        if already {
            return;
        }
        rt_telemetry::EPOCHS_TERMINATED.inc();
        self.run_continuations(msg.epoch);
        let kids = children(self.engine.this_node(), default_root(), self.engine.num_nodes());
        if !kids.is_empty() {
            self.engine.multicast(&kids, self.wave_terminated_handler, &msg, None);
        }
    }

    // ---- Dijkstra-Scholten protocol ---------------------------------------

    fn on_ds_ack(&self, msg: DsAck) {
        self.ensure_ds_state(msg.epoch);
        let mut states = self.ds_states.lock().unwrap();
        states.get_mut(&msg.epoch).expect("just ensured").on_ack_received();
    }

    /// Re-evaluate every open epoch: attempt pending wave submissions, and
    /// sample this node's idleness as the Dijkstra-Scholten local-activity
    /// signal, acknowledging or declaring termination as states settle.
    /// Called from inside [`Self::run_in_epoch_collective`]/
    /// [`Self::run_in_epoch_rooted`]'s wait loop; also safe to call
    /// opportunistically from `rt-runtime`'s own scheduler loop.
    pub fn tick(&self) {
        let epochs: Vec<EpochId> = self.wave_states.lock().unwrap().keys().copied().collect();
        for epoch in epochs {
            self.try_submit(epoch);
        }

        let idle = self.engine.is_idle();
        let mut to_ack = Vec::new();
        let mut newly_terminated = Vec::new();
        {
            let mut states = self.ds_states.lock().unwrap();
            for (&epoch, state) in states.iter_mut() {
                state.set_locally_active(!idle);
                if let Some(engager) = state.should_ack_engager() {
                    state.mark_acked_upward();
                    to_ack.push((epoch, engager));
                }
                if state.is_home() && !state.is_terminated() && state.is_quiescent() {
                    state.set_terminated();
                    newly_terminated.push(epoch);
                }
            }
        }
        for (epoch, engager) in to_ack {
            self.engine.send(engager, self.ds_ack_handler, &DsAck { epoch });
        }
        for epoch in newly_terminated {
            rt_telemetry::EPOCHS_TERMINATED.inc();
            self.run_continuations(epoch);
        }
    }
}

impl EpochAccounting for EpochManager {
    fn record_produced(&self, epoch: EpochId) {
        match epoch.category() {
            EpochCategory::FourCounterWave => {
                self.ensure_wave_state(epoch);
                self.wave_states.lock().unwrap().get_mut(&epoch).unwrap().local_producer += 1;
            }
            EpochCategory::DijkstraScholten => {
                self.ensure_ds_state(epoch);
                self.ds_states.lock().unwrap().get_mut(&epoch).unwrap().on_send();
            }
        }
    }

    fn record_consumed(&self, epoch: EpochId, from: NodeId) {
        match epoch.category() {
            EpochCategory::FourCounterWave => {
                self.ensure_wave_state(epoch);
                self.wave_states.lock().unwrap().get_mut(&epoch).unwrap().local_consumer += 1;
            }
            EpochCategory::DijkstraScholten => {
                self.ensure_ds_state(epoch);
                self.ds_states.lock().unwrap().get_mut(&epoch).unwrap().on_receive_activation(from);
            }
        }
    }
}
