//! The scheduler: a single-threaded, re-entrant run loop
//! with no thread pool and no preemption. `Engine` also hosts the message
//! engine (`message_engine.rs`) since both share the same ready queue,
//! ambient-epoch stack, and transport handle — naturally one crate's
//! worth of responsibility.

use crate::accounting::EpochAccounting;
use crate::registry::HandlerRegistry;
use rt_transport::Transport;
use rt_types::{EpochId, Envelope, NodeId, NumNodes, NO_EPOCH};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// A received, decoded active message waiting to be dispatched.
pub struct WorkUnit {
    pub envelope: Envelope,
    pub payload: Vec<u8>,
    pub from_node: NodeId,
}

/// Default bound on how many ready work units a single [`Engine::run_scheduler`]
/// iteration drains, so one subsystem's backlog can't starve the rest.
pub const DEFAULT_DRAIN_BATCH: usize = 16;

pub(crate) type ContinuationFn = Box<dyn FnOnce() + Send>;

/// The node process's scheduler and message engine, shared across every
/// manager via `Arc<Engine>` — the "single runtime context pointer"
/// Design Notes calls for, rather than a process-wide global.
pub struct Engine {
    this_node: NodeId,
    num_nodes: NumNodes,
    transport: Arc<dyn Transport>,
    registry: Mutex<HandlerRegistry>,
    ready: Mutex<VecDeque<WorkUnit>>,
    epoch_stack: Mutex<Vec<EpochId>>,
    depth: AtomicUsize,
    drain_batch: usize,
    accounting: OnceLock<Arc<dyn EpochAccounting>>,
    next_event: AtomicU64,
    completed_events: Mutex<HashSet<u64>>,
    continuations: Mutex<HashMap<u64, Vec<ContinuationFn>>>,
}

impl Engine {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::with_drain_batch(transport, DEFAULT_DRAIN_BATCH)
    }

    #[must_use]
    pub fn with_drain_batch(transport: Arc<dyn Transport>, drain_batch: usize) -> Arc<Self> {
        let this_node = transport.this_node();
        let num_nodes = transport.num_nodes();
        Arc::new(Self {
            this_node,
            num_nodes,
            transport,
            registry: Mutex::new(HandlerRegistry::new()),
            ready: Mutex::new(VecDeque::new()),
            epoch_stack: Mutex::new(Vec::new()),
            depth: AtomicUsize::new(0),
            drain_batch,
            accounting: OnceLock::new(),
            next_event: AtomicU64::new(1),
            completed_events: Mutex::new(HashSet::new()),
            continuations: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn this_node(&self) -> NodeId {
        self.this_node
    }

    #[must_use]
    pub fn num_nodes(&self) -> NumNodes {
        self.num_nodes
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn registry(&self) -> &Mutex<HandlerRegistry> {
        &self.registry
    }

    /// Bind the epoch manager's accounting hooks. Called once during
    /// process wiring, after both `Engine` and the epoch manager exist
    /// (breaks what would otherwise be a circular constructor dependency).
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn set_accounting(&self, accounting: Arc<dyn EpochAccounting>) {
        self.accounting
            .set(accounting)
            .unwrap_or_else(|_| panic!("epoch accounting already bound"));
    }

    fn accounting(&self) -> &Arc<dyn EpochAccounting> {
        self.accounting.get().expect("epoch accounting not yet bound; call set_accounting during wiring")
    }

    /// The epoch currently in scope for outgoing sends: the top of the
    /// push/pop stack threaded through nested `run_in_epoch_*` scopes, or
    /// `no_epoch` at depth zero.
    #[must_use]
    pub fn ambient_epoch(&self) -> EpochId {
        self.epoch_stack.lock().unwrap().last().copied().unwrap_or(NO_EPOCH)
    }

    /// Push `epoch` as the new ambient scope. Paired with [`Self::pop_epoch`].
    pub fn push_epoch(&self, epoch: EpochId) {
        self.epoch_stack.lock().unwrap().push(epoch);
    }

    /// Pop the most recently pushed ambient epoch.
    ///
    /// # Panics
    ///
    /// Panics on an unbalanced pop (programming error: every `push_epoch`
    /// must be paired with exactly one `pop_epoch`).
    pub fn pop_epoch(&self) -> EpochId {
        self.epoch_stack
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| panic!("pop_epoch called with no epoch pushed"))
    }

    /// Current re-entry depth: incremented for the duration of every
    /// `run_scheduler`/`run_until` call, including nested ones triggered
    /// from within a running handler.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Enqueue a decoded message for later dispatch.
    pub(crate) fn push_ready(&self, unit: WorkUnit) {
        self.ready.lock().unwrap().push_back(unit);
    }

    pub(crate) fn alloc_event(&self) -> u64 {
        self.next_event.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn mark_event_completed(&self, event: u64) {
        self.completed_events.lock().unwrap().insert(event);
        let fns = self.continuations.lock().unwrap().remove(&event);
        if let Some(fns) = fns {
            for f in fns {
                f();
            }
        }
    }

    /// Run `f` once the send/receive identified by `event` completes. If it
    /// has already completed, `f` runs immediately.
    pub fn post_continuation(&self, event: u64, f: ContinuationFn) {
        if self.completed_events.lock().unwrap().contains(&event) {
            f();
            return;
        }
        self.continuations.lock().unwrap().entry(event).or_default().push(f);
    }

    /// One scheduler iteration: progress the transport
    /// once, then drain up to `drain_batch` ready work units.
    pub fn run_scheduler(&self) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.progress_transport();
        self.drain_ready();
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }

    fn progress_transport(&self) {
        if let Some((from_node, _tag, bytes)) = self.transport.try_recv() {
            match crate::message_engine::decode_wire_message(&bytes) {
                Ok((envelope, payload)) => {
                    self.push_ready(WorkUnit { envelope, payload, from_node });
                }
                Err(e) => panic!("failed to decode active message from {from_node}: {e}"),
            }
        }
    }

    fn drain_ready(&self) {
        for _ in 0..self.drain_batch {
            let unit = {
                let mut ready = self.ready.lock().unwrap();
                match ready.pop_front() {
                    Some(u) => u,
                    None => break,
                }
            };
            self.dispatch_unit(unit);
        }
    }

    fn dispatch_unit(&self, unit: WorkUnit) {
        let tracked = unit.envelope.is_epoch_tracked();
        if tracked {
            self.accounting().record_consumed(unit.envelope.epoch, unit.from_node);
            self.push_epoch(unit.envelope.epoch);
        }
        rt_telemetry::MESSAGES_DISPATCHED.inc();
        if let Some(root) = unit.envelope.bcast_root {
            self.broadcast_hop(root, unit.envelope.handler, &unit.payload);
        }
        self.registry.lock().unwrap().dispatch(unit.envelope.handler, &unit.payload, unit.from_node);
        if tracked {
            self.pop_epoch();
        }
    }

    /// Run the scheduler until `predicate` holds or the process looks
    /// terminated (no ready work, transport idle, at depth 0).
    pub fn run_until(&self, mut predicate: impl FnMut(&Self) -> bool) {
        while !predicate(self) {
            self.run_scheduler();
        }
    }

    /// Idle iff depth 0, empty local queue, and no outstanding transport
    /// work.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.depth() == 0 && self.ready.lock().unwrap().is_empty() && !self.transport.probe()
    }
}
