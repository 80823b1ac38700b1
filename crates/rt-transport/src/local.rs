//! An in-process reference [`Transport`] simulating `N` nodes as peer
//! handles sharing one [`LocalCluster`] within a single OS process. Each
//! node's inbox is a plain mutex-guarded queue rather than a real NIC queue;
//! sends are synchronous and always "complete" immediately, which is
//! sufficient for single-process tests and demos — a single-process
//! stand-in for a real interconnect.

use crate::{BarrierHandle, LockMode, SendHandle, Transport, TransportError, WindowHandle};
use rt_types::{NodeId, NumNodes, Tag};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

struct Inbox {
    queue: Mutex<VecDeque<(NodeId, Tag, Vec<u8>)>>,
}

impl Inbox {
    fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()) }
    }
}

struct Windows {
    slices: Mutex<HashMap<(u64, NodeId), Arc<RwLock<Vec<u8>>>>>,
    next_id: AtomicU64,
}

/// Shared state behind every [`LocalTransport`] handle in the same
/// simulated job. Construct one with [`LocalCluster::new`] and hand each
/// node its own [`LocalTransport`] via [`LocalCluster::transport_for`].
pub struct LocalCluster {
    num_nodes: NumNodes,
    inboxes: Vec<Inbox>,
    windows: Windows,
    barrier_arrived: AtomicUsize,
    barrier_generation: AtomicU64,
}

impl LocalCluster {
    #[must_use]
    pub fn new(num_nodes: u32) -> Arc<Self> {
        let inboxes = (0..num_nodes).map(|_| Inbox::new()).collect();
        Arc::new(Self {
            num_nodes: NumNodes(num_nodes),
            inboxes,
            windows: Windows { slices: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) },
            barrier_arrived: AtomicUsize::new(0),
            barrier_generation: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn transport_for(self: &Arc<Self>, node: NodeId) -> LocalTransport {
        LocalTransport { this_node: node, cluster: Arc::clone(self) }
    }
}

/// One node's handle onto a [`LocalCluster`].
pub struct LocalTransport {
    this_node: NodeId,
    cluster: Arc<LocalCluster>,
}

impl Transport for LocalTransport {
    fn this_node(&self) -> NodeId {
        self.this_node
    }

    fn num_nodes(&self) -> NumNodes {
        self.cluster.num_nodes
    }

    fn post_send(&self, to: NodeId, tag: Tag, bytes: Vec<u8>) -> Result<SendHandle, TransportError> {
        let idx = to.as_u32() as usize;
        let inbox = self.cluster.inboxes.get(idx).ok_or(TransportError::UnknownNode(to))?;
        inbox.queue.lock().unwrap().push_back((self.this_node, tag, bytes));
        Ok(SendHandle(0))
    }

    fn send_completed(&self, _handle: SendHandle) -> bool {
        // Sends land synchronously into the destination inbox above; there
        // is nothing left to poll for in the local backend.
        true
    }

    fn probe(&self) -> bool {
        let idx = self.this_node.as_u32() as usize;
        !self.cluster.inboxes[idx].queue.lock().unwrap().is_empty()
    }

    fn try_recv(&self) -> Option<(NodeId, Tag, Vec<u8>)> {
        let idx = self.this_node.as_u32() as usize;
        self.cluster.inboxes[idx].queue.lock().unwrap().pop_front()
    }

    fn barrier_start(&self) -> BarrierHandle {
        let generation = self.cluster.barrier_generation.load(Ordering::SeqCst);
        let arrived = self.cluster.barrier_arrived.fetch_add(1, Ordering::SeqCst) + 1;
        if arrived == self.cluster.num_nodes.get() as usize {
            self.cluster.barrier_arrived.store(0, Ordering::SeqCst);
            self.cluster.barrier_generation.fetch_add(1, Ordering::SeqCst);
        }
        BarrierHandle(generation)
    }

    fn barrier_poll(&self, handle: &BarrierHandle) -> bool {
        self.cluster.barrier_generation.load(Ordering::SeqCst) > handle.0
    }

    fn window_register(&self, bytes: usize) -> WindowHandle {
        let id = self.cluster.windows.next_id.fetch_add(1, Ordering::SeqCst);
        self.cluster
            .windows
            .slices
            .lock()
            .unwrap()
            .insert((id, self.this_node), Arc::new(RwLock::new(vec![0u8; bytes])));
        WindowHandle { id, collective: false }
    }

    fn window_register_collective(&self, id: u64, local_bytes: usize) -> WindowHandle {
        self.cluster
            .windows
            .slices
            .lock()
            .unwrap()
            .insert((id, self.this_node), Arc::new(RwLock::new(vec![0u8; local_bytes])));
        WindowHandle { id, collective: true }
    }

    fn window_lock(&self, _window: WindowHandle, _target: NodeId, _mode: LockMode) {
        // The local backend serializes all window access through the
        // slice's own RwLock at get/put time; a separate lock step is a
        // protocol formality here, kept for interface parity with a real
        // passive-target MPI window.
    }

    fn window_unlock(&self, _window: WindowHandle, _target: NodeId) {}

    fn window_flush(&self, _window: WindowHandle, _target: NodeId) {}

    fn window_get(&self, window: WindowHandle, target: NodeId, offset: usize, len: usize) -> Result<Vec<u8>, TransportError> {
        let slice = self.slice(window, target)?;
        let guard = slice.read().unwrap();
        Ok(guard[offset..offset + len].to_vec())
    }

    fn window_put(&self, window: WindowHandle, target: NodeId, offset: usize, data: &[u8]) -> Result<(), TransportError> {
        let slice = self.slice(window, target)?;
        let mut guard = slice.write().unwrap();
        guard[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl LocalTransport {
    fn slice(&self, window: WindowHandle, target: NodeId) -> Result<Arc<RwLock<Vec<u8>>>, TransportError> {
        self.cluster
            .windows
            .slices
            .lock()
            .unwrap()
            .get(&(window.id, target))
            .cloned()
            .ok_or(TransportError::UnknownWindow(window.id))
    }
}
