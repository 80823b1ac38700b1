//! The RDMA manager: message-based get/put against a
//! registered handle. One instance per node, registered the same way
//! every other manager wires its handlers — [`Arc::new_cyclic`] so the
//! thunks can hold a [`Weak`] back to `self` without a reference cycle
//! through [`Engine`]'s registry (mirrors
//! `rt_reduce::ReductionManager::new`).

use crate::errors::RdmaError;
use crate::wire::{split_sized, GetReplyHeader, GetRequest, PutAck, PutRequestHeader};
use rt_engine::Engine;
use rt_types::{HandlerId, NodeId, Payload, RdmaHandle, RdmaHandleFields, RdmaOpType, RegistryKind, Tag};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type GetCallback = Box<dyn Fn(usize, usize, Tag) -> Vec<u8> + Send + Sync>;
type PutCallback = Box<dyn Fn(&[u8], usize, Tag) + Send + Sync>;
type GetContinuation = Box<dyn FnOnce(Vec<u8>) + Send>;
type PutContinuation = Box<dyn FnOnce() + Send>;

/// Per-node RDMA manager. Holds every region registered at this node
/// (home-side storage for non-collective handles, this node's own
/// slice for collective ones), the optional get/put callbacks
/// associated with a handle, and the in-flight request table keyed by
/// wire [`Tag`].
pub struct RdmaManager {
    pub(crate) engine: Arc<Engine>,
    next_identifier: AtomicU64,
    next_collective_identifier: AtomicU64,
    regions: Mutex<HashMap<RdmaHandle, Arc<Mutex<Vec<u8>>>>>,
    get_callbacks: Mutex<HashMap<RdmaHandle, GetCallback>>,
    put_callbacks: Mutex<HashMap<RdmaHandle, PutCallback>>,
    next_tag: AtomicU64,
    pending_gets: Mutex<HashMap<Tag, GetContinuation>>,
    pending_puts: Mutex<HashMap<Tag, PutContinuation>>,
    get_request_handler: HandlerId,
    get_reply_handler: HandlerId,
    put_request_handler: HandlerId,
    put_ack_handler: HandlerId,
    pub(crate) channels: Mutex<HashMap<u64, crate::channel::ChannelState>>,
    pub(crate) pending_channel_creations: Mutex<HashMap<u64, crate::channel::PendingChannelCreate>>,
    pub(crate) next_channel_serial: AtomicU64,
    pub(crate) create_channel_handler: HandlerId,
    pub(crate) channel_ready_handler: HandlerId,
}

impl RdmaManager {
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<RdmaManager>| {
            let mut registry = engine.registry().lock().unwrap();

            let w = weak.clone();
            let get_request_handler = registry.register(
                RegistryKind::RdmaGet,
                "rt_rdma::get_request",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = GetRequest::unpack(bytes).expect("get request decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_get_request(msg);
                    }
                }),
            );

            let w = weak.clone();
            let get_reply_handler = registry.register(
                RegistryKind::RdmaGet,
                "rt_rdma::get_reply",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let (header, data): (GetReplyHeader, Vec<u8>) = split_sized(bytes).expect("get reply decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_get_reply(header, data);
                    }
                }),
            );

            let w = weak.clone();
            let put_request_handler = registry.register(
                RegistryKind::RdmaPut,
                "rt_rdma::put_request",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let (header, data): (PutRequestHeader, Vec<u8>) = split_sized(bytes).expect("put request decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_put_request(header, data);
                    }
                }),
            );

            let w = weak.clone();
            let put_ack_handler = registry.register(
                RegistryKind::RdmaPut,
                "rt_rdma::put_ack",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = PutAck::unpack(bytes).expect("put ack decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_put_ack(msg);
                    }
                }),
            );

            let w = weak.clone();
            let create_channel_handler = registry.register(
                RegistryKind::RdmaPut,
                "rt_rdma::create_channel",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = crate::wire::CreateChannel::unpack(bytes).expect("create channel decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_create_channel(msg);
                    }
                }),
            );

            let w = weak.clone();
            let channel_ready_handler = registry.register(
                RegistryKind::RdmaPut,
                "rt_rdma::channel_ready",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = crate::wire::ChannelReady::unpack(bytes).expect("channel ready decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_channel_ready(msg);
                    }
                }),
            );

            drop(registry);

            Self {
                engine,
                next_identifier: AtomicU64::new(0),
                next_collective_identifier: AtomicU64::new(0),
                regions: Mutex::new(HashMap::new()),
                get_callbacks: Mutex::new(HashMap::new()),
                put_callbacks: Mutex::new(HashMap::new()),
                next_tag: AtomicU64::new(1),
                pending_gets: Mutex::new(HashMap::new()),
                pending_puts: Mutex::new(HashMap::new()),
                get_request_handler,
                get_reply_handler,
                put_request_handler,
                put_ack_handler,
                channels: Mutex::new(HashMap::new()),
                pending_channel_creations: Mutex::new(HashMap::new()),
                next_channel_serial: AtomicU64::new(0),
                create_channel_handler,
                channel_ready_handler,
            }
        })
    }

    /// Register a plain memory region at this (home) node and return
    /// its handle. The default get/put callback serves directly from
    /// the region's bytes; [`Self::associate_get`]/[`Self::associate_put`]
    /// may override that.
    #[must_use]
    pub fn register(&self, data: Vec<u8>) -> RdmaHandle {
        let identifier = self.next_identifier.fetch_add(1, Ordering::SeqCst);
        let handle = RdmaHandle::pack(RdmaHandleFields {
            is_sized: true,
            is_collective: false,
            is_handler_based: false,
            op_type: RdmaOpType::Get,
            home_node: self.engine.this_node(),
            identifier,
        });
        self.regions.lock().unwrap().insert(handle, Arc::new(Mutex::new(data)));
        handle
    }

    /// Register a handler-based region with no backing bytes: every
    /// get/put against it must go through an explicitly associated
    /// callback, or [`Self::require_get_ready`]/[`Self::require_put_ready`]
    /// will report it as not ready and serving one will panic.
    #[must_use]
    pub fn register_handler_based(&self) -> RdmaHandle {
        let identifier = self.next_identifier.fetch_add(1, Ordering::SeqCst);
        RdmaHandle::pack(RdmaHandleFields {
            is_sized: true,
            is_collective: false,
            is_handler_based: true,
            op_type: RdmaOpType::Get,
            home_node: self.engine.this_node(),
            identifier,
        })
    }

    /// Register this node's own slice of a collectively constructed
    /// handle. Every participant must call this the same number of
    /// times, in the same order — the handle's bits (including its
    /// `home_node` field, set to a fixed placeholder rather than
    /// `this_node`) come out identical on every node, so the same
    /// `RdmaHandle` value addresses "this slot's slice on whichever
    /// node `target` names" everywhere.
    #[must_use]
    pub fn register_collective(&self, local_data: Vec<u8>) -> RdmaHandle {
        let identifier = self.next_collective_identifier.fetch_add(1, Ordering::SeqCst);
        let handle = RdmaHandle::pack(RdmaHandleFields {
            is_sized: true,
            is_collective: true,
            is_handler_based: false,
            op_type: RdmaOpType::GetCollective,
            home_node: NodeId::new(0),
            identifier,
        });
        self.regions.lock().unwrap().insert(handle, Arc::new(Mutex::new(local_data)));
        handle
    }

    /// Override how gets against `handle` are served, running at the
    /// node that owns the addressed slice.
    pub fn associate_get(&self, handle: RdmaHandle, callback: impl Fn(usize, usize, Tag) -> Vec<u8> + Send + Sync + 'static) {
        self.get_callbacks.lock().unwrap().insert(handle, Box::new(callback));
    }

    /// Override how puts against `handle` are absorbed.
    pub fn associate_put(&self, handle: RdmaHandle, callback: impl Fn(&[u8], usize, Tag) + Send + Sync + 'static) {
        self.put_callbacks.lock().unwrap().insert(handle, Box::new(callback));
    }

    /// Non-panicking readiness check mirroring `rt_location`'s
    /// `require_known`: confirms a get against `handle` can be served
    /// (a region is registered, or a get callback was associated)
    /// before a caller drives a full round trip.
    ///
    /// # Errors
    ///
    /// See [`RdmaError`].
    pub fn require_get_ready(&self, handle: RdmaHandle) -> Result<(), RdmaError> {
        if self.regions.lock().unwrap().contains_key(&handle) || self.get_callbacks.lock().unwrap().contains_key(&handle) {
            Ok(())
        } else {
            Err(RdmaError::NoGetCallback(handle))
        }
    }

    /// Same as [`Self::require_get_ready`] for the put side.
    ///
    /// # Errors
    ///
    /// See [`RdmaError`].
    pub fn require_put_ready(&self, handle: RdmaHandle) -> Result<(), RdmaError> {
        if self.regions.lock().unwrap().contains_key(&handle) || self.put_callbacks.lock().unwrap().contains_key(&handle) {
            Ok(())
        } else {
            Err(RdmaError::NoPutCallback(handle))
        }
    }

    fn route(&self, handle: RdmaHandle, target: NodeId) -> NodeId {
        if handle.is_collective() {
            target
        } else {
            handle.home_node()
        }
    }

    /// One-sided read of `bytes` bytes at `offset` from `target`'s
    /// slice of `handle` (or simply `handle`'s home for a
    /// non-collective handle, in which case `target` is ignored).
    /// `continuation` fires once the reply arrives.
    pub fn get(self: &Arc<Self>, handle: RdmaHandle, target: NodeId, bytes: usize, offset: usize, continuation: impl FnOnce(Vec<u8>) + Send + 'static) {
        let routed = self.route(handle, target);
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst) as Tag;
        self.pending_gets.lock().unwrap().insert(tag, Box::new(continuation));
        let request = GetRequest {
            handle,
            requester: self.engine.this_node(),
            routed_node: routed,
            bytes,
            offset,
            tag,
        };
        self.engine.send(routed, self.get_request_handler, &request);
    }

    /// One-sided write of `data` at `offset` into `target`'s slice of
    /// `handle` (or `handle`'s home for a non-collective handle).
    /// `continuation` fires once the remote has acknowledged absorbing
    /// the write.
    pub fn put(self: &Arc<Self>, handle: RdmaHandle, target: NodeId, data: Vec<u8>, offset: usize, continuation: impl FnOnce() + Send + 'static) {
        let routed = self.route(handle, target);
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst) as Tag;
        self.pending_puts.lock().unwrap().insert(tag, Box::new(continuation));
        let header = PutRequestHeader {
            handle,
            requester: self.engine.this_node(),
            routed_node: routed,
            offset,
            tag,
        };
        self.engine.send_sized(routed, self.put_request_handler, &header, &data);
    }

    fn on_get_request(self: &Arc<Self>, msg: GetRequest) {
        let data = self.serve_get(msg.handle, msg.bytes, msg.offset, msg.tag);
        rt_telemetry::RDMA_GETS_SERVED.inc();
        let header = GetReplyHeader { tag: msg.tag };
        self.engine.send_sized(msg.requester, self.get_reply_handler, &header, &data);
    }

    fn serve_get(&self, handle: RdmaHandle, bytes: usize, offset: usize, tag: Tag) -> Vec<u8> {
        if let Some(cb) = self.get_callbacks.lock().unwrap().get(&handle) {
            return cb(bytes, offset, tag);
        }
        if handle.is_handler_based() {
            panic!("{}", RdmaError::NoGetCallback(handle));
        }
        let region = self
            .regions
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .unwrap_or_else(|| panic!("{}", RdmaError::UnknownHandle(handle)));
        let guard = region.lock().unwrap();
        guard[offset..offset + bytes].to_vec()
    }

    fn on_get_reply(self: &Arc<Self>, header: GetReplyHeader, data: Vec<u8>) {
        if let Some(cont) = self.pending_gets.lock().unwrap().remove(&header.tag) {
            cont(data);
        }
    }

    fn on_put_request(self: &Arc<Self>, header: PutRequestHeader, data: Vec<u8>) {
        self.absorb_put(header.handle, &data, header.offset, header.tag);
        rt_telemetry::RDMA_PUTS_SERVED.inc();
        self.engine.send(header.requester, self.put_ack_handler, &PutAck { tag: header.tag });
    }

    fn absorb_put(&self, handle: RdmaHandle, data: &[u8], offset: usize, tag: Tag) {
        if let Some(cb) = self.put_callbacks.lock().unwrap().get(&handle) {
            cb(data, offset, tag);
            return;
        }
        if handle.is_handler_based() {
            panic!("{}", RdmaError::NoPutCallback(handle));
        }
        let region = self
            .regions
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .unwrap_or_else(|| panic!("{}", RdmaError::UnknownHandle(handle)));
        let mut guard = region.lock().unwrap();
        guard[offset..offset + data.len()].copy_from_slice(data);
    }

    fn on_put_ack(self: &Arc<Self>, msg: PutAck) {
        if let Some(cont) = self.pending_puts.lock().unwrap().remove(&msg.tag) {
            cont();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_transport::local::LocalCluster;
    use std::sync::atomic::{AtomicBool, Ordering as AOrdering};

    fn make_cluster(n: u32) -> (Vec<Arc<Engine>>, Vec<Arc<RdmaManager>>) {
        let cluster = LocalCluster::new(n);
        let mut engines = Vec::new();
        let mut managers = Vec::new();
        for i in 0..n {
            let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(i))));
            engine.set_accounting(Arc::new(rt_engine::NullAccounting));
            managers.push(RdmaManager::new(Arc::clone(&engine)));
            engines.push(engine);
        }
        (engines, managers)
    }

    fn drain_all(engines: &[Arc<Engine>], rounds: usize) {
        for _ in 0..rounds {
            for e in engines {
                e.run_scheduler();
            }
        }
    }

    #[test]
    fn get_against_a_registered_region_returns_the_requested_slice() {
        let (engines, managers) = make_cluster(3);
        let data: Vec<u8> = (0..64u8).map(|b| b.wrapping_mul(2)).collect();
        let handle = managers[0].register(data.clone());

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        managers[1].get(handle, NodeId::new(0), 8, 16, move |bytes| {
            *received_clone.lock().unwrap() = bytes;
        });
        drain_all(&engines, 10);

        assert_eq!(*received.lock().unwrap(), data[16..24]);
    }

    #[test]
    fn put_absorbs_into_the_home_region_and_acks() {
        let (engines, managers) = make_cluster(2);
        let handle = managers[0].register(vec![0u8; 16]);

        let acked = Arc::new(AtomicBool::new(false));
        let acked_clone = Arc::clone(&acked);
        managers[1].put(handle, NodeId::new(0), vec![9, 9, 9, 9], 4, move || {
            acked_clone.store(true, AOrdering::SeqCst);
        });
        drain_all(&engines, 10);

        assert!(acked.load(AOrdering::SeqCst));
    }

    #[test]
    fn associated_get_callback_overrides_the_plain_region() {
        let (engines, managers) = make_cluster(2);
        let handle = managers[0].register_handler_based();
        managers[0].associate_get(handle, |bytes, offset, _tag| vec![(offset + bytes) as u8]);

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        managers[1].get(handle, NodeId::new(0), 3, 5, move |bytes| {
            *received_clone.lock().unwrap() = bytes;
        });
        drain_all(&engines, 10);

        assert_eq!(*received.lock().unwrap(), vec![8u8]);
    }

    #[test]
    fn collective_handle_routes_to_the_named_target_slice() {
        let (engines, managers) = make_cluster(3);
        let mut handle = None;
        for (i, mgr) in managers.iter().enumerate() {
            let h = mgr.register_collective(vec![i as u8; 4]);
            handle = Some(h);
        }
        let handle = handle.unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        managers[0].get(handle, NodeId::new(2), 4, 0, move |bytes| {
            *received_clone.lock().unwrap() = bytes;
        });
        drain_all(&engines, 10);

        assert_eq!(*received.lock().unwrap(), vec![2u8; 4]);
    }

    #[test]
    fn require_get_ready_reports_handler_based_handles_without_a_callback() {
        let (_engines, managers) = make_cluster(1);
        let handle = managers[0].register_handler_based();
        assert!(managers[0].require_get_ready(handle).is_err());
        managers[0].associate_get(handle, |_, _, _| Vec::new());
        assert!(managers[0].require_get_ready(handle).is_ok());
    }
}
