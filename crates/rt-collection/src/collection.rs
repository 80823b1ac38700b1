//! The collection manager: an indexed, distributed set
//! of user-typed elements, addressed through [`rt_location::LocationManager`]
//! and reduced through [`rt_reduce::ReductionManager`].
//!
//! One [`CollectionManager`] instance is generic over the element type
//! `T`, its single message type `M`, and the dispatch closure `F` that
//! applies an `M` to a `&mut T` — mirroring a templated collection proxy
//! rather than a dynamic multi-handler registry, since every element of
//! a given collection shares one user-defined member function in
//! practice.

use crate::messages::{CollectionBroadcast, CollectionMessage, CollectionMigrate};
use crate::phase::PhaseTracker;
use rt_engine::Engine;
use rt_location::LocationManager;
use rt_reduce::ReductionManager;
use rt_types::{
    CollectionEntryMeta, EntryLifecycle, GroupId, HandlerId, Index, Linearization, NodeId,
    NumNodes, Payload, ProxyFields, ReductionId, RegistryKind, VirtualProxy,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A deterministic, stateless assignment of indices to nodes, shared by
/// every node's copy of the program.
pub type MapFn = fn(Index, Index, NumNodes) -> NodeId;

pub struct CollectionManager<T, M, F>
where
    T: Send + 'static,
    M: Payload + Send + 'static,
    F: Fn(&mut T, M, Index, NodeId) + Send + Sync + 'static,
{
    engine: Arc<Engine>,
    location: Arc<LocationManager>,
    reduce: Arc<ReductionManager>,
    group: GroupId,
    range: Index,
    linearization: Linearization,
    /// Immutable per-index home assignment. Populated eagerly for
    /// uniform-map construction (recomputed, not stored); populated by a
    /// startup directory exchange for list-insert construction.
    home_directory: Mutex<HashMap<Index, NodeId>>,
    map_fn: Option<MapFn>,
    elements: Mutex<HashMap<Index, (T, CollectionEntryMeta)>>,
    /// Messages that arrived for an index mid-migration, replayed once
    /// the element lands.
    pending_for_missing: Mutex<HashMap<Index, VecDeque<Vec<u8>>>>,
    finished_inserting: AtomicBool,
    pending_broadcasts: Mutex<Vec<Vec<u8>>>,
    phase: PhaseTracker,
    element_handler: HandlerId,
    broadcast_handler: HandlerId,
    migrate_handler: HandlerId,
    directory_handler: HandlerId,
    dispatch: F,
}

impl<T, M, F> CollectionManager<T, M, F>
where
    T: Send + 'static,
    M: Payload + Send + 'static,
    F: Fn(&mut T, M, Index, NodeId) + Send + Sync + 'static,
{
    fn new_empty(
        engine: Arc<Engine>,
        location: Arc<LocationManager>,
        reduce: Arc<ReductionManager>,
        group: GroupId,
        range: Index,
        linearization: Linearization,
        map_fn: Option<MapFn>,
        dispatch: F,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let mut registry = engine.registry().lock().unwrap();

            let w = weak.clone();
            let element_handler = registry.register(
                RegistryKind::Collection,
                "rt_collection::element",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], from: NodeId| {
                    let msg = CollectionMessage::unpack(bytes).expect("collection message decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_element_message(msg, from);
                    }
                }),
            );

            let w = weak.clone();
            let broadcast_handler = registry.register(
                RegistryKind::Collection,
                "rt_collection::broadcast",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], from: NodeId| {
                    let msg = CollectionBroadcast::unpack(bytes).expect("collection broadcast decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_broadcast_message(msg, from);
                    }
                }),
            );

            let w = weak.clone();
            let migrate_handler = registry.register(
                RegistryKind::CollectionMember,
                "rt_collection::migrate",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], from: NodeId| {
                    let msg = CollectionMigrate::unpack(bytes).expect("collection migrate decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_migrate_receive(msg, from);
                    }
                }),
            );

            let w = weak.clone();
            let directory_handler = registry.register(
                RegistryKind::CollectionMember,
                "rt_collection::directory",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let entries: Vec<(Index, NodeId)> = bincode::deserialize(bytes).expect("directory decode");
                    if let Some(mgr) = w.upgrade() {
                        let mut dir = mgr.home_directory.lock().unwrap();
                        for (idx, node) in entries {
                            dir.insert(idx, node);
                        }
                    }
                }),
            );
            drop(registry);

            Self {
                engine,
                location,
                reduce,
                group,
                range,
                linearization,
                home_directory: Mutex::new(HashMap::new()),
                map_fn,
                elements: Mutex::new(HashMap::new()),
                pending_for_missing: Mutex::new(HashMap::new()),
                finished_inserting: AtomicBool::new(false),
                pending_broadcasts: Mutex::new(Vec::new()),
                phase: PhaseTracker::new(),
                element_handler,
                broadcast_handler,
                migrate_handler,
                directory_handler,
                dispatch,
            }
        })
    }

    /// Every node evaluates the user-provided
    /// `map(index, range, num_nodes)` for every index and instantiates
    /// the subset that maps to itself. `map` must be a capture-free
    /// `fn` item so every node's copy of the program evaluates the same
    /// assignment without any wire exchange.
    #[must_use]
    pub fn construct_uniform(
        engine: Arc<Engine>,
        location: Arc<LocationManager>,
        reduce: Arc<ReductionManager>,
        group: GroupId,
        range: Index,
        linearization: Linearization,
        map: MapFn,
        mut init: impl FnMut(Index) -> T,
        dispatch: F,
    ) -> Arc<Self> {
        let mgr = Self::new_empty(engine, location, reduce, group, range, linearization, Some(map), dispatch);
        let total = range.size();
        let num_nodes = mgr.engine.num_nodes();
        for flat in 0..total {
            let index = linearization.delinearize(flat, range);
            let home = map(index, range, num_nodes);
            mgr.home_directory.lock().unwrap().insert(index, home);
            if home == mgr.engine.this_node() {
                mgr.insert_local(index, init(index));
            }
        }
        mgr.finished_inserting();
        mgr
    }

    /// Each node contributes a list of
    /// `(index, constructed-instance)` pairs. Since there is no uniform
    /// map to recompute a home from, every node broadcasts its own
    /// assignments so the whole job agrees on the directory before
    /// `finished_inserting` fires.
    #[must_use]
    pub fn construct_list(
        engine: Arc<Engine>,
        location: Arc<LocationManager>,
        reduce: Arc<ReductionManager>,
        group: GroupId,
        range: Index,
        linearization: Linearization,
        local_items: Vec<(Index, T)>,
        dispatch: F,
    ) -> Arc<Self> {
        let mgr = Self::new_empty(engine, location, reduce, group, range, linearization, None, dispatch);
        let this_node = mgr.engine.this_node();
        let mut directory_entries = Vec::with_capacity(local_items.len());
        for (index, value) in local_items {
            mgr.home_directory.lock().unwrap().insert(index, this_node);
            directory_entries.push((index, this_node));
            mgr.insert_local(index, value);
        }
        if !directory_entries.is_empty() {
            let bytes = bincode::serialize(&directory_entries).expect("directory encode");
            mgr.engine.broadcast(mgr.directory_handler, &bytes);
        }
        mgr.finished_inserting();
        mgr
    }

    fn insert_local(self: &Arc<Self>, index: Index, value: T) {
        let home = *self.home_directory.lock().unwrap().get(&index).unwrap_or(&self.engine.this_node());
        let proxy = VirtualProxy::pack(ProxyFields {
            is_collection: true,
            is_migratable: true,
            is_remote: false,
            home_node: home,
            identifier: self.linearization.linearize(index, self.range),
        });
        self.location.register(proxy);
        let meta = CollectionEntryMeta::new(index, proxy, true);
        self.elements.lock().unwrap().insert(index, (value, meta));
        self.replay_pending(index);
    }

    fn replay_pending(self: &Arc<Self>, index: Index) {
        let buffered = self.pending_for_missing.lock().unwrap().remove(&index);
        if let Some(buffered) = buffered {
            for bytes in buffered {
                self.apply_to_local(index, &bytes);
            }
        }
    }

    /// Broadcasts arriving before construction is finalized
    /// are buffered until `finished_inserting` is called explicitly,
    /// rather than until the first phase boundary.
    pub fn finished_inserting(&self) {
        self.finished_inserting.store(true, Ordering::SeqCst);
        let buffered = std::mem::take(&mut *self.pending_broadcasts.lock().unwrap());
        for bytes in buffered {
            self.deliver_broadcast(&bytes);
        }
    }

    #[must_use]
    pub fn phase(&self) -> &PhaseTracker {
        &self.phase
    }

    fn home_of(&self, index: Index) -> NodeId {
        if let Some(map) = self.map_fn {
            return map(index, self.range, self.engine.num_nodes());
        }
        *self
            .home_directory
            .lock()
            .unwrap()
            .get(&index)
            .unwrap_or_else(|| panic!("no known home for index {index} in this collection"))
    }

    fn proxy_for(&self, index: Index) -> VirtualProxy {
        VirtualProxy::pack(ProxyFields {
            is_collection: true,
            is_migratable: true,
            is_remote: false,
            home_node: self.home_of(index),
            identifier: self.linearization.linearize(index, self.range),
        })
    }

    /// `proxy[index].send<handler>(msg)`.
    pub fn send(self: &Arc<Self>, index: Index, msg: M) {
        let proxy = self.proxy_for(index);
        let bytes = msg.pack().expect("collection message encode");
        let mgr = Arc::clone(self);
        let element_handler = self.element_handler;
        self.location.location(proxy, move |node| {
            mgr.engine.send(node, element_handler, &CollectionMessage { index, bytes });
        });
    }

    /// Delivered to every live element exactly once.
    /// Buffered until construction finishes.
    pub fn broadcast(&self, msg: M) {
        let bytes = msg.pack().expect("collection broadcast encode");
        if !self.finished_inserting.load(Ordering::SeqCst) {
            self.pending_broadcasts.lock().unwrap().push(bytes);
            return;
        }
        self.deliver_broadcast(&bytes);
    }

    fn deliver_broadcast(&self, bytes: &[u8]) {
        self.engine.broadcast(self.broadcast_handler, &CollectionBroadcast { bytes: bytes.to_vec() });
        self.apply_broadcast_locally(bytes);
    }

    fn apply_broadcast_locally(&self, bytes: &[u8]) {
        let mut elements = self.elements.lock().unwrap();
        for (index, (value, _meta)) in elements.iter_mut() {
            let msg = M::unpack(bytes).expect("collection broadcast decode");
            (self.dispatch)(value, msg, *index, self.engine.this_node());
        }
    }

    /// Each element contributes once per `id`; this node aggregates its
    /// locally-owned elements, then enters the cross-node spanning-tree
    /// reduction using the collection's group.
    pub fn reduce<R>(
        self: &Arc<Self>,
        id: ReductionId,
        seed: R,
        per_element: impl Fn(&T) -> R,
        combine: impl Fn(R, R) -> R + Clone + Send + 'static,
        root: NodeId,
        callback: Option<impl FnOnce(R) + Send + 'static>,
    ) where
        R: Payload + 'static,
    {
        let local = {
            let elements = self.elements.lock().unwrap();
            elements.values().fold(seed, |acc, (value, _meta)| combine(acc, per_element(value)))
        };
        self.reduce.contribute(self.group, id, local, combine, root, callback);
    }

    /// Migration specialized to a collection element:
    /// serialize the local value, hand it to the new owner, and leave a
    /// forward pointer behind.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not resident on this node.
    pub fn migrate(self: &Arc<Self>, index: Index, new_node: NodeId)
    where
        T: Payload,
    {
        let (value, meta) = self
            .elements
            .lock()
            .unwrap()
            .remove(&index)
            .unwrap_or_else(|| panic!("cannot migrate index {index}: not resident here"));
        self.location.migrate(meta.proxy, new_node);
        let bytes = value.pack().expect("collection element encode");
        self.engine.send(new_node, self.migrate_handler, &CollectionMigrate { index, proxy: meta.proxy, bytes });
    }

    fn on_migrate_receive(self: &Arc<Self>, msg: CollectionMigrate, _from: NodeId)
    where
        T: Payload,
    {
        let value = T::unpack(&msg.bytes).expect("collection element decode");
        self.location.adopt(msg.proxy);
        let meta = CollectionEntryMeta { lifecycle: EntryLifecycle::Resident, ..CollectionEntryMeta::new(msg.index, msg.proxy, true) };
        self.elements.lock().unwrap().insert(msg.index, (value, meta));
        self.replay_pending(msg.index);
    }

    fn on_element_message(self: &Arc<Self>, msg: CollectionMessage, from: NodeId) {
        let handled = self.apply_to_local(msg.index, &msg.bytes);
        if !handled {
            tracing::debug!(index = %msg.index, %from, "collection element in transit, buffering");
            self.pending_for_missing.lock().unwrap().entry(msg.index).or_default().push_back(msg.bytes);
        }
    }

    fn apply_to_local(&self, index: Index, bytes: &[u8]) -> bool {
        let mut elements = self.elements.lock().unwrap();
        match elements.get_mut(&index) {
            Some((value, _meta)) => {
                let msg = M::unpack(bytes).expect("collection message decode");
                (self.dispatch)(value, msg, index, self.engine.this_node());
                true
            }
            None => false,
        }
    }

    fn on_broadcast_message(&self, msg: CollectionBroadcast, _from: NodeId) {
        self.apply_broadcast_locally(&msg.bytes);
    }

    #[must_use]
    pub fn is_resident(&self, index: Index) -> bool {
        self.elements.lock().unwrap().contains_key(&index)
    }

    #[must_use]
    pub fn local_len(&self) -> usize {
        self.elements.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_transport::local::LocalCluster;
    use rt_types::{GroupId, ReductionId, DEFAULT_GROUP};
    use std::sync::atomic::AtomicI64;

    fn block_map_fn(index: Index, range: Index, n: NumNodes) -> NodeId {
        rt_types::block_map(index.linearize_colmaj(range), range.size(), n.get())
    }

    fn make_node(n: u32, i: u32, cluster: &Arc<LocalCluster>) -> (Arc<Engine>, Arc<LocationManager>, Arc<ReductionManager>) {
        let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(i))));
        engine.set_accounting(Arc::new(rt_engine::NullAccounting));
        let location = LocationManager::new(Arc::clone(&engine), NumNodes(n).default_hop_cap());
        let reduce = ReductionManager::new(Arc::clone(&engine));
        (engine, location, reduce)
    }

    fn drain_all(engines: &[Arc<Engine>], rounds: usize) {
        for _ in 0..rounds {
            for e in engines {
                e.run_scheduler();
            }
        }
    }

    #[test]
    fn uniform_construction_distributes_every_index_exactly_once() {
        let n = 3;
        let cluster = LocalCluster::new(n);
        let mut engines = Vec::new();
        let mut collections = Vec::new();
        let range = Index::one(9);

        for i in 0..n {
            let (engine, location, reduce) = make_node(n, i, &cluster);
            let mgr = CollectionManager::construct_uniform(
                Arc::clone(&engine),
                location,
                reduce,
                DEFAULT_GROUP,
                range,
                Linearization::ColumnMajor,
                block_map_fn,
                |index| index.component(0),
                |value: &mut i64, msg: i64, _index, _from| *value += msg,
            );
            engines.push(engine);
            collections.push(mgr);
        }

        let total: usize = collections.iter().map(|c| c.local_len()).sum();
        assert_eq!(total, 9);
        drain_all(&engines, 1);
    }

    #[test]
    fn send_routes_to_the_owning_node_and_applies_the_handler() {
        let n = 2;
        let cluster = LocalCluster::new(n);
        let (e0, l0, r0) = make_node(n, 0, &cluster);
        let (e1, l1, r1) = make_node(n, 1, &cluster);
        let range = Index::one(4);

        let c0 = CollectionManager::construct_uniform(
            Arc::clone(&e0), l0, r0, DEFAULT_GROUP, range, Linearization::ColumnMajor,
            block_map_fn, |index| index.component(0), |value: &mut i64, msg: i64, _i, _f| *value = msg,
        );
        let c1 = CollectionManager::construct_uniform(
            Arc::clone(&e1), l1, r1, DEFAULT_GROUP, range, Linearization::ColumnMajor,
            block_map_fn, |index| index.component(0), |value: &mut i64, msg: i64, _i, _f| *value = msg,
        );

        let target = Index::one(3);
        let owner = block_map_fn(target, range, NumNodes(n));
        assert_eq!(owner, NodeId::new(1), "index 3 of 4 over 2 nodes is on the second node");

        c0.send(target, 77);
        drain_all(&[e0, e1], 10);

        assert!(c1.is_resident(target));
        let _ = c0;
    }

    #[test]
    fn broadcast_is_buffered_until_finished_inserting() {
        let n = 1;
        let cluster = LocalCluster::new(n);
        let (engine, location, reduce) = make_node(n, 0, &cluster);
        let range = Index::one(1);
        let seen = Arc::new(AtomicI64::new(0));
        let seen_clone = Arc::clone(&seen);

        // construct_list with no local items still calls finished_inserting
        // at the end of construction, so a broadcast sent afterward is
        // delivered immediately rather than staying buffered.
        let mgr = CollectionManager::construct_list(
            Arc::clone(&engine), location, reduce, DEFAULT_GROUP, range, Linearization::ColumnMajor,
            vec![(Index::one(0), 0i64)],
            move |value: &mut i64, msg: i64, _i, _f| { *value += msg; seen_clone.fetch_add(1, Ordering::SeqCst); },
        );
        drain_all(&[Arc::clone(&engine)], 5);

        mgr.broadcast(5);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(*mgr.elements.lock().unwrap().get(&Index::one(0)).unwrap().0, 5);
    }

    #[test]
    fn four_node_uniform_collection_reduce_sums_to_node_count() {
        let n = 4;
        let cluster = LocalCluster::new(n);
        let mut engines = Vec::new();
        let mut collections = Vec::new();
        let range = Index::one(4);

        for i in 0..n {
            let (engine, location, reduce) = make_node(n, i, &cluster);
            let mgr = CollectionManager::construct_uniform(
                Arc::clone(&engine), location, reduce, DEFAULT_GROUP, range, Linearization::ColumnMajor,
                block_map_fn, |_index| 1i64, |_value: &mut i64, _msg: i64, _i, _f| {},
            );
            engines.push(engine);
            collections.push(mgr);
        }

        let result = Arc::new(AtomicI64::new(-1));
        for (i, mgr) in collections.iter().enumerate() {
            let callback = if i == 0 {
                let result = Arc::clone(&result);
                Some(move |v: i64| result.store(v, Ordering::SeqCst))
            } else {
                None
            };
            mgr.reduce(ReductionId(1), 0i64, |v: &i64| *v, |a, b| a + b, NodeId::new(0), callback);
        }
        drain_all(&engines, 20);

        assert_eq!(result.load(Ordering::SeqCst), 4);
    }
}
