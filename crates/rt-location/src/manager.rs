//! The location manager: resolves an opaque entity ID
//! (virtual-context ID, collection element ID, or RDMA handle's identifier
//! reinterpreted as a proxy) to its current owning node, and delivers
//! messages to it. One instance per [`Engine`], registering its own
//! lookup/reply/migration-notify handlers the way `EpochManager` registers
//! its wave/credit protocol handlers.

use crate::errors::LocationError;
use crate::messages::{LookupReply, LookupRequest, MigrationNotify};
use rt_engine::Engine;
use rt_types::{HandlerId, NodeId, Payload, RegistryKind, VirtualProxy};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Continuation = Box<dyn FnOnce(NodeId) + Send>;

/// Per-node location manager.
pub struct LocationManager {
    engine: Arc<Engine>,
    hop_cap: u32,
    /// Populated only on the home node: the current known owner.
    home_current: Mutex<HashMap<VirtualProxy, NodeId>>,
    /// Populated on any node that used to own the entity but migrated it
    /// away: where to chase a lookup or delivery next.
    forward_to: Mutex<HashMap<VirtualProxy, NodeId>>,
    /// Entities this node currently owns.
    resident: Mutex<HashSet<VirtualProxy>>,
    /// Soft, possibly-stale cache of remote resolutions.
    cache: Mutex<HashMap<VirtualProxy, NodeId>>,
    /// Continuations waiting on an outstanding lookup, keyed by ask serial.
    pending: Mutex<HashMap<u64, Continuation>>,
    next_ask_serial: AtomicU64,
    lookup_request_handler: HandlerId,
    lookup_reply_handler: HandlerId,
    migration_notify_handler: HandlerId,
}

impl LocationManager {
    /// # Panics
    ///
    /// `hop_cap` of zero would make even a single forward fatal; callers
    /// should use [`rt_types::NumNodes::default_hop_cap`] unless they have
    /// a specific reason to override it.
    #[must_use]
    pub fn new(engine: Arc<Engine>, hop_cap: u32) -> Arc<Self> {
        assert!(hop_cap > 0, "hop cap must allow at least one forward");
        Arc::new_cyclic(|weak: &Weak<LocationManager>| {
            let mut registry = engine.registry().lock().unwrap();

            let w = weak.clone();
            let lookup_request_handler = registry.register(
                RegistryKind::Plain,
                "rt_location::lookup_request",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = LookupRequest::unpack(bytes).expect("lookup request decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_lookup_request(msg);
                    }
                }),
            );

            let w = weak.clone();
            let lookup_reply_handler = registry.register(
                RegistryKind::Plain,
                "rt_location::lookup_reply",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = LookupReply::unpack(bytes).expect("lookup reply decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_lookup_reply(msg);
                    }
                }),
            );

            let w = weak.clone();
            let migration_notify_handler = registry.register(
                RegistryKind::Plain,
                "rt_location::migration_notify",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], _from: NodeId| {
                    let msg = MigrationNotify::unpack(bytes).expect("migration notify decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_migration_notify(msg);
                    }
                }),
            );
            drop(registry);

            Self {
                engine,
                hop_cap,
                home_current: Mutex::new(HashMap::new()),
                forward_to: Mutex::new(HashMap::new()),
                resident: Mutex::new(HashSet::new()),
                cache: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                next_ask_serial: AtomicU64::new(0),
                lookup_request_handler,
                lookup_reply_handler,
                migration_notify_handler,
            }
        })
    }

    /// Register a freshly constructed entity with this node as its current
    /// (and, since `proxy.home_node()` must equal this node for a first
    /// registration, authoritative) owner.
    ///
    /// # Panics
    ///
    /// Panics if `proxy.home_node()` is not this node — first registration
    /// always happens on the home, matching how the collection manager
    /// constructs proxies at insertion time.
    pub fn register(&self, proxy: VirtualProxy) {
        assert_eq!(
            proxy.home_node(),
            self.engine.this_node(),
            "entity must be first registered on its own home node"
        );
        self.resident.lock().unwrap().insert(proxy);
        self.home_current.lock().unwrap().insert(proxy, self.engine.this_node());
    }

    /// Remove all bookkeeping for a destroyed entity.
    pub fn deregister(&self, proxy: VirtualProxy) {
        self.resident.lock().unwrap().remove(&proxy);
        if proxy.home_node() == self.engine.this_node() {
            self.home_current.lock().unwrap().remove(&proxy);
        }
    }

    #[must_use]
    pub fn is_resident(&self, proxy: VirtualProxy) -> bool {
        self.resident.lock().unwrap().contains(&proxy)
    }

    /// Resolve `proxy` to its current owning node, invoking `continuation`
    /// once known.
    pub fn location(&self, proxy: VirtualProxy, continuation: impl FnOnce(NodeId) + Send + 'static) {
        if self.is_resident(proxy) {
            rt_telemetry::LOCATION_CACHE_HITS.inc();
            continuation(self.engine.this_node());
            return;
        }
        if let Some(&node) = self.cache.lock().unwrap().get(&proxy) {
            rt_telemetry::LOCATION_CACHE_HITS.inc();
            continuation(node);
            return;
        }

        rt_telemetry::LOCATION_CACHE_MISSES.inc();
        let ask_serial = self.next_ask_serial.fetch_add(1, Ordering::SeqCst);
        self.pending.lock().unwrap().insert(ask_serial, Box::new(continuation));
        let request = LookupRequest { proxy, requester: self.engine.this_node(), ask_serial, hops: 0 };
        self.engine.send(proxy.home_node(), self.lookup_request_handler, &request);
    }

    /// Resolve `proxy` then hand `msg` to `handler` at the resolved node
    ///. Arrival-side residency checks
    /// and in-transit buffering are the collection/objgroup manager's
    /// responsibility (it owns the entry and its buffer), since this
    /// crate has no notion of the payload's shape.
    pub fn route<T>(self: &Arc<Self>, proxy: VirtualProxy, handler: HandlerId, msg: T)
    where
        T: Payload + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        self.location(proxy, move |node| {
            engine.send(node, handler, &msg);
        });
    }

    /// Move ownership of `proxy` from this node to `new_node`
    ///: leaves a forward pointer here, and
    /// notifies the home so its authoritative record tracks the new
    /// owner. The entity's serialized state itself is the caller's
    /// responsibility (e.g. `rt-collection`'s arena), per invariant i:
    /// "the transfer is a handshake, not a copy."
    ///
    /// # Panics
    ///
    /// Panics if this node is not currently resident for `proxy`.
    pub fn migrate(&self, proxy: VirtualProxy, new_node: NodeId) {
        assert!(self.resident.lock().unwrap().remove(&proxy), "cannot migrate a non-resident entity");
        self.forward_to.lock().unwrap().insert(proxy, new_node);
        self.cache.lock().unwrap().remove(&proxy);
        rt_telemetry::MIGRATIONS.inc();

        if proxy.home_node() == self.engine.this_node() {
            self.home_current.lock().unwrap().insert(proxy, new_node);
        } else {
            self.engine.send(
                proxy.home_node(),
                self.migration_notify_handler,
                &MigrationNotify { proxy, new_owner: new_node },
            );
        }
    }

    /// Mark `proxy` resident here after receiving its migrated-in state
    ///. Unlike [`Self::register`], this may be
    /// called on a non-home node, since migration moves ownership away
    /// from home routinely.
    pub fn adopt(&self, proxy: VirtualProxy) {
        self.resident.lock().unwrap().insert(proxy);
        self.forward_to.lock().unwrap().remove(&proxy);
        if proxy.home_node() == self.engine.this_node() {
            self.home_current.lock().unwrap().insert(proxy, self.engine.this_node());
        }
    }

    fn on_migration_notify(&self, msg: MigrationNotify) {
        debug_assert_eq!(msg.proxy.home_node(), self.engine.this_node(), "migration notify sent to the wrong home");
        self.home_current.lock().unwrap().insert(msg.proxy, msg.new_owner);
    }

    /// Answer directly if resident, relay
    /// through the forward chain (home's current-owner pointer, or a
    /// former owner's forward pointer) otherwise.
    ///
    /// # Panics
    ///
    /// Panics once `msg.hops` reaches the configured cap — pathological
    /// chasing is a fatal diagnostic condition, not
    /// a recoverable one.
    fn on_lookup_request(&self, msg: LookupRequest) {
        if self.is_resident(msg.proxy) {
            let reply = LookupReply { proxy: msg.proxy, ask_serial: msg.ask_serial, owner: self.engine.this_node() };
            self.engine.send(msg.requester, self.lookup_reply_handler, &reply);
            return;
        }

        let next_hop = if msg.proxy.home_node() == self.engine.this_node() {
            self.home_current.lock().unwrap().get(&msg.proxy).copied()
        } else {
            self.forward_to.lock().unwrap().get(&msg.proxy).copied()
        };

        match next_hop {
            Some(node) if node == self.engine.this_node() => {
                // The authoritative record still points at us even though
                // we're not locally resident (e.g. not yet registered);
                // nothing further to chase.
                let reply = LookupReply { proxy: msg.proxy, ask_serial: msg.ask_serial, owner: node };
                self.engine.send(msg.requester, self.lookup_reply_handler, &reply);
            }
            Some(node) => {
                let hops = msg.hops + 1;
                assert!(
                    hops <= self.hop_cap,
                    "location lookup for {} exceeded hop cap {} while chasing migrations",
                    msg.proxy,
                    self.hop_cap
                );
                self.engine.send(node, self.lookup_request_handler, &LookupRequest { hops, ..msg });
            }
            None => panic!("no location record for {} on node {} (home={})", msg.proxy, self.engine.this_node(), msg.proxy.home_node()),
        }
    }

    fn on_lookup_reply(&self, msg: LookupReply) {
        self.cache.lock().unwrap().insert(msg.proxy, msg.owner);
        if let Some(continuation) = self.pending.lock().unwrap().remove(&msg.ask_serial) {
            continuation(msg.owner);
        }
    }
}

/// # Errors
///
/// Returns [`LocationError::NotRegisteredHere`] when asked to confirm
/// residency for an entity this node has no record of at all (neither
/// resident, cached, nor forwarding) — used by callers that want an
/// explicit error instead of driving a round trip.
pub fn require_known(mgr: &LocationManager, proxy: VirtualProxy) -> Result<(), LocationError> {
    if mgr.is_resident(proxy)
        || mgr.cache.lock().unwrap().contains_key(&proxy)
        || mgr.forward_to.lock().unwrap().contains_key(&proxy)
    {
        Ok(())
    } else {
        Err(LocationError::NotRegisteredHere(proxy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_transport::local::LocalCluster;
    use rt_types::{NodeId, NumNodes, ProxyFields};
    use std::sync::atomic::AtomicBool;

    fn make_cluster(n: u32) -> (Arc<LocalCluster>, Vec<Arc<Engine>>, Vec<Arc<LocationManager>>) {
        let cluster = LocalCluster::new(n);
        let mut engines = Vec::new();
        let mut managers = Vec::new();
        for i in 0..n {
            let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(i))));
            engine.set_accounting(Arc::new(rt_engine::NullAccounting));
            let hop_cap = NumNodes(n).default_hop_cap();
            let mgr = LocationManager::new(Arc::clone(&engine), hop_cap);
            engines.push(engine);
            managers.push(mgr);
        }
        (cluster, engines, managers)
    }

    fn drain_all(engines: &[Arc<Engine>], rounds: usize) {
        for _ in 0..rounds {
            for e in engines {
                e.run_scheduler();
            }
        }
    }

    fn proxy_at(home: NodeId, id: u64) -> VirtualProxy {
        VirtualProxy::pack(ProxyFields {
            is_collection: true,
            is_migratable: true,
            is_remote: false,
            home_node: home,
            identifier: id,
        })
    }

    #[test]
    fn resident_entity_resolves_locally_without_a_round_trip() {
        let (_cluster, _engines, managers) = make_cluster(1);
        let proxy = proxy_at(NodeId::new(0), 1);
        managers[0].register(proxy);

        let resolved = Arc::new(Mutex::new(None));
        let resolved_clone = Arc::clone(&resolved);
        managers[0].location(proxy, move |node| *resolved_clone.lock().unwrap() = Some(node));
        assert_eq!(*resolved.lock().unwrap(), Some(NodeId::new(0)));
    }

    #[test]
    fn remote_lookup_resolves_through_home() {
        let (_cluster, engines, managers) = make_cluster(2);
        let proxy = proxy_at(NodeId::new(1), 7);
        managers[1].register(proxy);

        let resolved = Arc::new(Mutex::new(None));
        let resolved_clone = Arc::clone(&resolved);
        managers[0].location(proxy, move |node| *resolved_clone.lock().unwrap() = Some(node));
        drain_all(&engines, 10);

        assert_eq!(*resolved.lock().unwrap(), Some(NodeId::new(1)));
    }

    #[test]
    fn second_lookup_is_served_from_cache() {
        let (_cluster, engines, managers) = make_cluster(2);
        let proxy = proxy_at(NodeId::new(1), 3);
        managers[1].register(proxy);
        managers[0].location(proxy, |_| {});
        drain_all(&engines, 10);

        let before = rt_telemetry::LOCATION_CACHE_HITS.get();
        let hit = Arc::new(AtomicBool::new(false));
        let hit_clone = Arc::clone(&hit);
        managers[0].location(proxy, move |_| hit_clone.store(true, Ordering::SeqCst));
        assert!(hit.load(Ordering::SeqCst), "should resolve synchronously from cache");
        assert!(rt_telemetry::LOCATION_CACHE_HITS.get() > before);
    }

    #[test]
    fn lookup_after_migration_chases_the_forward_pointer() {
        let (_cluster, engines, managers) = make_cluster(3);
        let proxy = proxy_at(NodeId::new(1), 5);
        managers[1].register(proxy);

        managers[1].migrate(proxy, NodeId::new(0));
        managers[0].register(proxy);
        drain_all(&engines, 5);

        let resolved = Arc::new(Mutex::new(None));
        let resolved_clone = Arc::clone(&resolved);
        managers[2].location(proxy, move |node| *resolved_clone.lock().unwrap() = Some(node));
        drain_all(&engines, 10);

        assert_eq!(*resolved.lock().unwrap(), Some(NodeId::new(0)));
    }
}
