//! The object-group manager: one instance of a user type
//! per node, addressed by node number rather than by a location-service
//! lookup. "Simpler than a collection: no index, no migration, no home
//! lookup — the `node` component of the proxy *is* the address."
//!
//! Construction runs the user's constructor independently on every node
//! (there is no wire exchange to agree on an initial value, unlike
//! [`crate::collection::CollectionManager::construct_list`]'s directory
//! broadcast); `send`/`broadcast`/`reduce` reuse the same registry and
//! reduction-manager seams as the collection manager.

use rt_engine::Engine;
use rt_reduce::ReductionManager;
use rt_types::{GroupId, HandlerId, NodeId, Payload, ReductionId, RegistryKind};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjGroupMessage {
    bytes: Vec<u8>,
}

/// An object-group proxy generic over the per-node object type `T` and
/// its single message type `M`.
pub struct ObjGroupManager<T, M, F>
where
    T: Send + 'static,
    M: Payload + Send + 'static,
    F: Fn(&mut T, M, NodeId) + Send + Sync + 'static,
{
    engine: Arc<Engine>,
    reduce: Arc<ReductionManager>,
    group: GroupId,
    instance: Mutex<T>,
    message_handler: HandlerId,
    broadcast_handler: HandlerId,
    dispatch: F,
}

impl<T, M, F> ObjGroupManager<T, M, F>
where
    T: Send + 'static,
    M: Payload + Send + 'static,
    F: Fn(&mut T, M, NodeId) + Send + Sync + 'static,
{
    /// Construction is collective; the object's
    /// constructor runs independently on every node. `init` is called
    /// once, locally, on this node — callers invoke this the same way on
    /// every node in the job to get a collectively-constructed group.
    #[must_use]
    pub fn construct(engine: Arc<Engine>, reduce: Arc<ReductionManager>, group: GroupId, init: impl FnOnce(NodeId) -> T, dispatch: F) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let mut registry = engine.registry().lock().unwrap();

            let w = weak.clone();
            let message_handler = registry.register(
                RegistryKind::ObjGroup,
                "rt_collection::objgroup::message",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], from: NodeId| {
                    let msg = ObjGroupMessage::unpack(bytes).expect("objgroup message decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_message(msg, from);
                    }
                }),
            );

            let w = weak.clone();
            let broadcast_handler = registry.register(
                RegistryKind::ObjGroup,
                "rt_collection::objgroup::broadcast",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], from: NodeId| {
                    let msg = ObjGroupMessage::unpack(bytes).expect("objgroup broadcast decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_message(msg, from);
                    }
                }),
            );
            drop(registry);

            let this_node = engine.this_node();
            Self {
                engine,
                reduce,
                group,
                instance: Mutex::new(init(this_node)),
                message_handler,
                broadcast_handler,
                dispatch,
            }
        })
    }

    /// Route `msg` to the instance living at `node` — no location lookup,
    /// since the proxy's `node` component already is the address.
    pub fn send(&self, node: NodeId, msg: M) {
        let bytes = msg.pack().expect("objgroup message encode");
        self.engine.send(node, self.message_handler, &ObjGroupMessage { bytes });
    }

    /// Deliver `msg` to every node's instance, including this one
    /// (unlike [`crate::collection::CollectionManager::broadcast`], an
    /// object group has exactly one instance per node, so "every live
    /// element" and "every node" coincide).
    pub fn broadcast(&self, msg: M) {
        let bytes = msg.pack().expect("objgroup broadcast encode");
        self.engine.broadcast(self.broadcast_handler, &ObjGroupMessage { bytes: bytes.clone() });
        self.apply(ObjGroupMessage { bytes }, self.engine.this_node());
    }

    /// This node's instance contributes once per `id`, combined over the
    /// group's spanning tree.
    pub fn reduce<R>(
        self: &Arc<Self>,
        id: ReductionId,
        value: impl Fn(&T) -> R,
        combine: impl Fn(R, R) -> R + Clone + Send + 'static,
        root: NodeId,
        callback: Option<impl FnOnce(R) + Send + 'static>,
    ) where
        R: Payload + 'static,
    {
        let local = value(&self.instance.lock().unwrap());
        self.reduce.contribute(self.group, id, local, combine, root, callback);
    }

    fn on_message(&self, msg: ObjGroupMessage, from: NodeId) {
        self.apply(msg, from);
    }

    fn apply(&self, msg: ObjGroupMessage, from: NodeId) {
        let decoded = M::unpack(&msg.bytes).expect("objgroup message decode");
        (self.dispatch)(&mut self.instance.lock().unwrap(), decoded, from);
    }

    #[must_use]
    pub fn with_instance<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.instance.lock().unwrap())
    }
}
