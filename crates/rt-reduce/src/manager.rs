//! The reduction manager: one instance per node,
//! registering a single wire handler and keeping one [`ReductionState`]
//! alive per `(group, id)` pair for the duration of its combine phase.

use crate::errors::ReduceError;
use crate::messages::ReduceContribution;
use crate::reducer::{ErasedReducer, TypedReducer};
use rt_engine::Engine;
use rt_types::{children as tree_children, parent as tree_parent, GroupId, HandlerId, NodeId, NumNodes, Payload, ReductionId, ReductionPhase, RegistryKind, DEFAULT_GROUP};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Weak};

struct ReductionState {
    phase: ReductionPhase,
    /// This node's own contribution, `None` until `contribute` is called
    /// locally for this key.
    local: Option<Vec<u8>>,
    /// Running combine of `local` with every child message already folded
    /// in; meaningless while `local` is `None`.
    accumulator: Vec<u8>,
    /// Child contributions that arrived before `local` did, in arrival
    /// order.
    buffered: Vec<Vec<u8>>,
    children_reported: usize,
    expected_children: usize,
    root: NodeId,
    reducer: Option<Box<dyn ErasedReducer>>,
}

impl ReductionState {
    fn new(expected_children: usize, root: NodeId) -> Self {
        Self {
            phase: ReductionPhase::Init,
            local: None,
            accumulator: Vec::new(),
            buffered: Vec::new(),
            children_reported: 0,
            expected_children,
            root,
            reducer: None,
        }
    }

    fn ready_to_complete(&self) -> bool {
        self.local.is_some() && self.children_reported == self.expected_children
    }
}

/// Per-node reduction manager. Holds group membership (so a reduction's
/// tree can be scoped to a subset of nodes, not just the whole job) and
/// the in-flight reduction table.
pub struct ReductionManager {
    engine: Arc<Engine>,
    groups: Mutex<HashMap<GroupId, Vec<NodeId>>>,
    states: Mutex<HashMap<(GroupId, ReductionId), ReductionState>>,
    contribute_handler: HandlerId,
}

impl ReductionManager {
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Arc<Self> {
        let whole_job: Vec<NodeId> = (0..engine.num_nodes().get()).map(NodeId::new).collect();
        Arc::new_cyclic(|weak: &Weak<ReductionManager>| {
            let mut registry = engine.registry().lock().unwrap();
            let w = weak.clone();
            let contribute_handler = registry.register(
                RegistryKind::Plain,
                "rt_reduce::contribution",
                false,
                false,
                true,
                false,
                0,
                Box::new(move |bytes: &[u8], from: NodeId| {
                    let msg = ReduceContribution::unpack(bytes).expect("reduce contribution decode");
                    if let Some(mgr) = w.upgrade() {
                        mgr.on_contribution(msg, from);
                    }
                }),
            );
            drop(registry);

            let mgr = Self {
                engine,
                groups: Mutex::new(HashMap::new()),
                states: Mutex::new(HashMap::new()),
                contribute_handler,
            };
            mgr.groups.lock().unwrap().insert(DEFAULT_GROUP, whole_job);
            mgr
        })
    }

    /// Register a named subset of nodes with its own broadcast/reduction
    /// tree. `members` need not be sorted;
    /// it is stored as given and indexes the group-local tree.
    ///
    /// # Panics
    ///
    /// Panics if this node isn't in `members` — groups are only
    /// meaningful to their own members.
    pub fn register_group(&self, group: GroupId, members: Vec<NodeId>) {
        assert!(
            members.contains(&self.engine.this_node()),
            "cannot register a group this node is not a member of"
        );
        self.groups.lock().unwrap().insert(group, members);
    }

    fn group_members(&self, group: GroupId) -> Vec<NodeId> {
        self.groups
            .lock()
            .unwrap()
            .get(&group)
            .unwrap_or_else(|| panic!("reduction against unregistered group {group:?}"))
            .clone()
    }

    /// Position of `node` within `members`, used as its rank in the
    /// group-local tree (independent of its global [`NodeId`]).
    fn group_rank(members: &[NodeId], node: NodeId) -> u32 {
        members
            .iter()
            .position(|&m| m == node)
            .unwrap_or_else(|| panic!("node {node} is not a member of this reduction group")) as u32
    }

    fn tree_shape(&self, group: GroupId, root: NodeId) -> (Vec<NodeId>, Option<NodeId>) {
        let members = self.group_members(group);
        let n = NumNodes(members.len() as u32);
        let this_rank = Self::group_rank(&members, self.engine.this_node());
        let root_rank = Self::group_rank(&members, root);
        let to_node = |rank: NodeId| members[rank.as_u32() as usize];

        let child_ranks = tree_children(NodeId::new(this_rank), NodeId::new(root_rank), n);
        let children = child_ranks.into_iter().map(to_node).collect();
        let parent = tree_parent(NodeId::new(this_rank), NodeId::new(root_rank), n).map(to_node);
        (children, parent)
    }

    /// Contribute this node's value toward reduction `(group, id)`,
    /// combining with `combine` (must be commutative and associative)
    /// and, if this node turns out to hold the final
    /// result, invoking `callback`.
    ///
    /// # Panics
    ///
    /// Panics if this node has already contributed to `(group, id)` —
    /// each participant contributes exactly once per reduction.
    pub fn contribute<T, F, C>(self: &Arc<Self>, group: GroupId, id: ReductionId, value: T, combine: F, root: NodeId, callback: Option<C>)
    where
        T: Payload + 'static,
        F: Fn(T, T) -> T + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let (children, parent) = self.tree_shape(group, root);
        let bytes = value.pack().expect("reduction contribution encode");
        let reducer: Box<dyn ErasedReducer> =
            Box::new(TypedReducer { combine_fn: combine, callback, _marker: PhantomData::<fn() -> T> });

        let mut states = self.states.lock().unwrap();
        let state = states
            .entry((group, id))
            .or_insert_with(|| ReductionState::new(children.len(), root));

        if state.local.is_some() {
            drop(states);
            panic!("node {} already contributed to reduction ({group:?}, {id:?})", self.engine.this_node());
        }
        state.phase = ReductionPhase::Accumulating;
        state.reducer = Some(reducer);
        state.local = Some(bytes.clone());
        state.accumulator = bytes;

        let buffered = std::mem::take(&mut state.buffered);
        for child_bytes in buffered {
            state.accumulator = state.reducer.as_ref().unwrap().combine(std::mem::take(&mut state.accumulator), child_bytes);
        }

        let done = state.ready_to_complete();
        drop(states);
        if done {
            self.complete(group, id, parent);
        }
    }

    fn on_contribution(self: &Arc<Self>, msg: ReduceContribution, _from: NodeId) {
        let parent_once;
        let done;
        {
            let mut states = self.states.lock().unwrap();
            let (children_len, root) = {
                let members = self.group_members(msg.group);
                let n = NumNodes(members.len() as u32);
                let this_rank = Self::group_rank(&members, self.engine.this_node());
                let root_rank = Self::group_rank(&members, msg.root);
                (tree_children(NodeId::new(this_rank), NodeId::new(root_rank), n).len(), msg.root)
            };
            let state = states.entry((msg.group, msg.id)).or_insert_with(|| ReductionState::new(children_len, root));

            if let Some(acc) = state.local.clone() {
                let combined = state.reducer.as_ref().unwrap().combine(acc, msg.bytes);
                state.accumulator = combined;
            } else {
                state.buffered.push(msg.bytes);
            }
            state.children_reported += 1;
            done = state.ready_to_complete();
            parent_once = self.tree_shape(msg.group, msg.root).1;
        }
        if done {
            self.complete(msg.group, msg.id, parent_once);
        }
    }

    /// Destroys the state once the root has combined all children and
    /// either forwarded (non-root) or delivered the callback (root).
    fn complete(self: &Arc<Self>, group: GroupId, id: ReductionId, parent: Option<NodeId>) {
        let (result, reducer, root) = {
            let mut states = self.states.lock().unwrap();
            let mut state = states.remove(&(group, id)).expect("completing an untracked reduction");
            state.phase = if parent.is_none() { ReductionPhase::Delivered } else { ReductionPhase::Forwarded };
            (state.accumulator, state.reducer.take(), state.root)
        };

        match parent {
            Some(parent_node) => {
                self.engine.send(parent_node, self.contribute_handler, &ReduceContribution { group, id, root, bytes: result });
            }
            None => {
                rt_telemetry::REDUCTIONS_COMPLETED.inc();
                if let Some(reducer) = reducer {
                    reducer.finish(result);
                }
            }
        }
    }

    /// Errors out instead of panicking for callers that want to probe
    /// group membership ahead of a contribution (e.g. a wiring sanity
    /// check at process startup).
    ///
    /// # Errors
    ///
    /// See [`ReduceError`].
    pub fn check_membership(&self, group: GroupId) -> Result<(), ReduceError> {
        let members = self.groups.lock().unwrap().get(&group).cloned().ok_or(ReduceError::UnknownGroup(group))?;
        if members.contains(&self.engine.this_node()) {
            Ok(())
        } else {
            Err(ReduceError::NotAGroupMember(group))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_transport::local::LocalCluster;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn make_cluster(n: u32) -> (Vec<Arc<Engine>>, Vec<Arc<ReductionManager>>) {
        let cluster = LocalCluster::new(n);
        let mut engines = Vec::new();
        let mut managers = Vec::new();
        for i in 0..n {
            let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(i))));
            engine.set_accounting(Arc::new(rt_engine::NullAccounting));
            managers.push(ReductionManager::new(Arc::clone(&engine)));
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
    fn four_node_plus_int_reduction_to_node_zero_yields_ten() {
        let (engines, managers) = make_cluster(4);
        let result = Arc::new(AtomicI64::new(-1));

        for (i, mgr) in managers.iter().enumerate() {
            let value = (i as i64) + 1;
            let result = if i == 0 { Some(Arc::clone(&result)) } else { None };
            let callback = result.map(|r| move |v: i64| r.store(v, Ordering::SeqCst));
            mgr.contribute(DEFAULT_GROUP, ReductionId(1), value, |a, b| a + b, NodeId::new(0), callback);
        }
        drain_all(&engines, 20);

        assert_eq!(result.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn non_root_participants_receive_no_callback() {
        let (engines, managers) = make_cluster(3);
        let calls = Arc::new(AtomicI64::new(0));

        for (i, mgr) in managers.iter().enumerate() {
            if i == 0 {
                mgr.contribute(DEFAULT_GROUP, ReductionId(2), 5i32, |a, b| a + b, NodeId::new(0), None::<fn(i32)>);
            } else {
                let calls = Arc::clone(&calls);
                let callback = if i == 1 { Some(move |_: i32| { calls.fetch_add(1, Ordering::SeqCst); }) } else { None };
                mgr.contribute(DEFAULT_GROUP, ReductionId(2), 5i32, |a, b| a + b, NodeId::new(0), callback);
            }
        }
        drain_all(&engines, 20);

        assert_eq!(calls.load(Ordering::SeqCst), 0, "only the declared root's callback may fire");
    }

    #[test]
    fn custom_group_reduces_over_its_own_subset() {
        let (engines, managers) = make_cluster(4);
        let group = GroupId(9);
        let members = vec![NodeId::new(1), NodeId::new(3)];
        managers[1].register_group(group, members.clone());
        managers[3].register_group(group, members);

        let result = Arc::new(AtomicI64::new(-1));
        let result_clone = Arc::clone(&result);
        managers[1].contribute(group, ReductionId(3), 2i64, |a, b| a + b, NodeId::new(1), Some(move |v: i64| result_clone.store(v, Ordering::SeqCst)));
        managers[3].contribute(group, ReductionId(3), 9i64, |a, b| a + b, NodeId::new(1), None::<fn(i64)>);
        drain_all(&engines, 20);

        assert_eq!(result.load(Ordering::SeqCst), 11);
    }
}
