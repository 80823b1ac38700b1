//! Fluent construction builder. A thin accumulator over
//! [`crate::collection::CollectionManager::construct_list`] — every
//! method takes `self` by value and returns it, a chain-call
//! shape so a caller writes one expression instead of pre-building a
//! `Vec` by hand.

use crate::collection::CollectionManager;
use rt_engine::Engine;
use rt_location::LocationManager;
use rt_reduce::ReductionManager;
use rt_types::{GroupId, Index, Linearization, Payload};
use std::sync::Arc;

/// Accumulates `(index, value)` pairs for one node's share of a
/// collection before handing them to `construct_list` at [`Self::wait`].
/// Nothing is registered with the engine or location manager until
/// `wait()` runs.
pub struct CollectionBuilder<T, M, F>
where
    T: Send + 'static,
    M: Payload + Send + 'static,
    F: Fn(&mut T, M, Index, rt_types::NodeId) + Send + Sync + 'static,
{
    engine: Arc<Engine>,
    location: Arc<LocationManager>,
    reduce: Arc<ReductionManager>,
    group: GroupId,
    range: Index,
    linearization: Linearization,
    dispatch: F,
    items: Vec<(Index, T)>,
}

impl<T, M, F> CollectionBuilder<T, M, F>
where
    T: Send + 'static,
    M: Payload + Send + 'static,
    F: Fn(&mut T, M, Index, rt_types::NodeId) + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        engine: Arc<Engine>,
        location: Arc<LocationManager>,
        reduce: Arc<ReductionManager>,
        group: GroupId,
        range: Index,
        linearization: Linearization,
        dispatch: F,
    ) -> Self {
        Self { engine, location, reduce, group, range, linearization, dispatch, items: Vec::new() }
    }

    /// Insert one element at `index`, constructed locally on this node.
    #[must_use]
    pub fn list_insert_here(mut self, index: Index, value: T) -> Self {
        self.items.push((index, value));
        self
    }

    /// Insert every index a caller-supplied iterator yields, each built
    /// by `init`. The counterpart of repeated `list_insert_here` calls
    /// for a contiguous local range, without forcing the caller to
    /// collect a `Vec` first.
    #[must_use]
    pub fn bulk_insert(mut self, indices: impl IntoIterator<Item = Index>, mut init: impl FnMut(Index) -> T) -> Self {
        for index in indices {
            let value = init(index);
            self.items.push((index, value));
        }
        self
    }

    /// Finish construction: every node calls `wait()` at the same
    /// logical point in its SPMD control flow; the directory exchange
    /// and `finished_inserting()` of `construct_list` make this a
    /// collective barrier.
    #[must_use]
    pub fn wait(self) -> Arc<CollectionManager<T, M, F>> {
        CollectionManager::construct_list(
            self.engine,
            self.location,
            self.reduce,
            self.group,
            self.range,
            self.linearization,
            self.items,
            self.dispatch,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_transport::local::LocalCluster;
    use rt_types::{NodeId, NumNodes, DEFAULT_GROUP};

    #[test]
    fn chained_inserts_land_in_construct_list() {
        let cluster = LocalCluster::new(1);
        let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(0))));
        engine.set_accounting(Arc::new(rt_engine::NullAccounting));
        let location = LocationManager::new(Arc::clone(&engine), NumNodes(1).default_hop_cap());
        let reduce = ReductionManager::new(Arc::clone(&engine));
        let range = Index::one(4);

        let mgr = CollectionBuilder::new(
            Arc::clone(&engine), location, reduce, DEFAULT_GROUP, range, Linearization::ColumnMajor,
            |value: &mut i64, msg: i64, _index, _from| *value += msg,
        )
        .list_insert_here(Index::one(0), 10)
        .bulk_insert([Index::one(1), Index::one(2)], |index| index.component(0) * 100)
        .wait();

        assert_eq!(mgr.local_len(), 3);
        assert!(mgr.is_resident(Index::one(0)));
        assert!(mgr.is_resident(Index::one(1)));
        assert!(mgr.is_resident(Index::one(2)));
    }
}
