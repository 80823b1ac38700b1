//! End-to-end scenarios that cross
//! manager-crate boundaries, exercising full choreographies rather than
//! single-subsystem units.
//! Each crate's own `#[cfg(test)]` module already proves its mechanism in
//! isolation; these tests reproduce expected literal numbers so a
//! reviewer can check them directly.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rt_collection::CollectionManager;
use rt_engine::{Engine, NullAccounting};
use rt_epoch::EpochManager;
use rt_location::LocationManager;
use rt_rdma::RdmaManager;
use rt_reduce::ReductionManager;
use rt_transport::local::LocalCluster;
use rt_types::{block_map, Index, Linearization, NodeId, NumNodes, Payload, ReductionId, RegistryKind, DEFAULT_GROUP};

fn drain_all(engines: &[Arc<Engine>], rounds: usize) {
    for _ in 0..rounds {
        for e in engines {
            e.run_scheduler();
        }
    }
}

fn make_epoch_cluster(n: u32) -> (Arc<LocalCluster>, Vec<Arc<Engine>>, Vec<Arc<EpochManager>>) {
    let cluster = LocalCluster::new(n);
    let mut engines = Vec::new();
    let mut managers = Vec::new();
    for i in 0..n {
        let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(i))));
        let manager = EpochManager::new(Arc::clone(&engine));
        engine.set_accounting(manager.clone());
        engines.push(engine);
        managers.push(manager);
    }
    // Single-process simulation: nothing else drives the other nodes'
    // engines, so each manager's wait loop needs every peer registered
    // to pump them cooperatively (`EpochManager::run_in_epoch_collective`).
    for m in &managers {
        let others: Vec<_> = managers.iter().filter(|o| !Arc::ptr_eq(*o, m)).cloned().collect();
        m.set_peers(others);
    }
    (cluster, engines, managers)
}

/// S1 — broadcast completeness. 4 nodes, node 0 broadcasts; nodes 1..3
/// each invoke the handler exactly once, node 0 does not, and the
/// wrapping epoch terminates.
#[test]
fn s1_broadcast_completeness() {
    let (_cluster, engines, managers) = make_epoch_cluster(4);

    // Every engine registers the handler in the same order, so the
    // packed `HandlerId` is identical across nodes — the precondition
    // `Engine::broadcast` relies on to reach the same thunk everywhere.
    let hit_counts: Vec<Arc<AtomicU32>> = (0..4).map(|_| Arc::new(AtomicU32::new(0))).collect();
    let mut handler = None;
    for (i, engine) in engines.iter().enumerate() {
        let counter = Arc::clone(&hit_counts[i]);
        let h = engine.registry().lock().unwrap().register(
            rt_types::RegistryKind::Plain,
            "s1::broadcast_target",
            false,
            false,
            false,
            false,
            0,
            Box::new(move |_bytes: &[u8], _from: NodeId| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handler = Some(h);
    }
    let handler = handler.unwrap();

    let e0 = Arc::clone(&engines[0]);
    let epoch = managers[0].run_in_epoch_collective(|| {
        e0.broadcast(handler, &0u8);
    });

    drain_all(&engines, 20);
    for m in &managers {
        m.tick();
    }
    drain_all(&engines, 20);

    assert!(managers[0].is_terminated(epoch));
    assert_eq!(hit_counts[0].load(Ordering::SeqCst), 0, "root must not invoke its own broadcast handler");
    for counter in &hit_counts[1..] {
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

fn block_map_fn(index: Index, range: Index, n: NumNodes) -> NodeId {
    block_map(index.linearize_colmaj(range), range.size(), n.get())
}

/// S2 — location forwarding after migration. 8 elements over 2 nodes,
/// block-mapped. Send to `proxy[5]` (home node 1), migrate element 5 to
/// node 0, then a second send from node 1 must reach node 0; the
/// element's internal counter equals the number of messages delivered
/// to it.
#[test]
fn s2_location_forwarding_after_migration() {
    let n = 2;
    let cluster = LocalCluster::new(n);
    let range = Index::one(8);

    let make_node = |i: u32| {
        let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(i))));
        engine.set_accounting(Arc::new(NullAccounting));
        let location = LocationManager::new(Arc::clone(&engine), NumNodes(n).default_hop_cap());
        let reduce = ReductionManager::new(Arc::clone(&engine));
        (engine, location, reduce)
    };
    let (e0, l0, r0) = make_node(0);
    let (e1, l1, r1) = make_node(1);

    let c0 = CollectionManager::construct_uniform(
        Arc::clone(&e0), l0, r0, DEFAULT_GROUP, range, Linearization::ColumnMajor,
        block_map_fn, |_index| 0i64, |value: &mut i64, _msg: i64, _i, _f| *value += 1,
    );
    let c1 = CollectionManager::construct_uniform(
        Arc::clone(&e1), Arc::clone(&l1), r1, DEFAULT_GROUP, range, Linearization::ColumnMajor,
        block_map_fn, |_index| 0i64, |value: &mut i64, _msg: i64, _i, _f| *value += 1,
    );

    let target = Index::one(5);
    assert_eq!(block_map_fn(target, range, NumNodes(n)), NodeId::new(1), "index 5 of 8 over 2 nodes starts on node 1");

    c0.send(target, 0);
    drain_all(&[Arc::clone(&e0), Arc::clone(&e1)], 10);
    assert!(c1.is_resident(target));

    c1.migrate(target, NodeId::new(0));
    drain_all(&[Arc::clone(&e0), Arc::clone(&e1)], 10);
    assert!(c0.is_resident(target));
    assert!(!c1.is_resident(target));

    c1.send(target, 0);
    drain_all(&[Arc::clone(&e0), Arc::clone(&e1)], 10);

    // Every other element's counter is still 0 (no message ever targeted
    // it), so a plain sum over both nodes' local elements isolates
    // element 5's count: one message while resident on node 1, one more
    // after migrating to node 0.
    let total = Arc::new(AtomicI64::new(-1));
    let total_clone = Arc::clone(&total);
    c0.reduce(ReductionId(1), 0i64, |v: &i64| *v, |a, b| a + b, NodeId::new(0), Some(move |v: i64| total_clone.store(v, Ordering::SeqCst)));
    c1.reduce(ReductionId(1), 0i64, |v: &i64| *v, |a, b| a + b, NodeId::new(0), None::<fn(i64)>);
    drain_all(&[e0, e1], 20);

    assert_eq!(total.load(Ordering::SeqCst), 2, "one message before migration, one after");
}

/// S3 — collective reduction plus-int. 4 nodes each contribute `node+1`;
/// reducing with `plus` to node 0 yields 10, exactly one callback
/// invocation at the root, none elsewhere.
#[test]
fn s3_collective_reduction_plus_int() {
    let n = 4;
    let cluster = LocalCluster::new(n);
    let mut engines = Vec::new();
    let mut reduces = Vec::new();
    for i in 0..n {
        let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(i))));
        engine.set_accounting(Arc::new(NullAccounting));
        reduces.push(ReductionManager::new(Arc::clone(&engine)));
        engines.push(engine);
    }

    let result = Arc::new(AtomicI64::new(-1));
    let callback_count = Arc::new(AtomicUsize::new(0));
    for (i, reduce) in reduces.iter().enumerate() {
        let value = i as i64 + 1;
        let callback = if i == 0 {
            let result = Arc::clone(&result);
            let callback_count = Arc::clone(&callback_count);
            Some(move |v: i64| {
                result.store(v, Ordering::SeqCst);
                callback_count.fetch_add(1, Ordering::SeqCst);
            })
        } else {
            None
        };
        reduce.contribute(DEFAULT_GROUP, ReductionId(1), value, |a, b| a + b, NodeId::new(0), callback);
    }
    drain_all(&engines, 20);

    assert_eq!(result.load(Ordering::SeqCst), 10);
    assert_eq!(callback_count.load(Ordering::SeqCst), 1);
}

/// S4 — nested epochs. Collective epoch A wraps a rooted epoch B opened
/// on node 1, and B itself isn't quiescent on the first hop: its work
/// kicks off a 5-hop TTL random walk across the 3 nodes, each hop
/// reactively forwarding the message from inside its handler. B must not
/// terminate until all 5 hops have landed, and `run_in_epoch_collective`
/// for A returns only once both A and B have independently terminated.
#[test]
fn s4_nested_epochs() {
    let (_cluster, engines, managers) = make_epoch_cluster(3);

    let hop_count = Arc::new(AtomicUsize::new(0));
    let walk_handler = Arc::new(std::sync::OnceLock::new());
    let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(42)));
    let num_nodes = engines.len() as u32;

    for engine in &engines {
        let engine = Arc::clone(engine);
        let hop_count = Arc::clone(&hop_count);
        let walk_handler = Arc::clone(&walk_handler);
        let rng = Arc::clone(&rng);
        let handler = engine.registry().lock().unwrap().register(
            RegistryKind::Plain,
            "test::s4_walk_hop",
            false,
            false,
            false,
            false,
            0,
            Box::new(move |bytes: &[u8], _from: NodeId| {
                let ttl = u8::unpack(bytes).expect("ttl decode");
                hop_count.fetch_add(1, Ordering::SeqCst);
                if ttl > 0 {
                    let next = rng.lock().unwrap().gen_range(0..num_nodes);
                    let handler = *walk_handler.get().expect("handler registered before first dispatch");
                    engine.send(NodeId::new(next), handler, &(ttl - 1));
                }
            }),
        );
        let _ = walk_handler.set(handler);
    }

    let inner_done = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let inner_done_clone = Arc::clone(&inner_done);
    let managers_1 = Arc::clone(&managers[1]);
    let engine_1 = Arc::clone(&engines[1]);
    let walk_handler_clone = Arc::clone(&walk_handler);
    let hop_count_clone = Arc::clone(&hop_count);

    let epoch_a = managers[0].run_in_epoch_collective(move || {
        let epoch_b = managers_1.run_in_epoch_rooted(move || {
            let handler = *walk_handler_clone.get().expect("handler registered above");
            // ttl = 4 means 5 deliveries total: 4, 3, 2, 1, 0.
            engine_1.send(NodeId::new(2), handler, &4u8);
        });
        assert_eq!(hop_count_clone.load(Ordering::SeqCst), 5, "all 5 hops of the walk must land before B terminates");
        inner_done_clone.store(managers_1.is_terminated(epoch_b), Ordering::SeqCst);
    });

    drain_all(&engines, 20);
    for m in &managers {
        m.tick();
    }
    drain_all(&engines, 20);

    assert!(inner_done.load(Ordering::SeqCst), "epoch B must terminate before A's action returns");
    assert_eq!(hop_count.load(Ordering::SeqCst), 5, "the walk must not have grown extra hops after A settles");
    assert!(managers[0].is_terminated(epoch_a));
}

/// S5 — RDMA get. Node 0 registers 64 doubles `d[i] = i+1`; nodes 1 and
/// 2 each `get` the first 3 doubles and see `{1.0, 2.0, 3.0}`.
#[test]
fn s5_rdma_get() {
    let n = 3;
    let cluster = LocalCluster::new(n);
    let mut engines = Vec::new();
    let mut managers = Vec::new();
    for i in 0..n {
        let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(i))));
        engine.set_accounting(Arc::new(NullAccounting));
        managers.push(RdmaManager::new(Arc::clone(&engine)));
        engines.push(engine);
    }

    let doubles: Vec<f64> = (0..64).map(|i| i as f64 + 1.0).collect();
    let bytes: Vec<u8> = doubles.iter().flat_map(|d| d.to_le_bytes()).collect();
    let handle = managers[0].register(bytes);

    let results: Vec<_> = (1..n as usize).map(|_| Arc::new(Mutex::new(Vec::new()))).collect();
    for (slot, mgr) in results.iter().zip(managers[1..].iter()) {
        let slot = Arc::clone(slot);
        mgr.get(handle, NodeId::new(0), 24, 0, move |bytes| {
            *slot.lock().unwrap() = bytes;
        });
    }
    drain_all(&engines, 10);

    for slot in &results {
        let raw = slot.lock().unwrap();
        let values: Vec<f64> = raw.chunks_exact(8).map(|c| f64::from_le_bytes(c.try_into().unwrap())).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }
}

/// S6 — index linearization stress. For range `(3, 9, 23)`, every flat
/// index in `[0, 3*9*23)` round-trips through delinearize/linearize
/// exactly once, in both column-major and row-major order. Covered
/// exhaustively (not just via property sampling), complementing
/// `rt-types`'s `proptest` coverage of the same law.
#[test]
fn s6_index_linearization_stress() {
    let range = Index::three(3, 9, 23);
    let total = range.size();

    let mut seen_colmaj = vec![false; total as usize];
    let mut seen_rowmaj = vec![false; total as usize];
    for x in 0..3 {
        for y in 0..9 {
            for z in 0..23 {
                let index = Index::three(x, y, z);
                let flat = index.linearize_colmaj(range);
                assert_eq!(Index::delinearize_colmaj(flat, range), index);
                seen_colmaj[flat as usize] = true;
            }
        }
    }
    for z in 0..23 {
        for y in 0..9 {
            for x in 0..3 {
                let index = Index::three(x, y, z);
                let flat = index.linearize_rowmaj(range);
                assert_eq!(Index::delinearize_rowmaj(flat, range), index);
                seen_rowmaj[flat as usize] = true;
            }
        }
    }

    assert!(seen_colmaj.iter().all(|&seen| seen));
    assert!(seen_rowmaj.iter().all(|&seen| seen));
}
