//! # rt-engine
//!
//! The scheduler and active-message engine: a
//! single-threaded, re-entrant run loop that progresses the transport,
//! drains ready work units through the handler registry, and enforces
//! epoch context on outgoing messages. [`Engine`] is the "single runtime
//! context pointer" every other manager crate is built around (Design
//! Notes, "Global state").

pub mod accounting;
pub mod message_engine;
pub mod registry;
pub mod scheduler;

pub use accounting::{EpochAccounting, NullAccounting};
pub use registry::{HandlerRegistry, Thunk};
pub use scheduler::{Engine, WorkUnit, DEFAULT_DRAIN_BATCH};

#[cfg(test)]
mod tests {
    use super::*;
    use rt_transport::local::LocalCluster;
    use rt_types::{HandlerFields, HandlerId, NodeId, RegistryKind};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn make_pair() -> (Arc<Engine>, Arc<Engine>) {
        let cluster = LocalCluster::new(2);
        let e0 = Engine::new(Arc::new(cluster.transport_for(NodeId::new(0))));
        let e1 = Engine::new(Arc::new(cluster.transport_for(NodeId::new(1))));
        e0.set_accounting(Arc::new(NullAccounting));
        e1.set_accounting(Arc::new(NullAccounting));
        (e0, e1)
    }

    #[test]
    fn self_send_dispatches_inline_without_transport() {
        let cluster = LocalCluster::new(1);
        let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(0))));
        engine.set_accounting(Arc::new(NullAccounting));

        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = Arc::clone(&hits);
        let handler = engine.registry().lock().unwrap().register(
            RegistryKind::Plain,
            "test::self_send",
            false,
            false,
            false,
            false,
            0,
            Box::new(move |_bytes: &[u8], _from: NodeId| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        engine.send(NodeId::new(0), handler, &42u32);
        engine.run_scheduler();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cross_node_send_is_delivered_after_scheduler_runs() {
        let (e0, e1) = make_pair();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = Arc::clone(&hits);
        let handler = e1.registry().lock().unwrap().register(
            RegistryKind::Plain,
            "test::remote",
            false,
            false,
            false,
            false,
            0,
            Box::new(move |_bytes: &[u8], _from: NodeId| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        e0.send(NodeId::new(1), handler, &7u32);
        assert_eq!(hits.load(Ordering::SeqCst), 0, "not yet delivered before scheduling");
        e1.run_scheduler();
        e1.run_scheduler();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn post_continuation_fires_after_completion() {
        let cluster = LocalCluster::new(1);
        let engine = Engine::new(Arc::new(cluster.transport_for(NodeId::new(0))));
        engine.set_accounting(Arc::new(NullAccounting));
        let handler = HandlerId::pack(HandlerFields {
            auto: false,
            functor: false,
            traced: false,
            control: 0,
            base_msg_derived: false,
            kind: RegistryKind::Plain,
            identifier: 0,
        });
        engine.registry().lock().unwrap().register(
            RegistryKind::Plain,
            "test::noop",
            false,
            false,
            false,
            false,
            0,
            Box::new(|_bytes: &[u8], _from: NodeId| {}),
        );
        let fired = Arc::new(AtomicU32::new(0));
        let fired_clone = Arc::clone(&fired);
        let event = engine.send(NodeId::new(0), handler, &1u8);
        engine.post_continuation(event, Box::new(move || { fired_clone.fetch_add(1, Ordering::SeqCst); }));
        assert_eq!(fired.load(Ordering::SeqCst), 1, "self-sends complete synchronously");
    }

    #[test]
    fn broadcast_reaches_every_other_node_exactly_once() {
        let cluster = LocalCluster::new(4);
        let engines: Vec<_> = (0..4)
            .map(|i| {
                let e = Engine::new(Arc::new(cluster.transport_for(NodeId::new(i))));
                e.set_accounting(Arc::new(NullAccounting));
                e
            })
            .collect();
        let counts: Vec<_> = (0..4).map(|_| Arc::new(AtomicU32::new(0))).collect();
        let handlers: Vec<_> = engines
            .iter()
            .zip(&counts)
            .map(|(e, c)| {
                let c = Arc::clone(c);
                e.registry().lock().unwrap().register(
                    RegistryKind::Plain,
                    "test::bcast",
                    false,
                    false,
                    false,
                    false,
                    0,
                    Box::new(move |_b: &[u8], _f: NodeId| {
                        c.fetch_add(1, Ordering::SeqCst);
                    }),
                )
            })
            .collect();

        engines[0].broadcast(handlers[0], &0u8);
        for _ in 0..8 {
            for e in &engines {
                e.run_scheduler();
            }
        }

        assert_eq!(counts[0].load(Ordering::SeqCst), 0, "root does not receive its own broadcast");
        for c in &counts[1..] {
            assert_eq!(c.load(Ordering::SeqCst), 1);
        }
    }
}
