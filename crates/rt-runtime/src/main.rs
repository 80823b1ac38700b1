//! # Virtual-Transport Runtime — node process
//!
//! `initialize(argc, argv)` / `finalize()` are
//! the only process-bootstrap surface the core exposes, with real CLI
//! parsing and process launch left to an external collaborator. This binary is the minimal demo of that contract:
//! it spins up `VT_NUM_NODES` nodes in one process over
//! `rt_transport::local::LocalCluster`, has node 0 broadcast a counter to
//! every peer inside a collective epoch, and exits 0 once every node has
//! finalized. A real deployment hands `rt_runtime::initialize` a transport
//! backed by an actual message-passing library instead.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rt_runtime::{initialize, RuntimeConfig};
use rt_transport::local::LocalCluster;
use rt_types::{NodeId, RegistryKind};

fn default_num_nodes() -> u32 {
    std::env::var("VT_NUM_NODES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4)
}

fn run_node(cluster: Arc<LocalCluster>, node: NodeId) -> anyhow::Result<()> {
    let transport = Arc::new(cluster.transport_for(node));
    let rt = initialize(transport, RuntimeConfig::default())?;
    let engine = Arc::clone(&rt.container.engine);
    let epoch = Arc::clone(&rt.container.epoch);

    let received = Arc::new(AtomicU32::new(0));
    let received_clone = Arc::clone(&received);
    let handler = engine.registry().lock().unwrap().register(
        RegistryKind::Plain,
        "demo::ping",
        false,
        false,
        false,
        false,
        0,
        Box::new(move |bytes: &[u8], _from: NodeId| {
            let value: u32 = bincode::deserialize(bytes).expect("demo payload decodes");
            received_clone.store(value, Ordering::SeqCst);
        }),
    );

    epoch.run_in_epoch_collective(|| {
        if node == NodeId::new(0) {
            for peer in 0..engine.num_nodes().get() {
                engine.send(NodeId::new(peer), handler, &42u32);
            }
        }
    });

    tracing::info!(?node, received = received.load(Ordering::SeqCst), "demo epoch finished");
    rt.finalize();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let num_nodes = default_num_nodes();
    let cluster = LocalCluster::new(num_nodes);

    let results: Vec<anyhow::Result<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..num_nodes)
            .map(|n| {
                let cluster = Arc::clone(&cluster);
                scope.spawn(move || run_node(cluster, NodeId::new(n)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("node thread panicked")).collect()
    });

    for result in results {
        result?;
    }
    Ok(())
}
