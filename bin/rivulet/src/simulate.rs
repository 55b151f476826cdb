//! Local in-memory network simulation.
//!
//! Stands in for the out-of-scope wire transports: a tracker and N nodes
//! run as real reactors connected through [`rivulet_local::MemoryNetwork`],
//! a publisher injects stamped messages, and the delivery counts are
//! summarized at the end.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;
use eyre::Result;
use parking_lot::Mutex;
use rivulet_local::MemoryNetwork;
use rivulet_node::{Node, NodeConfig, NodeHandle};
use rivulet_primitives::{ChainKey, ChainStamper, NodeId, StreamPartition};
use rivulet_tracker::{Tracker, TrackerConfig};
use tracing::{info, warn};

use crate::cli::simulate_args::SimulateArgs;

pub(crate) async fn run(args: SimulateArgs) -> Result<()> {
    let network = MemoryNetwork::new();

    // Tracker first, so node bootstrap finds it immediately.
    let tracker_id = NodeId::random();
    let (tracker_transport, tracker_rx) = network.endpoint(tracker_id);
    let tracker_config = TrackerConfig::default()
        .with_max_neighbors_per_node(args.max_neighbors_per_node)
        .with_debounce_wait(Duration::from_millis(args.debounce_wait_ms))
        .with_max_wait(Duration::from_millis(args.max_wait_ms));
    let (tracker, tracker_handle) =
        Tracker::new(tracker_id, tracker_config, tracker_transport, tracker_rx);
    tracker.spawn();
    info!(id = %tracker_id, "tracker running");

    let partitions: Vec<StreamPartition> = (0..args.partitions)
        .map(|p| StreamPartition::new("demo", p))
        .collect();

    // Spawn the nodes, subscribe each to every partition and count
    // deliveries per node.
    let delivered: Arc<Mutex<HashMap<NodeId, u64>>> = Arc::new(Mutex::new(HashMap::new()));
    let mut handles: Vec<(NodeId, NodeHandle)> = Vec::new();
    for _ in 0..args.nodes {
        let node_id = NodeId::random();
        let (transport, transport_rx) = network.endpoint(node_id);
        let config =
            NodeConfig::default().with_max_neighbors_per_node(args.max_neighbors_per_node);
        let (node, handle) = Node::new(node_id, vec![tracker_id], config, transport, transport_rx);
        node.spawn();

        let sink = delivered.clone();
        handle.add_message_listener(move |_message| {
            *sink.lock().entry(node_id).or_insert(0) += 1;
        });
        for stream_partition in &partitions {
            handle.subscribe(stream_partition.clone()).await?;
        }
        handles.push((node_id, handle));
    }
    info!(nodes = handles.len(), partitions = partitions.len(), "nodes running");

    // Let the tracker wire the overlay up.
    tokio::time::sleep(Duration::from_millis(args.max_wait_ms * 2)).await;

    // The first node publishes on every partition.
    let Some((publisher_id, publisher)) = handles.first() else {
        warn!("no nodes to publish from");
        return Ok(());
    };
    let mut stampers: Vec<ChainStamper> = partitions
        .iter()
        .map(|stream_partition| {
            ChainStamper::new(ChainKey {
                stream_partition: stream_partition.clone(),
                publisher_id: publisher_id.to_string().into(),
                msg_chain_id: "main".into(),
            })
        })
        .collect();

    for seq in 1..=args.messages {
        for stamper in &mut stampers {
            let message = stamper.stamp(now_millis(), Bytes::from(format!("message {seq}")));
            publisher.publish(message).await?;
        }
        tokio::time::sleep(Duration::from_millis(args.publish_interval_ms)).await;
    }

    // Drain and summarize.
    tokio::time::sleep(Duration::from_secs(2)).await;
    let expected = args.messages * partitions.len() as u64;
    let counts: HashMap<NodeId, u64> = delivered.lock().clone();
    for (node_id, handle) in &handles {
        let count = counts.get(node_id).copied().unwrap_or(0);
        let mut neighbor_total = 0;
        for stream_partition in &partitions {
            neighbor_total += handle.neighbors(stream_partition.clone()).await?.len();
        }
        info!(
            node = %node_id,
            delivered = count,
            expected,
            neighbors = neighbor_total,
            "node summary"
        );
    }
    info!(partitions = tracker_handle.partitions().await.len(), "simulation complete");

    for (_, handle) in &handles {
        handle.shutdown().await.ok();
    }
    tracker_handle.shutdown().await;
    Ok(())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
