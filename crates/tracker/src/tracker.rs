//! The tracker reactor.
//!
//! Collects periodic status reports from nodes, maintains a per-partition
//! membership view, and pushes generation-stamped topology instructions
//! back. Recomputation is debounced: a burst of dirtying reports collapses
//! into one recompute per partition, no later than `max_wait` after the
//! first report of the burst.
//!
//! The stabilization timer is a deadline value recomputed each loop
//! iteration and fed into the reactor's `select!` — there are no hidden
//! timer callbacks to race against.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use rivulet_distance::DistanceIndex;
use rivulet_primitives::{NodeId, StreamPartition, TopologyInstruction};
use rivulet_transport::{Transport, TransportEvent};
use rivulet_wire::{Message, PeerDiscoveryRequest, PeerDiscoveryResponse, StatusReport};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    TrackerConfig, metrics::TrackerMetrics, topology::compute_topology, view::PartitionView,
};

const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Pending stabilization window for one dirty partition.
struct DirtyWindow {
    /// When the partition first became dirty (bounds staleness).
    first: Instant,
    /// When it was last dirtied (bounds the quiet period).
    last: Instant,
}

enum TrackerCommand {
    Partitions {
        reply: oneshot::Sender<Vec<StreamPartition>>,
    },
    Participants {
        stream_partition: StreamPartition,
        reply: oneshot::Sender<Vec<NodeId>>,
    },
    Shutdown,
}

/// Cloneable handle to a running tracker reactor.
#[derive(Clone)]
pub struct TrackerHandle {
    commands: mpsc::Sender<TrackerCommand>,
}

impl TrackerHandle {
    /// Partitions the tracker currently has a view of.
    pub async fn partitions(&self) -> Vec<StreamPartition> {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(TrackerCommand::Partitions { reply })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Participants of one partition (diagnostics).
    pub async fn participants(&self, stream_partition: StreamPartition) -> Vec<NodeId> {
        let (reply, rx) = oneshot::channel();
        if self
            .commands
            .send(TrackerCommand::Participants {
                stream_partition,
                reply,
            })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Stop the reactor.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(TrackerCommand::Shutdown).await;
    }
}

/// A tracker: one reactor owning the topology view for every partition it
/// coordinates.
pub struct Tracker<T: Transport> {
    id: NodeId,
    config: TrackerConfig,
    transport: Arc<T>,
    views: HashMap<StreamPartition, PartitionView>,
    /// Partitions each node declared in its most recent report; omissions
    /// against this set mean the node left a partition.
    node_partitions: HashMap<NodeId, HashSet<StreamPartition>>,
    /// All known nodes, for answering peer discovery requests.
    discovery: DistanceIndex,
    dirty: HashMap<StreamPartition, DirtyWindow>,
    metrics: TrackerMetrics,
    commands_rx: mpsc::Receiver<TrackerCommand>,
    transport_rx: mpsc::Receiver<TransportEvent>,
}

impl<T: Transport> Tracker<T> {
    /// Create a tracker reactor and its handle.
    pub fn new(
        id: NodeId,
        config: TrackerConfig,
        transport: T,
        transport_rx: mpsc::Receiver<TransportEvent>,
    ) -> (Self, TrackerHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let tracker = Self {
            id,
            discovery: DistanceIndex::with_bucket_capacity(id, config.bucket_capacity),
            config,
            transport: Arc::new(transport),
            views: HashMap::new(),
            node_partitions: HashMap::new(),
            dirty: HashMap::new(),
            metrics: TrackerMetrics::default(),
            commands_rx,
            transport_rx,
        };
        (tracker, TrackerHandle {
            commands: commands_tx,
        })
    }

    /// The tracker's own id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Spawn the reactor onto the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the reactor until shutdown.
    pub async fn run(mut self) {
        info!(id = %self.id, "tracker started");
        let mut sweep = time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let deadline = self.next_stabilize_deadline();
            tokio::select! {
                maybe = self.commands_rx.recv() => match maybe {
                    Some(TrackerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                maybe = self.transport_rx.recv() => match maybe {
                    Some(event) => self.handle_transport_event(event).await,
                    None => break,
                },
                _ = sweep.tick() => self.sweep(),
                _ = stabilize_timer(deadline) => self.stabilize().await,
            }
        }
        debug!(id = %self.id, "tracker reactor stopped");
    }

    fn handle_command(&mut self, command: TrackerCommand) {
        match command {
            TrackerCommand::Partitions { reply } => {
                let _ = reply.send(self.views.keys().cloned().collect());
            }
            TrackerCommand::Participants {
                stream_partition,
                reply,
            } => {
                let participants = self
                    .views
                    .get(&stream_partition)
                    .map(|view| view.participant_ids().into_iter().collect())
                    .unwrap_or_default();
                let _ = reply.send(participants);
            }
            TrackerCommand::Shutdown => unreachable!("handled by the reactor loop"),
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame { from, bytes } => {
                let message = match rivulet_wire::decode(&bytes) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(%from, %err, "dropped undecodable envelope");
                        return;
                    }
                };
                match message {
                    Message::StatusReport(report) => self.handle_report(from, report),
                    Message::PeerDiscoveryRequest(request) => {
                        self.handle_discovery(from, request).await;
                    }
                    other => {
                        debug!(%from, kind = %other.kind(), "ignoring node-bound message");
                    }
                }
            }
            TransportEvent::Disconnected { peer } => self.handle_disconnected(peer),
        }
    }

    /// Update the view from a status report and mark the affected
    /// partitions dirty.
    fn handle_report(&mut self, from: NodeId, report: StatusReport) {
        self.metrics.reports_total.increment(1);
        self.discovery.insert(from);

        let reported: HashSet<StreamPartition> = report
            .partitions
            .iter()
            .map(|status| status.stream_partition.clone())
            .collect();
        let previous = self
            .node_partitions
            .insert(from, reported.clone())
            .unwrap_or_default();

        let mut to_dirty: Vec<StreamPartition> = Vec::new();

        // Partitions omitted since the last report: the node left them.
        for stream_partition in previous.difference(&reported) {
            if let Some(view) = self.views.get_mut(stream_partition) {
                if view.remove(&from) {
                    to_dirty.push(stream_partition.clone());
                }
            }
        }

        let base = self.id;
        let bucket_capacity = self.config.bucket_capacity;
        for status in report.partitions {
            let view = self
                .views
                .entry(status.stream_partition.clone())
                .or_insert_with(|| PartitionView::new(base, bucket_capacity));
            view.upsert(from, status.neighbors, report.load);
            to_dirty.push(status.stream_partition);
        }

        for stream_partition in to_dirty {
            self.mark_dirty(stream_partition);
        }
    }

    async fn handle_discovery(&mut self, from: NodeId, request: PeerDiscoveryRequest) {
        self.metrics.discovery_requests_total.increment(1);
        let peers: Vec<NodeId> = self
            .discovery
            .nearest(&request.target, request.k as usize)
            .into_iter()
            .filter(|peer| *peer != from)
            .collect();
        debug!(%from, target = %request.target, found = peers.len(), "peer discovery");
        self.send_to(from, &Message::PeerDiscoveryResponse(PeerDiscoveryResponse { peers }))
            .await;
    }

    /// A node's connection dropped: treat it like a timeout eviction.
    fn handle_disconnected(&mut self, peer: NodeId) {
        let Some(partitions) = self.node_partitions.remove(&peer) else {
            return;
        };
        debug!(%peer, partitions = partitions.len(), "node disconnected");
        self.discovery.remove(&peer);
        for stream_partition in partitions {
            if let Some(view) = self.views.get_mut(&stream_partition) {
                view.remove(&peer);
            }
            self.mark_dirty(stream_partition);
        }
    }

    fn mark_dirty(&mut self, stream_partition: StreamPartition) {
        let now = Instant::now();
        self.dirty
            .entry(stream_partition)
            .and_modify(|window| window.last = now)
            .or_insert(DirtyWindow {
                first: now,
                last: now,
            });
    }

    /// The moment the next dirty partition is due for recomputation:
    /// `debounce_wait` after its last dirtying event, but never more than
    /// `max_wait` after its first.
    fn next_stabilize_deadline(&self) -> Option<Instant> {
        self.dirty
            .values()
            .map(|window| self.window_deadline(window))
            .min()
    }

    fn window_deadline(&self, window: &DirtyWindow) -> Instant {
        (window.first + self.config.max_wait).min(window.last + self.config.debounce_wait)
    }

    /// Recompute every partition whose stabilization deadline has passed.
    async fn stabilize(&mut self) {
        let now = Instant::now();
        let due: Vec<StreamPartition> = self
            .dirty
            .iter()
            .filter(|(_, window)| self.window_deadline(window) <= now)
            .map(|(stream_partition, _)| stream_partition.clone())
            .collect();

        for stream_partition in due {
            self.dirty.remove(&stream_partition);
            self.recompute(&stream_partition).await;
        }
    }

    /// Compute and push the target topology for one partition.
    async fn recompute(&mut self, stream_partition: &StreamPartition) {
        let max_neighbors = self.config.max_neighbors_per_node;
        let Some(view) = self.views.get_mut(stream_partition) else {
            return;
        };
        if view.is_empty() {
            self.views.remove(stream_partition);
            return;
        }

        view.generation = view.generation.next();
        let generation = view.generation;
        let participants = view.participant_ids();
        let targets = compute_topology(&view.index, &participants, max_neighbors);
        self.metrics.recomputations_total.increment(1);

        // Only push instructions whose target set actually changed; nodes
        // report after every change, and re-pushing identical sets would
        // keep the partition dirty forever.
        let mut pushes: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        for (node, target) in targets {
            let Some(status) = view.participants.get_mut(&node) else {
                continue;
            };
            if status.last_instructed.as_ref() == Some(&target) {
                continue;
            }
            status.last_instructed = Some(target.clone());
            pushes.push((node, target.into_iter().collect()));
        }

        debug!(
            partition = %stream_partition,
            %generation,
            participants = participants.len(),
            pushes = pushes.len(),
            "recomputed topology"
        );

        for (node, target_neighbors) in pushes {
            let instruction = Message::TopologyInstruction(TopologyInstruction {
                stream_partition: stream_partition.clone(),
                target_neighbors,
                generation,
            });
            self.send_to(node, &instruction).await;
            self.metrics.instructions_sent_total.increment(1);
        }
    }

    /// Evict nodes that missed their report deadline and log a status
    /// line.
    fn sweep(&mut self) {
        let timeout = self.config.node_timeout;
        let mut evictions: Vec<(NodeId, StreamPartition)> = Vec::new();
        for (stream_partition, view) in &mut self.views {
            let dead: Vec<NodeId> = view
                .participants
                .iter()
                .filter(|(_, status)| status.last_seen.elapsed() > timeout)
                .map(|(node, _)| *node)
                .collect();
            for node in dead {
                view.remove(&node);
                evictions.push((node, stream_partition.clone()));
            }
        }

        for (node, stream_partition) in evictions {
            warn!(%node, partition = %stream_partition, "evicting silent node");
            self.metrics.nodes_evicted_total.increment(1);
            let node_gone = self
                .node_partitions
                .get_mut(&node)
                .map(|set| {
                    set.remove(&stream_partition);
                    set.is_empty()
                })
                .unwrap_or(false);
            if node_gone {
                self.node_partitions.remove(&node);
                self.discovery.remove(&node);
            }
            self.mark_dirty(stream_partition);
        }

        debug!(
            partitions = self.views.len(),
            nodes = self.node_partitions.len(),
            dirty = self.dirty.len(),
            "tracker status"
        );
    }

    async fn send_to(&self, node: NodeId, message: &Message) {
        let frame = match rivulet_wire::encode(message) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "failed to encode tracker message");
                return;
            }
        };
        if let Err(err) = self.transport.send(node, frame).await {
            // The sweep will evict the node if it stays unreachable.
            debug!(%node, %err, "instruction send failed");
        }
    }
}

async fn stabilize_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
