//! The network node reactor.
//!
//! A node runs as a single logical reactor over a mix of inbound peer
//! events, timers and local API calls. Peer-facing operations (connect,
//! send, disconnect) are asynchronous relative to the reactor: connection
//! attempts run in spawned tasks that report back through an internal
//! channel, so the reactor never blocks waiting on a remote.
//!
//! Because the reactor processes one event at a time, the per-partition
//! neighbor sets and the classify→record pair on the dedup tracker need no
//! locking.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use rivulet_dedup::{Classification, DedupTracker};
use rivulet_distance::DistanceIndex;
use rivulet_primitives::{Generation, NodeId, StreamMessage, StreamPartition, TopologyInstruction};
use rivulet_wire::{Message, PartitionStatus, PeerDiscoveryRequest, StatusReport};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use crate::{
    NodeConfig, Transport, TransportEvent,
    error::NodeError,
    metrics::NodeMetrics,
    partition::{PartitionLifecycle, PartitionState},
};

const COMMAND_QUEUE_CAPACITY: usize = 256;
const INTERNAL_QUEUE_CAPACITY: usize = 256;

/// Cap on the doubling bootstrap backoff.
const BOOTSTRAP_BACKOFF_CAP: std::time::Duration = std::time::Duration::from_secs(60);

/// Callback invoked for every delivered, de-duplicated message.
pub type MessageListener = Arc<dyn Fn(&StreamMessage) + Send + Sync>;

/// Local API calls routed into the reactor.
enum NodeCommand {
    Publish(StreamMessage),
    Subscribe(StreamPartition),
    Unsubscribe(StreamPartition),
    Neighbors {
        stream_partition: StreamPartition,
        reply: oneshot::Sender<Vec<NodeId>>,
    },
    AddKnownPeers(Vec<NodeId>),
    Shutdown,
}

/// Results of spawned connection attempts.
enum InternalEvent {
    ConnectOutcome {
        stream_partition: StreamPartition,
        peer: NodeId,
        /// Generation the partition had applied when the dial started; a
        /// mismatch on completion means the attempt was superseded.
        snapshot: Option<Generation>,
        result: Result<(), crate::ConnectError>,
    },
}

/// Cloneable handle to a running node reactor.
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
    listeners: Arc<RwLock<Vec<MessageListener>>>,
}

impl NodeHandle {
    /// Inject a locally produced message into the overlay.
    pub async fn publish(&self, message: StreamMessage) -> Result<(), NodeError> {
        self.send(NodeCommand::Publish(message)).await
    }

    /// Register local interest in a partition, joining its overlay if
    /// needed.
    pub async fn subscribe(&self, stream_partition: StreamPartition) -> Result<(), NodeError> {
        self.send(NodeCommand::Subscribe(stream_partition)).await
    }

    /// Drop local interest in a partition; the node leaves the overlay
    /// when the last interest is gone.
    pub async fn unsubscribe(&self, stream_partition: StreamPartition) -> Result<(), NodeError> {
        self.send(NodeCommand::Unsubscribe(stream_partition)).await
    }

    /// Current neighbor set for a partition (diagnostics).
    pub async fn neighbors(
        &self,
        stream_partition: StreamPartition,
    ) -> Result<Vec<NodeId>, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.send(NodeCommand::Neighbors {
            stream_partition,
            reply,
        })
        .await?;
        rx.await.map_err(|_| NodeError::Stopped)
    }

    /// Feed externally discovered peers into the node's distance index.
    pub async fn add_known_peers(&self, peers: Vec<NodeId>) -> Result<(), NodeError> {
        self.send(NodeCommand::AddKnownPeers(peers)).await
    }

    /// Register a callback for every delivered, de-duplicated message.
    pub fn add_message_listener(&self, listener: impl Fn(&StreamMessage) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Stop the reactor.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.send(NodeCommand::Shutdown).await
    }

    async fn send(&self, command: NodeCommand) -> Result<(), NodeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| NodeError::Stopped)
    }
}

/// A network node: one reactor owning the per-partition overlay state.
pub struct Node<T: Transport> {
    id: NodeId,
    /// Well-known tracker ids tried in order at startup.
    trackers: Vec<NodeId>,
    /// The tracker that answered during bootstrap.
    active_tracker: Option<NodeId>,
    config: NodeConfig,
    transport: Arc<T>,
    index: DistanceIndex,
    dedup: DedupTracker,
    partitions: HashMap<StreamPartition, PartitionState>,
    /// Dials in flight, keyed by (partition, peer), valued by the
    /// generation snapshot taken when the dial started.
    pending_connects: HashMap<(StreamPartition, NodeId), Option<Generation>>,
    listeners: Arc<RwLock<Vec<MessageListener>>>,
    metrics: NodeMetrics,
    commands_rx: mpsc::Receiver<NodeCommand>,
    transport_rx: mpsc::Receiver<TransportEvent>,
    internal_tx: mpsc::Sender<InternalEvent>,
    internal_rx: mpsc::Receiver<InternalEvent>,
}

impl<T: Transport> Node<T> {
    /// Create a node reactor and its handle.
    ///
    /// `transport_rx` is the inbound side of the transport: the
    /// implementation pushes received frames and disconnect notifications
    /// into it.
    pub fn new(
        id: NodeId,
        trackers: Vec<NodeId>,
        config: NodeConfig,
        transport: T,
        transport_rx: mpsc::Receiver<TransportEvent>,
    ) -> (Self, NodeHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_QUEUE_CAPACITY);
        let listeners = Arc::new(RwLock::new(Vec::new()));

        let node = Self {
            id,
            trackers,
            active_tracker: None,
            index: DistanceIndex::new(id),
            dedup: DedupTracker::with_fingerprint_capacity(config.fingerprint_capacity),
            config,
            transport: Arc::new(transport),
            partitions: HashMap::new(),
            pending_connects: HashMap::new(),
            listeners: listeners.clone(),
            metrics: NodeMetrics::default(),
            commands_rx,
            transport_rx,
            internal_tx,
            internal_rx,
        };
        let handle = NodeHandle {
            commands: commands_tx,
            listeners,
        };
        (node, handle)
    }

    /// The node's own id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Spawn the reactor onto the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<Result<(), NodeError>> {
        tokio::spawn(self.run())
    }

    /// Run the reactor until shutdown.
    ///
    /// Fails only when the bootstrap tracker connection cannot be
    /// established; every later fault is absorbed and handled through
    /// reconciliation.
    pub async fn run(mut self) -> Result<(), NodeError> {
        let tracker = self.bootstrap().await?;
        self.active_tracker = Some(tracker);
        info!(id = %self.id, %tracker, "node started");

        let mut status = time::interval(self.config.status_report_interval);
        status.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut housekeeping = time::interval(self.config.housekeeping_interval);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe = self.commands_rx.recv() => match maybe {
                    Some(NodeCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                maybe = self.transport_rx.recv() => match maybe {
                    Some(event) => self.handle_transport_event(event).await,
                    // Transport gone: nothing left to disseminate.
                    None => break,
                },
                maybe = self.internal_rx.recv() => {
                    if let Some(event) = maybe {
                        self.handle_internal(event).await;
                    }
                },
                _ = status.tick() => self.send_status_report().await,
                _ = housekeeping.tick() => self.housekeeping(),
            }
        }

        debug!(id = %self.id, "node reactor stopped");
        Ok(())
    }

    /// Walk the configured tracker list until one answers, retrying whole
    /// rounds with doubling backoff.
    ///
    /// Peer-to-peer dials are never retried — the tracker supplies
    /// replacement neighbors — but without a tracker the node cannot join
    /// anything, so this is the one place backoff applies.
    async fn bootstrap(&self) -> Result<NodeId, NodeError> {
        let mut backoff = self.config.bootstrap_backoff;
        for attempt in 1..=self.config.bootstrap_max_attempts {
            for &tracker in &self.trackers {
                match self.transport.connect(tracker).await {
                    Ok(()) => return Ok(tracker),
                    Err(err) => {
                        warn!(%tracker, attempt, %err, "bootstrap tracker connection failed");
                    }
                }
            }
            time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2).min(BOOTSTRAP_BACKOFF_CAP);
        }
        Err(NodeError::Bootstrap(self.config.bootstrap_max_attempts))
    }

    async fn handle_command(&mut self, command: NodeCommand) {
        match command {
            NodeCommand::Publish(message) => self.handle_publish(message).await,
            NodeCommand::Subscribe(stream_partition) => {
                if let Some(state) = self.partitions.get_mut(&stream_partition) {
                    state.interest += 1;
                } else {
                    self.join_partition(stream_partition, 1).await;
                }
            }
            NodeCommand::Unsubscribe(stream_partition) => {
                let drop_partition = match self.partitions.get_mut(&stream_partition) {
                    Some(state) => {
                        state.interest = state.interest.saturating_sub(1);
                        state.interest == 0
                    }
                    None => false,
                };
                if drop_partition {
                    self.leave_partition(&stream_partition).await;
                }
            }
            NodeCommand::Neighbors {
                stream_partition,
                reply,
            } => {
                let neighbors = self
                    .partitions
                    .get(&stream_partition)
                    .map(|state| state.neighbors.iter().copied().collect())
                    .unwrap_or_default();
                let _ = reply.send(neighbors);
            }
            NodeCommand::AddKnownPeers(peers) => {
                for peer in peers {
                    self.index.insert(peer);
                }
            }
            NodeCommand::Shutdown => unreachable!("handled by the reactor loop"),
        }
    }

    async fn handle_publish(&mut self, message: StreamMessage) {
        let stream_partition = message.stream_partition().clone();
        let joined = self
            .partitions
            .get(&stream_partition)
            .map(|state| state.accepts_neighbors());
        match joined {
            Some(false) => {
                debug!(partition = %stream_partition, "publish raced partition teardown, dropped");
                return;
            }
            Some(true) => {}
            // Publishing implies interest: join on first publish.
            None => self.join_partition(stream_partition.clone(), 1).await,
        }

        self.metrics.published_total.increment(1);
        self.handle_broadcast(None, message).await;
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame { from, bytes } => self.handle_frame(from, &bytes).await,
            TransportEvent::Disconnected { peer } => self.handle_peer_disconnected(peer).await,
        }
    }

    async fn handle_frame(&mut self, from: NodeId, bytes: &[u8]) {
        let message = match rivulet_wire::decode(bytes) {
            Ok(message) => message,
            Err(err) => {
                // Fatal to this envelope only; the connection stays up.
                self.metrics.decode_errors_total.increment(1);
                warn!(%from, %err, "dropped undecodable envelope");
                return;
            }
        };

        match message {
            Message::BroadcastData(stream_message) => {
                self.handle_broadcast(Some(from), stream_message).await;
            }
            Message::TopologyInstruction(instruction) => {
                self.apply_instruction(instruction).await;
            }
            Message::PeerDiscoveryResponse(response) => {
                debug!(%from, peers = response.peers.len(), "discovery response");
                for peer in response.peers {
                    self.index.insert(peer);
                }
            }
            // Tracker-side concerns; a well-behaved peer never sends these
            // to a node.
            Message::StatusReport(_) | Message::PeerDiscoveryRequest(_) => {
                debug!(%from, kind = %message.kind(), "ignoring tracker-bound message");
            }
        }
    }

    /// Classify, deliver and flood a broadcast. `from` is `None` for
    /// locally published messages.
    async fn handle_broadcast(&mut self, from: Option<NodeId>, message: StreamMessage) {
        let Some(state) = self.partitions.get(message.stream_partition()) else {
            trace!(partition = %message.stream_partition(), "broadcast for unserved partition");
            return;
        };

        match self.dedup.classify(&message.reference) {
            Classification::Duplicate => {
                self.metrics.duplicates_dropped_total.increment(1);
                trace!(seq = message.reference.sequence_no, "duplicate dropped");
                return;
            }
            Classification::Gap { expected, actual } => {
                // Diagnostic only: flood dissemination does not stall on
                // gaps.
                self.metrics.gaps_total.increment(1);
                debug!(
                    partition = %message.stream_partition(),
                    publisher = %message.reference.chain.publisher_id,
                    expected,
                    actual,
                    "sequence gap"
                );
            }
            Classification::New => {}
        }
        self.dedup.record_delivered(&message.reference);

        // Deliver to local subscribers before forwarding.
        if state.interest > 0 {
            let listeners: Vec<MessageListener> = self.listeners.read().clone();
            for listener in &listeners {
                listener(&message);
            }
        }

        // Flood: every neighbor except the one that sent it to us. The
        // dedup cache suppresses multi-hop loops.
        let targets: Vec<NodeId> = state
            .neighbors
            .iter()
            .filter(|&&peer| Some(peer) != from)
            .copied()
            .collect();
        if targets.is_empty() {
            return;
        }

        let frame = match rivulet_wire::encode(&Message::BroadcastData(message)) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "failed to encode broadcast");
                return;
            }
        };

        let mut failed = Vec::new();
        for peer in targets {
            if let Err(err) = self.transport.send(peer, frame.clone()).await {
                debug!(%peer, %err, "forward failed");
                failed.push(peer);
            } else {
                self.metrics.forwarded_total.increment(1);
            }
        }
        for peer in failed {
            self.handle_peer_disconnected(peer).await;
        }
    }

    /// Reconcile a partition's neighbor set against a tracker instruction.
    async fn apply_instruction(&mut self, instruction: TopologyInstruction) {
        let TopologyInstruction {
            stream_partition,
            target_neighbors,
            generation,
        } = instruction;

        let Some(state) = self.partitions.get_mut(&stream_partition) else {
            debug!(partition = %stream_partition, "instruction for unserved partition");
            return;
        };
        if !state.accepts_neighbors() {
            return;
        }
        // Stale or reordered instructions are silently discarded.
        if state.applied_generation.is_some_and(|applied| generation <= applied) {
            self.metrics.stale_instructions_total.increment(1);
            debug!(partition = %stream_partition, %generation, "stale instruction ignored");
            return;
        }

        let self_id = self.id;
        let target: std::collections::BTreeSet<NodeId> = target_neighbors
            .into_iter()
            .filter(|peer| *peer != self_id)
            .collect();

        let removals: Vec<NodeId> = state.neighbors.difference(&target).copied().collect();
        let additions: Vec<NodeId> = target.difference(&state.neighbors).copied().collect();

        state.applied_generation = Some(generation);
        if state.lifecycle == PartitionLifecycle::Joining {
            state.lifecycle = PartitionLifecycle::Active;
        }
        for peer in &removals {
            state.neighbors.remove(peer);
        }
        let capacity_left = self
            .config
            .max_neighbors_per_node
            .saturating_sub(state.neighbors.len());

        if !removals.is_empty() || !additions.is_empty() {
            debug!(
                partition = %stream_partition,
                %generation,
                additions = additions.len(),
                removals = removals.len(),
                "applying topology instruction"
            );
        }

        self.metrics
            .neighbor_churn_total
            .increment(removals.len() as u64);
        for peer in removals {
            self.disconnect_if_unused(peer).await;
        }
        for peer in additions.into_iter().take(capacity_left) {
            self.spawn_connect(stream_partition.clone(), peer, Some(generation));
        }
    }

    /// Start joining a partition: announce to the tracker and seed
    /// neighbors from the distance index until an instruction arrives.
    async fn join_partition(&mut self, stream_partition: StreamPartition, interest: usize) {
        debug!(partition = %stream_partition, "joining partition");
        self.partitions
            .insert(stream_partition.clone(), PartitionState::joining(interest));

        // Ask the tracker for peers near us to warm the index.
        let discovery = Message::PeerDiscoveryRequest(PeerDiscoveryRequest {
            target: self.id,
            k: (self.config.max_neighbors_per_node * 2) as u32,
        });
        self.send_to_tracker(&discovery).await;

        // Self-select candidates until the tracker instructs otherwise.
        let candidates = self
            .index
            .nearest(&self.id, self.config.max_neighbors_per_node);
        for peer in candidates {
            self.spawn_connect(stream_partition.clone(), peer, None);
        }

        self.send_status_report().await;
    }

    /// Leave a partition: stop accepting neighbors, drain, tear down.
    async fn leave_partition(&mut self, stream_partition: &StreamPartition) {
        let Some(mut state) = self.partitions.remove(stream_partition) else {
            return;
        };
        state.lifecycle = PartitionLifecycle::Leaving;
        debug!(partition = %stream_partition, "leaving partition");

        // Ordering state for the partition dies with it.
        self.dedup.drop_partition(stream_partition);
        self.pending_connects
            .retain(|(partition, _), _| partition != stream_partition);

        self.metrics
            .neighbor_churn_total
            .increment(state.neighbors.len() as u64);
        // Frames already accepted by the transport are delivered before
        // each connection tears down, so forwards in flight drain first.
        for peer in std::mem::take(&mut state.neighbors) {
            self.disconnect_if_unused(peer).await;
        }

        self.send_status_report().await;
    }

    /// A peer connection failed or closed: evict it everywhere and
    /// self-heal partitions that fell below the low-water mark.
    async fn handle_peer_disconnected(&mut self, peer: NodeId) {
        let mut affected = Vec::new();
        for (stream_partition, state) in &mut self.partitions {
            if state.neighbors.remove(&peer) {
                affected.push(stream_partition.clone());
            }
        }
        if affected.is_empty() {
            return;
        }

        debug!(%peer, partitions = affected.len(), "peer disconnected");
        self.metrics
            .neighbor_churn_total
            .increment(affected.len() as u64);
        for stream_partition in affected {
            self.maybe_self_heal(&stream_partition);
        }
        self.send_status_report().await;
    }

    /// Eagerly dial nearest candidates when a partition is short of
    /// neighbors, without waiting for the tracker.
    fn maybe_self_heal(&mut self, stream_partition: &StreamPartition) {
        let Some(state) = self.partitions.get(stream_partition) else {
            return;
        };
        if state.lifecycle != PartitionLifecycle::Active
            || state.neighbors.len() >= self.config.neighbor_low_watermark
        {
            return;
        }

        let needed = self
            .config
            .max_neighbors_per_node
            .saturating_sub(state.neighbors.len());
        let snapshot = state.applied_generation;
        let candidates: Vec<NodeId> = self
            .index
            .nearest(&self.id, self.config.max_neighbors_per_node * 2)
            .into_iter()
            .filter(|peer| !state.neighbors.contains(peer))
            .filter(|peer| {
                !self
                    .pending_connects
                    .contains_key(&(stream_partition.clone(), *peer))
            })
            .take(needed)
            .collect();

        if candidates.is_empty() {
            return;
        }
        debug!(
            partition = %stream_partition,
            candidates = candidates.len(),
            "self-healing below low-water mark"
        );
        for peer in candidates {
            self.spawn_connect(stream_partition.clone(), peer, snapshot);
        }
    }

    /// Dial a peer for a partition in a background task; the outcome comes
    /// back through the internal channel tagged with a generation
    /// snapshot.
    fn spawn_connect(
        &mut self,
        stream_partition: StreamPartition,
        peer: NodeId,
        snapshot: Option<Generation>,
    ) {
        if peer == self.id {
            return;
        }
        if let Some(state) = self.partitions.get(&stream_partition) {
            if state.neighbors.contains(&peer) {
                return;
            }
        }
        let key = (stream_partition.clone(), peer);
        if self.pending_connects.contains_key(&key) {
            return;
        }
        self.pending_connects.insert(key, snapshot);

        let transport = self.transport.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = transport.connect(peer).await;
            let _ = internal
                .send(InternalEvent::ConnectOutcome {
                    stream_partition,
                    peer,
                    snapshot,
                    result,
                })
                .await;
        });
    }

    async fn handle_internal(&mut self, event: InternalEvent) {
        let InternalEvent::ConnectOutcome {
            stream_partition,
            peer,
            snapshot,
            result,
        } = event;
        self.pending_connects
            .remove(&(stream_partition.clone(), peer));

        let Some(state) = self.partitions.get_mut(&stream_partition) else {
            // Partition gone while dialing.
            if result.is_ok() {
                self.disconnect_if_unused(peer).await;
            }
            return;
        };

        // A newer instruction supersedes the attempt: the dial is
        // effectively cancelled and its connection released.
        let superseded = state.applied_generation != snapshot || !state.accepts_neighbors();
        if superseded {
            trace!(%peer, partition = %stream_partition, "dial superseded");
            if result.is_ok() {
                self.disconnect_if_unused(peer).await;
            }
            return;
        }

        match result {
            Ok(()) => {
                if state.neighbors.len() < self.config.max_neighbors_per_node {
                    state.neighbors.insert(peer);
                    if state.lifecycle == PartitionLifecycle::Joining {
                        state.lifecycle = PartitionLifecycle::Active;
                    }
                    self.metrics.neighbor_churn_total.increment(1);
                    self.index.insert(peer);
                    debug!(%peer, partition = %stream_partition, "neighbor connected");
                    self.send_status_report().await;
                } else {
                    self.disconnect_if_unused(peer).await;
                }
            }
            Err(err) => {
                debug!(%peer, partition = %stream_partition, %err, "dial failed");
                // Unreachable peers are stale index entries.
                self.index.remove(&peer);
                self.maybe_self_heal(&stream_partition);
            }
        }
    }

    /// Drop the transport connection to a peer no partition uses anymore.
    async fn disconnect_if_unused(&self, peer: NodeId) {
        let in_use = self
            .partitions
            .values()
            .any(|state| state.neighbors.contains(&peer))
            || self.pending_connects.keys().any(|(_, p)| *p == peer);
        if !in_use {
            self.transport.disconnect(peer).await;
        }
    }

    /// Report serving partitions, neighbors and load to the tracker.
    async fn send_status_report(&mut self) {
        let partitions: Vec<PartitionStatus> = self
            .partitions
            .iter()
            .filter(|(_, state)| state.accepts_neighbors())
            .map(|(stream_partition, state)| PartitionStatus {
                stream_partition: stream_partition.clone(),
                neighbors: state.neighbors.iter().copied().collect(),
            })
            .collect();

        let report = Message::StatusReport(StatusReport {
            node_id: self.id,
            partitions,
            load: (self.commands_rx.len() + self.transport_rx.len()) as u32,
        });
        self.send_to_tracker(&report).await;
    }

    async fn send_to_tracker(&self, message: &Message) {
        let Some(tracker) = self.active_tracker else {
            return;
        };
        let frame = match rivulet_wire::encode(message) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "failed to encode tracker message");
                return;
            }
        };
        if let Err(err) = self.transport.send(tracker, frame).await {
            warn!(%tracker, %err, "tracker send failed");
        }
    }

    /// Periodic housekeeping: idle chain eviction and a status log line.
    fn housekeeping(&mut self) {
        self.dedup.evict_idle(self.config.chain_idle_timeout);

        let neighbor_total: usize = self
            .partitions
            .values()
            .map(|state| state.neighbors.len())
            .sum();
        debug!(
            id = %self.id,
            partitions = self.partitions.len(),
            neighbors = neighbor_total,
            known_peers = self.index.len(),
            chains = self.dedup.chain_count(),
            "node status"
        );
    }
}
