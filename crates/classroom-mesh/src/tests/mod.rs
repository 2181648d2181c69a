
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::MeshConfig;
use crate::connection::PeerEvent;
use crate::coordinator::{Coordinator, MeshEvent};
use crate::protocol::{MessageKind, SignalEnvelope, StreamKind};
use crate::signaling::SignalSender;

pub(crate) use fake::{FakeFactory, FakeNetwork, FakeSignaling, FakeTrack};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) struct Node {
    pub id: String,
    pub coordinator: Coordinator<FakeFactory>,
    connection_events: mpsc::UnboundedReceiver<PeerEvent<FakeTrack>>,
    mesh_events: mpsc::UnboundedReceiver<MeshEvent<FakeTrack>>,
    frames: mpsc::UnboundedReceiver<String>,
    pub events: Vec<MeshEvent<FakeTrack>>,
}

/// Several coordinators wired through an in-memory relay and a
/// [`FakeNetwork`]. Nothing runs on its own: [`Harness::pump`] moves frames
/// and connection events until the mesh is quiet, which keeps every
/// interleaving reproducible.
pub(crate) struct Harness {
    pub network: FakeNetwork,
    config: MeshConfig,
    nodes: Vec<Node>,
    pub frames: Vec<SignalEnvelope>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(MeshConfig::default())
    }

    pub fn with_config(config: MeshConfig) -> Self {
        init_tracing();
        Self {
            network: FakeNetwork::new(),
            config,
            nodes: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Add a participant and broadcast its presence. A participant that is
    /// already present is replaced, as if it had reloaded the page.
    pub fn join(&mut self, id: &str) {
        self.nodes.retain(|node| node.id != id);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (coordinator, connection_events, mesh_events) = Coordinator::new(
            self.config.clone(),
            self.network.factory(id),
            SignalSender::new(id, frames_tx),
        );
        coordinator.announce().expect("announce");
        self.nodes.push(Node {
            id: id.to_string(),
            coordinator,
            connection_events,
            mesh_events,
            frames: frames_rx,
            events: Vec::new(),
        });
    }

    pub fn node(&mut self, id: &str) -> &mut Node {
        self.nodes
            .iter_mut()
            .find(|node| node.id == id)
            .unwrap_or_else(|| panic!("no participant {id}"))
    }

    /// Deliver queued relay frames once, without touching connection events.
    pub async fn pump_frames(&mut self) -> bool {
        let mut progress = false;
        for index in 0..self.nodes.len() {
            let mut outbound = Vec::new();
            while let Ok(frame) = self.nodes[index].frames.try_recv() {
                outbound.push(SignalEnvelope::decode(&frame).expect("frame decodes"));
            }
            for envelope in outbound {
                progress = true;
                self.frames.push(envelope.clone());
                for node in self.nodes.iter_mut() {
                    if envelope.is_for(&node.id) {
                        node.coordinator.handle_inbound(envelope.clone()).await;
                    }
                }
            }
        }
        progress
    }

    pub async fn pump_connection_events(&mut self) -> bool {
        let mut progress = false;
        for node in self.nodes.iter_mut() {
            while let Ok(event) = node.connection_events.try_recv() {
                progress = true;
                node.coordinator.handle_connection_event(event).await;
            }
        }
        progress
    }

    pub async fn pump(&mut self) {
        for _ in 0..1_000 {
            let frames = self.pump_frames().await;
            let events = self.pump_connection_events().await;
            self.collect_events();
            if !frames && !events {
                return;
            }
        }
        panic!("mesh did not settle");
    }

    pub fn collect_events(&mut self) {
        for node in self.nodes.iter_mut() {
            while let Ok(event) = node.mesh_events.try_recv() {
                node.events.push(event);
            }
        }
    }

    pub fn expire(&mut self) {
        let now = Instant::now();
        for node in self.nodes.iter_mut() {
            node.coordinator.expire_correlations(now);
        }
        self.collect_events();
    }

    pub fn take_events(&mut self, id: &str) -> Vec<MeshEvent<FakeTrack>> {
        self.collect_events();
        std::mem::take(&mut self.node(id).events)
    }

    /// Hand an envelope to one participant as if the relay had delivered it.
    pub async fn inject(&mut self, to: &str, from: &str, kind: MessageKind, data: Value) {
        let envelope = SignalEnvelope::new(from, to, kind, data);
        self.node(to).coordinator.handle_inbound(envelope).await;
    }

    pub async fn add_track(&mut self, id: &str, track: FakeTrack, kind: StreamKind) {
        self.node(id).coordinator.add_track(track, kind).await;
    }

    /// Join each participant in order, settling the mesh after every join.
    pub async fn connect_all(&mut self, ids: &[&str]) {
        for id in ids {
            self.join(id);
            self.pump().await;
        }
    }
}

pub(crate) fn added(events: &[MeshEvent<FakeTrack>]) -> Vec<(String, StreamKind, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            MeshEvent::TrackAdded {
                peer_id,
                kind,
                track,
            } => Some((peer_id.clone(), kind.clone(), track.id.clone())),
            _ => None,
        })
        .collect()
}

pub(crate) fn removed(events: &[MeshEvent<FakeTrack>]) -> Vec<(String, StreamKind, String)> {
    events
        .iter()
        .filter_map(|event| match event {
            MeshEvent::TrackRemoved {
                peer_id,
                kind,
                track,
            } => Some((peer_id.clone(), kind.clone(), track.id.clone())),
            _ => None,
        })
        .collect()
}

pub(crate) fn disconnected(events: &[MeshEvent<FakeTrack>]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            MeshEvent::PeerDisconnected { peer_id } => Some(peer_id.clone()),
            _ => None,
        })
        .collect()
}

pub(crate) fn ready(events: &[MeshEvent<FakeTrack>]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            MeshEvent::PeerReady { peer_id } => Some(peer_id.clone()),
            _ => None,
        })
        .collect()
}

pub(crate) fn camera(id: &str) -> FakeTrack {
    FakeTrack::new(id, &format!("{id}-stream"))
}

pub(crate) fn stable(harness: &Harness, local: &str, peer: &str) -> bool {
    harness.network.signaling(local, peer) == Some(FakeSignaling::Stable)
}
