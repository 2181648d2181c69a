//! Mesh-wide negotiation: one [`PeerSession`] per remote participant, the
//! local track registrations, and the glue between signaling, connections
//! and the caller.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::{MeshConfig, RolePolicy};
use crate::connection::{
    ConnectionEvent, ConnectionFactory, ConnectionOf, EventSink, LocalMediaTrack, LocalTrackOf,
    MediaConnection, PeerEvent, RemoteTrackOf,
};
use crate::correlator::ReadyOutcome;
use crate::error::MeshError;
use crate::protocol::{
    CorrelationMessage, IceCandidate, MessageKind, SessionDescription, SignalEnvelope, StreamKind,
};
use crate::session::{DescriptionOutcome, PeerSession};
use crate::signaling::SignalSender;

/// Notifications for the presentation layer.
#[derive(Debug, Clone)]
pub enum MeshEvent<R> {
    TrackAdded {
        peer_id: String,
        kind: StreamKind,
        track: R,
    },
    TrackRemoved {
        peer_id: String,
        kind: StreamKind,
        track: R,
    },
    PeerReady {
        peer_id: String,
    },
    PeerDisconnected {
        peer_id: String,
    },
    /// Chat and any relay kind the engine does not interpret.
    Message(SignalEnvelope),
    SignalingLost,
}

#[derive(Clone)]
pub struct TrackRegistration<T> {
    pub track: T,
    pub kind: StreamKind,
}

impl<T: LocalMediaTrack> TrackRegistration<T> {
    pub fn track_id(&self) -> String {
        self.track.id()
    }

    pub fn announcement(&self) -> CorrelationMessage {
        CorrelationMessage::stream(self.track.stream_id(), self.kind.clone())
    }
}

pub type ConnectionEventReceiver<F> = mpsc::UnboundedReceiver<PeerEvent<RemoteTrackOf<F>>>;
pub type MeshEventReceiver<F> = mpsc::UnboundedReceiver<MeshEvent<RemoteTrackOf<F>>>;

pub struct Coordinator<F: ConnectionFactory> {
    local_id: String,
    config: MeshConfig,
    factory: F,
    signaling: SignalSender,
    sessions: HashMap<String, PeerSession<ConnectionOf<F>>>,
    /// Participants torn down since their last announcement.
    departed: HashSet<String>,
    registrations: Vec<TrackRegistration<LocalTrackOf<F>>>,
    connection_events: mpsc::UnboundedSender<PeerEvent<RemoteTrackOf<F>>>,
    mesh_events: mpsc::UnboundedSender<MeshEvent<RemoteTrackOf<F>>>,
    next_generation: u64,
}

impl<F: ConnectionFactory> Coordinator<F> {
    pub fn new(
        config: MeshConfig,
        factory: F,
        signaling: SignalSender,
    ) -> (Self, ConnectionEventReceiver<F>, MeshEventReceiver<F>) {
        let (connection_tx, connection_rx) = mpsc::unbounded_channel();
        let (mesh_tx, mesh_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            local_id: signaling.local_id().to_string(),
            config,
            factory,
            signaling,
            sessions: HashMap::new(),
            departed: HashSet::new(),
            registrations: Vec::new(),
            connection_events: connection_tx,
            mesh_events: mesh_tx,
            next_generation: 0,
        };
        (coordinator, connection_rx, mesh_rx)
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn session(&self, peer_id: &str) -> Option<&PeerSession<ConnectionOf<F>>> {
        self.sessions.get(peer_id)
    }

    pub fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn registrations(&self) -> &[TrackRegistration<LocalTrackOf<F>>] {
        &self.registrations
    }

    /// Broadcast presence to the session.
    pub fn announce(&self) -> Result<(), MeshError> {
        self.signaling.send(MessageKind::Hello, "", &Value::Null)
    }

    /// Relay a chat or application-defined message.
    pub fn send(&self, kind: MessageKind, dest: &str, data: &Value) -> Result<(), MeshError> {
        match kind {
            MessageKind::Reserved(code) if !kind.is_canonical() => Err(MeshError::Setup(format!(
                "message code {code} belongs to a named kind"
            ))),
            MessageKind::Chat | MessageKind::Reserved(_) => self.signaling.send(kind, dest, data),
            other => Err(MeshError::Setup(format!(
                "{other:?} messages are reserved for negotiation"
            ))),
        }
    }

    /// (Re)create the session for a participant that announced itself.
    pub async fn add_peer(&mut self, peer_id: &str) -> Result<(), MeshError> {
        let polite = match self.config.role_policy {
            RolePolicy::FirstContact => false,
            RolePolicy::CompareIds => self.local_id.as_str() > peer_id,
        };
        self.create_session(peer_id, polite).await
    }

    pub async fn remove_peer(&mut self, peer_id: &str) -> bool {
        match self.sessions.remove(peer_id) {
            Some(session) => {
                self.departed.insert(peer_id.to_string());
                self.teardown(session, true).await;
                true
            }
            None => false,
        }
    }

    pub async fn handle_inbound(&mut self, envelope: SignalEnvelope) {
        if envelope.src.is_empty() || envelope.src == self.local_id {
            return;
        }
        match envelope.kind {
            MessageKind::Hello => self.on_hello(&envelope).await,
            MessageKind::SessionDescription => {
                match envelope.payload::<SessionDescription>() {
                    Ok(description) => self.on_description(&envelope.src, description).await,
                    Err(err) => tracing::warn!(
                        target = "mesh",
                        peer_id = %envelope.src,
                        error = %err,
                        "undecodable session description"
                    ),
                }
            }
            MessageKind::IceCandidate => match envelope.payload::<IceCandidate>() {
                Ok(candidate) => self.on_candidate(&envelope.src, candidate).await,
                Err(err) => tracing::warn!(
                    target = "mesh",
                    peer_id = %envelope.src,
                    error = %err,
                    "undecodable ice candidate"
                ),
            },
            MessageKind::Chat | MessageKind::Reserved(_) => {
                self.emit(MeshEvent::Message(envelope));
            }
        }
    }

    pub async fn handle_connection_event(&mut self, event: PeerEvent<RemoteTrackOf<F>>) {
        let PeerEvent {
            peer_id,
            generation,
            event,
        } = event;
        let Some(session) = self.sessions.get(&peer_id) else {
            tracing::trace!(target = "mesh", peer_id = %peer_id, "event for unknown peer");
            return;
        };
        if session.generation() != generation {
            tracing::debug!(
                target = "mesh",
                peer_id = %peer_id,
                generation,
                current = session.generation(),
                "dropping event from replaced connection"
            );
            return;
        }

        match event {
            ConnectionEvent::NegotiationNeeded => self.on_negotiation_needed(&peer_id).await,
            ConnectionEvent::LocalCandidate(candidate) => {
                if let Err(err) = self
                    .signaling
                    .send(MessageKind::IceCandidate, &peer_id, &candidate)
                {
                    tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to relay candidate");
                }
            }
            ConnectionEvent::IceStateChanged(state) => {
                tracing::debug!(target = "mesh", peer_id = %peer_id, state = ?state, "ice state");
                if state.is_terminal() {
                    self.disconnect_peer(&peer_id).await;
                }
            }
            ConnectionEvent::SideChannelOpen => self.on_side_channel_open(&peer_id).await,
            ConnectionEvent::SideChannelMessage(text) => match CorrelationMessage::decode(&text) {
                Ok(message) => self.on_correlation(&peer_id, message).await,
                Err(err) => tracing::warn!(
                    target = "mesh",
                    peer_id = %peer_id,
                    error = %err,
                    "undecodable side channel message"
                ),
            },
            ConnectionEvent::SideChannelClosed => {
                tracing::debug!(target = "mesh", peer_id = %peer_id, "side channel closed");
            }
            ConnectionEvent::Track(track) => self.on_remote_track(&peer_id, track),
            ConnectionEvent::TrackEnded { track_id } => self.on_track_ended(&peer_id, &track_id),
        }
    }

    /// Register a local track and push it to every ready session.
    pub async fn add_track(&mut self, track: LocalTrackOf<F>, kind: StreamKind) {
        let track_id = track.id();
        if self
            .registrations
            .iter()
            .any(|registration| registration.track_id() == track_id)
        {
            tracing::debug!(target = "mesh", track_id = %track_id, "track already registered");
            return;
        }
        let registration = TrackRegistration { track, kind };
        self.registrations.push(registration.clone());
        for peer_id in self.ready_peer_ids() {
            self.publish(&peer_id, &registration).await;
        }
    }

    /// Swap a published track for another without renegotiating. The
    /// registration keeps its kind and position.
    pub async fn replace_track(&mut self, old_id: &str, track: LocalTrackOf<F>) -> bool {
        let Some(registration) = self
            .registrations
            .iter_mut()
            .find(|registration| registration.track_id() == old_id)
        else {
            tracing::debug!(target = "mesh", track_id = %old_id, "replace for unknown track");
            return false;
        };
        registration.track = track.clone();
        for peer_id in self.peer_ids() {
            let Some(session) = self.sessions.get_mut(&peer_id) else {
                continue;
            };
            if let Err(err) = session.replace_track(old_id, &track).await {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "replace track failed");
            }
        }
        true
    }

    pub async fn remove_track(&mut self, track_id: &str) -> bool {
        let Some(index) = self
            .registrations
            .iter()
            .position(|registration| registration.track_id() == track_id)
        else {
            return false;
        };
        self.registrations.remove(index);
        for peer_id in self.peer_ids() {
            let Some(session) = self.sessions.get_mut(&peer_id) else {
                continue;
            };
            if let Err(err) = session.remove_track(track_id).await {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "remove track failed");
            }
        }
        true
    }

    /// Close every connection. No notifications are emitted.
    pub async fn close(&mut self) {
        let sessions: Vec<_> = self.sessions.drain().map(|(_, session)| session).collect();
        for session in sessions {
            self.teardown(session, false).await;
        }
        self.registrations.clear();
    }

    /// The relay is gone: every session is torn down and reported.
    pub async fn handle_signaling_lost(&mut self) {
        tracing::warn!(target = "mesh", local_id = %self.local_id, "signaling lost");
        let mut sessions: Vec<_> = self.sessions.drain().map(|(_, session)| session).collect();
        sessions.sort_by(|a, b| a.id().cmp(b.id()));
        for session in sessions {
            self.teardown(session, true).await;
        }
        self.emit(MeshEvent::SignalingLost);
    }

    /// Surface every parked inbound track whose correlation deadline passed.
    pub fn expire_correlations(&mut self, now: Instant) {
        let mut released = Vec::new();
        for (peer_id, session) in self.sessions.iter_mut() {
            for track in session.correlator_mut().expire(now) {
                session.deliver(track.clone(), StreamKind::Uncorrelated);
                released.push(MeshEvent::TrackAdded {
                    peer_id: peer_id.clone(),
                    kind: StreamKind::Uncorrelated,
                    track,
                });
            }
        }
        for event in released {
            self.emit(event);
        }
    }

    pub fn next_correlation_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(|session| session.correlator().next_deadline())
            .min()
    }

    async fn on_hello(&mut self, envelope: &SignalEnvelope) {
        let peer_id = envelope.src.as_str();
        // A directed hello answers our own announcement; rejoins are always
        // broadcast.
        if !envelope.is_broadcast() && self.sessions.contains_key(peer_id) {
            tracing::trace!(target = "mesh", peer_id = %peer_id, "presence reply for live session");
            return;
        }
        tracing::debug!(
            target = "mesh",
            peer_id = %peer_id,
            rejoin = self.sessions.contains_key(peer_id),
            "presence announcement"
        );
        if let Err(err) = self.add_peer(peer_id).await {
            tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to create session");
            return;
        }
        if self.config.role_policy == RolePolicy::CompareIds && envelope.is_broadcast() {
            if let Err(err) = self.signaling.send(MessageKind::Hello, peer_id, &Value::Null) {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to answer presence");
            }
        }
    }

    async fn on_description(&mut self, peer_id: &str, description: SessionDescription) {
        if !self.sessions.contains_key(peer_id) {
            if self.departed.contains(peer_id) {
                tracing::debug!(
                    target = "mesh",
                    peer_id = %peer_id,
                    sdp_type = ?description.sdp_type,
                    "dropping description from departed peer"
                );
                return;
            }
            if !description.is_offer() {
                tracing::debug!(
                    target = "mesh",
                    peer_id = %peer_id,
                    "dropping description from unknown peer"
                );
                return;
            }
            let polite = match self.config.role_policy {
                RolePolicy::FirstContact => true,
                RolePolicy::CompareIds => self.local_id.as_str() > peer_id,
            };
            if let Err(err) = self.create_session(peer_id, polite).await {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to create session");
                return;
            }
        }
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        match session.apply_remote_description(description).await {
            Ok(DescriptionOutcome::Answered(answer)) => {
                if let Err(err) =
                    self.signaling
                        .send(MessageKind::SessionDescription, peer_id, &answer)
                {
                    tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to send answer");
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(
                    target = "mesh",
                    peer_id = %peer_id,
                    error = %err,
                    "failed to apply remote description"
                );
                self.recover_or_disconnect(peer_id).await;
            }
        }
    }

    async fn on_candidate(&mut self, peer_id: &str, candidate: IceCandidate) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            tracing::debug!(target = "mesh", peer_id = %peer_id, "candidate for unknown peer");
            return;
        };
        if let Err(err) = session.add_remote_candidate(candidate).await {
            tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to add candidate");
        }
    }

    async fn on_negotiation_needed(&mut self, peer_id: &str) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        match session.negotiation_needed().await {
            Ok(Some(offer)) => {
                if let Err(err) = self
                    .signaling
                    .send(MessageKind::SessionDescription, peer_id, &offer)
                {
                    tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to send offer");
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to create offer");
                self.recover_or_disconnect(peer_id).await;
            }
        }
    }

    async fn on_side_channel_open(&mut self, peer_id: &str) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        let polite = session.polite();
        if let Some(marker) = session.correlator_mut().on_channel_open(polite) {
            if let Err(err) = session.send_correlation(&marker).await {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to send ready marker");
            }
        }
    }

    async fn on_correlation(&mut self, peer_id: &str, message: CorrelationMessage) {
        match message {
            CorrelationMessage::Ready { .. } => self.on_ready(peer_id).await,
            CorrelationMessage::Stream { sid, kind } => {
                let Some(session) = self.sessions.get_mut(peer_id) else {
                    return;
                };
                let released = session.correlator_mut().on_stream(sid, kind);
                for (track, kind) in &released {
                    session.deliver(track.clone(), kind.clone());
                }
                for (track, kind) in released {
                    self.emit(MeshEvent::TrackAdded {
                        peer_id: peer_id.to_string(),
                        kind,
                        track,
                    });
                }
            }
        }
    }

    async fn on_ready(&mut self, peer_id: &str) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        let ReadyOutcome::BecameReady { reply } = session.correlator_mut().on_ready() else {
            return;
        };
        tracing::debug!(target = "mesh", peer_id = %peer_id, "peer ready");
        if reply {
            if let Err(err) = session.send_correlation(&CorrelationMessage::ready()).await {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to send ready marker");
            }
        }
        for registration in &self.registrations {
            if let Err(err) = session.send_correlation(&registration.announcement()).await {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to announce stream");
            }
        }
        for registration in &self.registrations {
            if let Err(err) = session.add_track(&registration.track).await {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to add track");
            }
        }
        self.emit(MeshEvent::PeerReady {
            peer_id: peer_id.to_string(),
        });
    }

    fn on_remote_track(&mut self, peer_id: &str, track: RemoteTrackOf<F>) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        match session.correlator_mut().classify(track, Instant::now()) {
            Some((track, kind)) => {
                session.deliver(track.clone(), kind.clone());
                self.emit(MeshEvent::TrackAdded {
                    peer_id: peer_id.to_string(),
                    kind,
                    track,
                });
            }
            None => {
                tracing::debug!(target = "mesh", peer_id = %peer_id, "track waiting for correlation");
            }
        }
    }

    fn on_track_ended(&mut self, peer_id: &str, track_id: &str) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        if session.correlator_mut().forget(track_id) {
            return;
        }
        if let Some((track, kind)) = session.take_delivered(track_id) {
            self.emit(MeshEvent::TrackRemoved {
                peer_id: peer_id.to_string(),
                kind,
                track,
            });
        }
    }

    async fn publish(&mut self, peer_id: &str, registration: &TrackRegistration<LocalTrackOf<F>>) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        if let Err(err) = session.send_correlation(&registration.announcement()).await {
            tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to announce stream");
        }
        if let Err(err) = session.add_track(&registration.track).await {
            tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to add track");
        }
    }

    async fn create_session(&mut self, peer_id: &str, polite: bool) -> Result<(), MeshError> {
        if let Some(previous) = self.sessions.remove(peer_id) {
            tracing::debug!(target = "mesh", peer_id = %peer_id, "replacing existing session");
            self.teardown(previous, true).await;
        }
        self.departed.remove(peer_id);
        self.next_generation += 1;
        let generation = self.next_generation;
        let sink = EventSink::new(peer_id, generation, self.connection_events.clone());
        let connection = self.factory.open(peer_id, sink).await?;
        let session = PeerSession::new(
            peer_id,
            connection,
            polite,
            generation,
            self.config.correlation_timeout(),
        );
        if !polite {
            if let Err(err) = session
                .connection()
                .open_side_channel(&self.config.side_channel_label)
                .await
            {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "failed to open side channel");
            }
        }
        tracing::info!(
            target = "mesh",
            peer_id = %peer_id,
            polite,
            generation,
            "peer session created"
        );
        self.sessions.insert(peer_id.to_string(), session);
        Ok(())
    }

    async fn recover_or_disconnect(&mut self, peer_id: &str) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };
        if !session.recover().await {
            self.disconnect_peer(peer_id).await;
        }
    }

    async fn disconnect_peer(&mut self, peer_id: &str) {
        if let Some(session) = self.sessions.remove(peer_id) {
            self.departed.insert(peer_id.to_string());
            self.teardown(session, true).await;
        }
    }

    async fn teardown(&mut self, mut session: PeerSession<ConnectionOf<F>>, notify: bool) {
        let peer_id = session.id().to_string();
        let delivered = session.close().await;
        tracing::info!(target = "mesh", peer_id = %peer_id, notify, "peer session closed");
        if !notify {
            return;
        }
        for (track, kind) in delivered {
            self.emit(MeshEvent::TrackRemoved {
                peer_id: peer_id.clone(),
                kind,
                track,
            });
        }
        self.emit(MeshEvent::PeerDisconnected { peer_id });
    }

    fn ready_peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_ready())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn emit(&self, event: MeshEvent<RemoteTrackOf<F>>) {
        let _ = self.mesh_events.send(event);
    }
}
