//! The seam between the negotiation engine and a media stack.
//!
//! A [`ConnectionFactory`] opens one [`MediaConnection`] per remote
//! participant. Connections never call back into the engine; they report
//! through an [`EventSink`], which tags every event with the owning peer and
//! session generation so late events from a replaced connection can be told
//! apart.

pub mod rtc;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::MeshError;
use crate::protocol::{IceCandidate, SessionDescription};

pub trait LocalMediaTrack: Clone + Send + Sync + 'static {
    fn id(&self) -> String;
    /// Stream the track is announced under on the wire.
    fn stream_id(&self) -> String;
}

pub trait RemoteMediaTrack: Clone + Send + Sync + 'static {
    fn id(&self) -> String;
    fn stream_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceState {
    /// States after which the session is torn down.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IceState::Disconnected | IceState::Failed | IceState::Closed
        )
    }
}

#[derive(Debug, Clone)]
pub enum ConnectionEvent<R> {
    NegotiationNeeded,
    LocalCandidate(IceCandidate),
    IceStateChanged(IceState),
    SideChannelOpen,
    SideChannelMessage(String),
    SideChannelClosed,
    Track(R),
    TrackEnded { track_id: String },
}

#[derive(Debug, Clone)]
pub struct PeerEvent<R> {
    pub peer_id: String,
    pub generation: u64,
    pub event: ConnectionEvent<R>,
}

pub struct EventSink<R> {
    peer_id: Arc<str>,
    generation: u64,
    tx: mpsc::UnboundedSender<PeerEvent<R>>,
}

impl<R> Clone for EventSink<R> {
    fn clone(&self) -> Self {
        Self {
            peer_id: Arc::clone(&self.peer_id),
            generation: self.generation,
            tx: self.tx.clone(),
        }
    }
}

impl<R> EventSink<R> {
    pub fn new(
        peer_id: impl Into<Arc<str>>,
        generation: u64,
        tx: mpsc::UnboundedSender<PeerEvent<R>>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            generation,
            tx,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the engine has stopped listening.
    pub fn emit(&self, event: ConnectionEvent<R>) -> bool {
        self.tx
            .send(PeerEvent {
                peer_id: self.peer_id.to_string(),
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// One negotiated link to a remote participant.
///
/// `create_offer` and `create_answer` also install the description they
/// return as the local description.
#[async_trait]
pub trait MediaConnection: Send + Sync + 'static {
    type LocalTrack: LocalMediaTrack;
    type RemoteTrack: RemoteMediaTrack;
    type Sender: Send + Sync + 'static;

    async fn create_offer(&self) -> Result<SessionDescription, MeshError>;
    async fn create_answer(&self) -> Result<SessionDescription, MeshError>;
    async fn set_remote_description(&self, description: SessionDescription)
    -> Result<(), MeshError>;
    /// Discard a pending local offer.
    async fn rollback(&self) -> Result<(), MeshError>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), MeshError>;
    fn is_stable(&self) -> bool;

    async fn open_side_channel(&self, label: &str) -> Result<(), MeshError>;
    async fn send_side_channel(&self, text: &str) -> Result<(), MeshError>;

    async fn add_track(&self, track: &Self::LocalTrack) -> Result<Self::Sender, MeshError>;
    /// Swap the media behind an existing sender without renegotiating.
    async fn replace_track(
        &self,
        sender: &Self::Sender,
        track: &Self::LocalTrack,
    ) -> Result<(), MeshError>;
    async fn remove_track(&self, sender: &Self::Sender) -> Result<(), MeshError>;

    async fn close(&self) -> Result<(), MeshError>;
}

pub type ConnectionOf<F> = <F as ConnectionFactory>::Connection;
pub type LocalTrackOf<F> = <ConnectionOf<F> as MediaConnection>::LocalTrack;
pub type RemoteTrackOf<F> = <ConnectionOf<F> as MediaConnection>::RemoteTrack;

#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: MediaConnection;

    async fn open(
        &self,
        peer_id: &str,
        events: EventSink<RemoteTrackOf<Self>>,
    ) -> Result<Self::Connection, MeshError>;
}
