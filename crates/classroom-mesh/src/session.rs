use std::collections::HashMap;
use std::time::Duration;

use crate::connection::{LocalMediaTrack, MediaConnection, RemoteMediaTrack};
use crate::correlator::StreamCorrelator;
use crate::error::MeshError;
use crate::protocol::{CorrelationMessage, IceCandidate, SdpType, SessionDescription, StreamKind};

/// Where a session stands in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Stable,
    MakingOffer,
    HaveLocalOffer,
    ApplyingRemoteAnswer,
    HaveRemoteOffer,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionOutcome {
    /// A remote offer was applied; send this answer back.
    Answered(SessionDescription),
    /// A remote answer was applied.
    Applied,
    /// Colliding offer discarded by the impolite side.
    Ignored,
    /// An answer that matches no outstanding offer.
    Stale,
}

/// Negotiation state for one remote participant.
pub struct PeerSession<C: MediaConnection> {
    id: String,
    connection: C,
    polite: bool,
    generation: u64,
    state: NegotiationState,
    ignore_offer: bool,
    has_remote_description: bool,
    pending_candidates: Vec<IceCandidate>,
    senders: HashMap<String, C::Sender>,
    correlator: StreamCorrelator<C::RemoteTrack>,
    delivered: Vec<(C::RemoteTrack, StreamKind)>,
}

impl<C: MediaConnection> PeerSession<C> {
    pub fn new(
        id: impl Into<String>,
        connection: C,
        polite: bool,
        generation: u64,
        correlation_timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            connection,
            polite,
            generation,
            state: NegotiationState::Stable,
            ignore_offer: false,
            has_remote_description: false,
            pending_candidates: Vec::new(),
            senders: HashMap::new(),
            correlator: StreamCorrelator::new(correlation_timeout),
            delivered: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn polite(&self) -> bool {
        self.polite
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn ignoring_offer(&self) -> bool {
        self.ignore_offer
    }

    pub fn is_ready(&self) -> bool {
        self.correlator.is_ready()
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn correlator_mut(&mut self) -> &mut StreamCorrelator<C::RemoteTrack> {
        &mut self.correlator
    }

    pub fn correlator(&self) -> &StreamCorrelator<C::RemoteTrack> {
        &self.correlator
    }

    pub fn has_sender(&self, track_id: &str) -> bool {
        self.senders.contains_key(track_id)
    }

    pub fn sender_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.senders.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The connection asked for a (re)negotiation. Returns the offer to send,
    /// or `None` when a negotiation is already under way; the connection
    /// raises the request again once it is stable.
    pub async fn negotiation_needed(&mut self) -> Result<Option<SessionDescription>, MeshError> {
        if self.state != NegotiationState::Stable {
            tracing::debug!(
                target = "mesh",
                peer_id = %self.id,
                state = ?self.state,
                "deferring negotiation until stable"
            );
            return Ok(None);
        }
        self.state = NegotiationState::MakingOffer;
        match self.connection.create_offer().await {
            Ok(offer) => {
                self.state = NegotiationState::HaveLocalOffer;
                Ok(Some(offer))
            }
            Err(err) => {
                self.state = NegotiationState::Stable;
                Err(err)
            }
        }
    }

    pub async fn apply_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<DescriptionOutcome, MeshError> {
        let ready_for_offer = matches!(
            self.state,
            NegotiationState::Stable | NegotiationState::ApplyingRemoteAnswer
        );
        let collision = description.is_offer() && !ready_for_offer;
        self.ignore_offer = !self.polite && collision;
        if self.ignore_offer {
            tracing::debug!(
                target = "mesh",
                peer_id = %self.id,
                "ignoring colliding offer"
            );
            return Ok(DescriptionOutcome::Ignored);
        }

        match description.sdp_type {
            SdpType::Offer => {
                if collision {
                    tracing::debug!(
                        target = "mesh",
                        peer_id = %self.id,
                        "offer collision, rolling back local offer"
                    );
                    self.connection.rollback().await?;
                    self.state = NegotiationState::Stable;
                }
                self.connection.set_remote_description(description).await?;
                self.has_remote_description = true;
                self.state = NegotiationState::HaveRemoteOffer;
                self.flush_candidates().await;
                let answer = self.connection.create_answer().await?;
                self.state = NegotiationState::Stable;
                Ok(DescriptionOutcome::Answered(answer))
            }
            SdpType::Answer => {
                if self.state != NegotiationState::HaveLocalOffer {
                    tracing::debug!(
                        target = "mesh",
                        peer_id = %self.id,
                        state = ?self.state,
                        "dropping stale answer"
                    );
                    return Ok(DescriptionOutcome::Stale);
                }
                self.state = NegotiationState::ApplyingRemoteAnswer;
                self.connection.set_remote_description(description).await?;
                self.has_remote_description = true;
                self.state = NegotiationState::Stable;
                self.flush_candidates().await;
                Ok(DescriptionOutcome::Applied)
            }
            other => Err(MeshError::InvalidDescription(format!(
                "unsupported remote description type {other:?}"
            ))),
        }
    }

    /// Put the session back on its feet after a failed description step.
    /// Returns false when the connection could not be brought back to a
    /// stable state.
    pub async fn recover(&mut self) -> bool {
        if self.connection.is_stable() {
            self.state = NegotiationState::Stable;
            return true;
        }
        match self.connection.rollback().await {
            Ok(()) => {
                self.state = NegotiationState::Stable;
                true
            }
            Err(err) => {
                tracing::warn!(
                    target = "mesh",
                    peer_id = %self.id,
                    error = %err,
                    "rollback after failed negotiation did not succeed"
                );
                false
            }
        }
    }

    pub async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), MeshError> {
        if !self.has_remote_description {
            self.pending_candidates.push(candidate);
            return Ok(());
        }
        match self.connection.add_ice_candidate(candidate).await {
            Ok(()) => Ok(()),
            Err(_) if self.ignore_offer => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn flush_candidates(&mut self) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            if let Err(err) = self.connection.add_ice_candidate(candidate).await {
                if !self.ignore_offer {
                    tracing::warn!(
                        target = "mesh",
                        peer_id = %self.id,
                        error = %err,
                        "buffered candidate rejected"
                    );
                }
            }
        }
    }

    pub async fn send_correlation(&self, message: &CorrelationMessage) -> Result<(), MeshError> {
        self.connection.send_side_channel(&message.encode()?).await
    }

    pub async fn add_track(&mut self, track: &C::LocalTrack) -> Result<(), MeshError> {
        let id = track.id();
        if self.senders.contains_key(&id) {
            return Ok(());
        }
        let sender = self.connection.add_track(track).await?;
        self.senders.insert(id, sender);
        Ok(())
    }

    /// Returns false when this session never carried `old_id`.
    pub async fn replace_track(
        &mut self,
        old_id: &str,
        track: &C::LocalTrack,
    ) -> Result<bool, MeshError> {
        let Some(sender) = self.senders.remove(old_id) else {
            return Ok(false);
        };
        match self.connection.replace_track(&sender, track).await {
            Ok(()) => {
                self.senders.insert(track.id(), sender);
                Ok(true)
            }
            Err(err) => {
                self.senders.insert(old_id.to_string(), sender);
                Err(err)
            }
        }
    }

    pub async fn remove_track(&mut self, track_id: &str) -> Result<bool, MeshError> {
        let Some(sender) = self.senders.remove(track_id) else {
            return Ok(false);
        };
        self.connection.remove_track(&sender).await?;
        Ok(true)
    }

    pub fn deliver(&mut self, track: C::RemoteTrack, kind: StreamKind) {
        self.delivered.push((track, kind));
    }

    pub fn take_delivered(&mut self, track_id: &str) -> Option<(C::RemoteTrack, StreamKind)> {
        let index = self
            .delivered
            .iter()
            .position(|(track, _)| track.id() == track_id)?;
        Some(self.delivered.remove(index))
    }

    /// Close the connection and hand back every track surfaced so far.
    pub async fn close(&mut self) -> Vec<(C::RemoteTrack, StreamKind)> {
        self.state = NegotiationState::Disconnected;
        self.senders.clear();
        self.pending_candidates.clear();
        if let Err(err) = self.connection.close().await {
            tracing::debug!(
                target = "mesh",
                peer_id = %self.id,
                error = %err,
                "error closing connection"
            );
        }
        std::mem::take(&mut self.delivered)
    }
}
