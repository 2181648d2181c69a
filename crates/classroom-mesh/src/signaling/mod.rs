//! Session-scoped envelope transport.
//!
//! A [`SignalingChannel`] turns a pair of raw text-frame pipes into typed
//! [`SignalEnvelope`]s. The relay forwards every frame to every other member
//! of the room, so the channel drops frames addressed to someone else.

pub mod relay;
pub mod websocket;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::MeshError;
use crate::protocol::{MessageKind, SignalEnvelope};

pub use relay::LocalRelay;
pub use websocket::{connect, session_url};

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Envelope(SignalEnvelope),
    /// The transport is gone. Emitted once; nothing follows it.
    Closed,
}

/// Cloneable send half of a [`SignalingChannel`].
#[derive(Debug, Clone)]
pub struct SignalSender {
    local_id: Arc<str>,
    frames: mpsc::UnboundedSender<String>,
}

impl SignalSender {
    pub fn new(local_id: impl Into<Arc<str>>, frames: mpsc::UnboundedSender<String>) -> Self {
        Self {
            local_id: local_id.into(),
            frames,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Fire-and-forget; delivery is the relay's responsibility.
    pub fn send<T: Serialize>(&self, kind: MessageKind, dest: &str, data: &T) -> Result<(), MeshError> {
        let envelope = SignalEnvelope::new(
            self.local_id.as_ref(),
            dest,
            kind,
            serde_json::to_value(data)?,
        );
        self.send_envelope(&envelope)
    }

    pub fn send_envelope(&self, envelope: &SignalEnvelope) -> Result<(), MeshError> {
        let text = envelope.encode()?;
        tracing::trace!(
            target = "signaling",
            event = "out",
            kind = ?envelope.kind,
            dest = %envelope.dest,
            len = text.len()
        );
        self.frames.send(text).map_err(|_| MeshError::ChannelClosed)
    }
}

pub struct SignalingChannel {
    sender: SignalSender,
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SignalingChannel {
    /// Build a channel over raw frame pipes. `inbound` ending is reported as
    /// [`ChannelEvent::Closed`].
    pub fn from_frames(
        local_id: impl Into<Arc<str>>,
        outbound: mpsc::UnboundedSender<String>,
        mut inbound: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        let sender = SignalSender::new(local_id, outbound);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let local = sender.local_id.clone();
        let decoder = tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let envelope = match SignalEnvelope::decode(&frame) {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        tracing::warn!(
                            target = "signaling",
                            len = frame.len(),
                            error = %err,
                            "dropping undecodable frame"
                        );
                        continue;
                    }
                };
                if !envelope.is_for(&local) {
                    continue;
                }
                tracing::trace!(
                    target = "signaling",
                    event = "in",
                    kind = ?envelope.kind,
                    src = %envelope.src
                );
                if events_tx.send(ChannelEvent::Envelope(envelope)).is_err() {
                    return;
                }
            }
            tracing::debug!(target = "signaling", local_id = %local, "signaling transport ended");
            let _ = events_tx.send(ChannelEvent::Closed);
        });
        Self {
            sender,
            events: Some(events_rx),
            tasks: Mutex::new(vec![decoder]),
        }
    }

    pub(crate) fn attach_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().push(handle);
    }

    pub fn local_id(&self) -> &str {
        self.sender.local_id()
    }

    pub fn sender(&self) -> SignalSender {
        self.sender.clone()
    }

    pub fn send<T: Serialize>(&self, kind: MessageKind, dest: &str, data: &T) -> Result<(), MeshError> {
        self.sender.send(kind, dest, data)
    }

    /// Inbound events in arrival order. Can be taken once.
    pub fn subscribe(&mut self) -> Result<mpsc::UnboundedReceiver<ChannelEvent>, MeshError> {
        self.events.take().ok_or(MeshError::AlreadySubscribed)
    }

    pub fn close(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.close();
    }
}
