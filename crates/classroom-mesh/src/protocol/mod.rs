//! Wire types shared with the classroom relay and with remote participants.

pub mod correlation;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MeshError;

pub use correlation::{CorrelationMessage, StreamKind};

/// Relay message kinds. Integers the engine does not interpret decode as
/// [`MessageKind::Reserved`] and are surfaced to the caller untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum MessageKind {
    Hello,
    Chat,
    SessionDescription,
    IceCandidate,
    /// Any other integer. Codes 1 to 4 belong to the named kinds and would
    /// decode as those on the far side, so `Reserved(1..=4)` is never sent.
    Reserved(u32),
}

impl MessageKind {
    /// Whether this value survives an encode and decode unchanged.
    pub fn is_canonical(self) -> bool {
        MessageKind::from(u32::from(self)) == self
    }
}

impl From<u32> for MessageKind {
    fn from(value: u32) -> Self {
        match value {
            1 => MessageKind::Hello,
            2 => MessageKind::Chat,
            3 => MessageKind::SessionDescription,
            4 => MessageKind::IceCandidate,
            other => MessageKind::Reserved(other),
        }
    }
}

impl From<MessageKind> for u32 {
    fn from(value: MessageKind) -> Self {
        match value {
            MessageKind::Hello => 1,
            MessageKind::Chat => 2,
            MessageKind::SessionDescription => 3,
            MessageKind::IceCandidate => 4,
            MessageKind::Reserved(other) => other,
        }
    }
}

/// One relay frame. An empty `dest` addresses every participant in the
/// session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub src: String,
    #[serde(default)]
    pub dest: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub data: Value,
}

impl SignalEnvelope {
    pub fn new(src: impl Into<String>, dest: impl Into<String>, kind: MessageKind, data: Value) -> Self {
        Self {
            src: src.into(),
            dest: dest.into(),
            kind,
            data,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.dest.is_empty()
    }

    /// Whether a participant with `local_id` should see this frame.
    pub fn is_for(&self, local_id: &str) -> bool {
        self.src != local_id && (self.is_broadcast() || self.dest == local_id)
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, MeshError> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    pub fn encode(&self) -> Result<String, MeshError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, MeshError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description as browsers serialize `RTCSessionDescription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    #[serde(default)]
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.sdp_type == SdpType::Offer
    }
}

/// ICE candidate as browsers serialize `RTCIceCandidate.toJSON()`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}
