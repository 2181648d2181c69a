use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Semantic purpose of a media stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StreamKind {
    Camera,
    ScreenShare,
    Uncorrelated,
    Other(String),
}

impl StreamKind {
    pub fn as_str(&self) -> &str {
        match self {
            StreamKind::Camera => "camera",
            StreamKind::ScreenShare => "screen-share",
            StreamKind::Uncorrelated => "uncorrelated",
            StreamKind::Other(value) => value,
        }
    }
}

impl From<String> for StreamKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "camera" => StreamKind::Camera,
            "screen-share" => StreamKind::ScreenShare,
            "uncorrelated" => StreamKind::Uncorrelated,
            _ => StreamKind::Other(value),
        }
    }
}

impl From<&str> for StreamKind {
    fn from(value: &str) -> Self {
        StreamKind::from(value.to_string())
    }
}

impl From<StreamKind> for String {
    fn from(value: StreamKind) -> Self {
        match value {
            StreamKind::Other(value) => value,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyTag {
    #[serde(rename = "ready")]
    Ready,
}

/// Payloads carried on the per-session side channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrelationMessage {
    Stream { sid: String, kind: StreamKind },
    Ready { kind: ReadyTag },
}

impl CorrelationMessage {
    pub fn ready() -> Self {
        CorrelationMessage::Ready {
            kind: ReadyTag::Ready,
        }
    }

    pub fn stream(sid: impl Into<String>, kind: StreamKind) -> Self {
        CorrelationMessage::Stream {
            sid: sid.into(),
            kind,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CorrelationMessage::Ready { .. })
    }

    pub fn encode(&self) -> Result<String, MeshError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, MeshError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn ready_marker_wire_shape() {
        let text = CorrelationMessage::ready().encode().unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"kind": "ready"}));
        assert!(CorrelationMessage::decode(r#"{"kind":"ready"}"#).unwrap().is_ready());
    }

    #[test]
    fn stream_correlation_wire_shape() {
        let message = CorrelationMessage::stream("stream-1", StreamKind::ScreenShare);
        let value: Value = serde_json::from_str(&message.encode().unwrap()).unwrap();
        assert_eq!(value, json!({"sid": "stream-1", "kind": "screen-share"}));

        let parsed = CorrelationMessage::decode(r#"{"sid":"s","kind":"camera"}"#).unwrap();
        assert_eq!(parsed, CorrelationMessage::stream("s", StreamKind::Camera));
    }

    #[test]
    fn unrecognized_kinds_are_kept_verbatim() {
        let parsed = CorrelationMessage::decode(r#"{"sid":"s","kind":"whiteboard"}"#).unwrap();
        assert_eq!(
            parsed,
            CorrelationMessage::stream("s", StreamKind::Other("whiteboard".into()))
        );
        assert_eq!(StreamKind::from("whiteboard").to_string(), "whiteboard");
    }

    #[test]
    fn rejects_payloads_without_kind() {
        assert!(CorrelationMessage::decode(r#"{"sid":"s"}"#).is_err());
        assert!(CorrelationMessage::decode(r#"{"kind":"camera"}"#).is_err());
    }
}
