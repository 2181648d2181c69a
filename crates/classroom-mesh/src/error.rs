use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("setup error: {0}")]
    Setup(String),
    #[error("channel closed")]
    ChannelClosed,
    #[error("signaling relay closed")]
    SignalingClosed,
    #[error("event stream already taken")]
    AlreadySubscribed,
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("invalid session description: {0}")]
    InvalidDescription(String),
    #[error("config error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for MeshError {
    fn from(value: toml::de::Error) -> Self {
        MeshError::Config(value.to_string())
    }
}

impl From<webrtc::Error> for MeshError {
    fn from(value: webrtc::Error) -> Self {
        MeshError::Connection(value.to_string())
    }
}
