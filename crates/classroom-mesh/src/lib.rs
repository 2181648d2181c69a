pub mod config;
pub mod connection;
pub mod coordinator;
pub mod correlator;
pub mod devices;
pub mod error;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod signaling;

#[cfg(test)]
mod tests;

pub use config::{IceConfig, MeshConfig, RolePolicy, TurnCredentials};
pub use coordinator::{Coordinator, MeshEvent};
pub use error::MeshError;
pub use protocol::{MessageKind, SignalEnvelope, StreamKind};
pub use runtime::{Mesh, MeshHandle, spawn};
pub use signaling::{LocalRelay, SignalingChannel};
