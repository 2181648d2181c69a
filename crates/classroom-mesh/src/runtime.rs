//! Drives a [`Coordinator`] on a single task.
//!
//! Signaling frames, connection events, caller commands and correlation
//! deadlines are handled one at a time, so the coordinator never sees two
//! mutations interleave.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::MeshConfig;
use crate::connection::{ConnectionFactory, LocalMediaTrack, LocalTrackOf, RemoteTrackOf};
use crate::coordinator::{Coordinator, MeshEvent};
use crate::devices::{DeviceAccess, DeviceSelection};
use crate::error::MeshError;
use crate::protocol::{MessageKind, StreamKind};
use crate::signaling::{ChannelEvent, SignalingChannel};

#[derive(Debug)]
enum Command<T> {
    AddTrack { track: T, kind: StreamKind },
    ReplaceTrack { old_id: String, track: T },
    RemoveTrack { track_id: String },
    AddPeer { peer_id: String },
    RemovePeer { peer_id: String },
    Send { kind: MessageKind, dest: String, data: Value },
    Close,
}

/// Caller-facing handle to a running mesh. Dropping every handle closes the
/// mesh.
pub struct MeshHandle<T> {
    local_id: String,
    commands: mpsc::UnboundedSender<Command<T>>,
}

impl<T> Clone for MeshHandle<T> {
    fn clone(&self) -> Self {
        Self {
            local_id: self.local_id.clone(),
            commands: self.commands.clone(),
        }
    }
}

impl<T: LocalMediaTrack> MeshHandle<T> {
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    fn command(&self, command: Command<T>) -> Result<(), MeshError> {
        self.commands.send(command).map_err(|_| MeshError::ChannelClosed)
    }

    pub fn add_track(&self, track: T, kind: StreamKind) -> Result<(), MeshError> {
        self.command(Command::AddTrack { track, kind })
    }

    pub fn replace_track(&self, old_id: impl Into<String>, track: T) -> Result<(), MeshError> {
        self.command(Command::ReplaceTrack {
            old_id: old_id.into(),
            track,
        })
    }

    pub fn remove_track(&self, track_id: impl Into<String>) -> Result<(), MeshError> {
        self.command(Command::RemoveTrack {
            track_id: track_id.into(),
        })
    }

    pub fn add_peer(&self, peer_id: impl Into<String>) -> Result<(), MeshError> {
        self.command(Command::AddPeer {
            peer_id: peer_id.into(),
        })
    }

    pub fn remove_peer(&self, peer_id: impl Into<String>) -> Result<(), MeshError> {
        self.command(Command::RemovePeer {
            peer_id: peer_id.into(),
        })
    }

    pub fn send_chat(&self, dest: impl Into<String>, text: impl Into<String>) -> Result<(), MeshError> {
        self.send(MessageKind::Chat, dest, Value::String(text.into()))
    }

    pub fn send(&self, kind: MessageKind, dest: impl Into<String>, data: Value) -> Result<(), MeshError> {
        self.command(Command::Send {
            kind,
            dest: dest.into(),
            data,
        })
    }

    pub fn close(&self) -> Result<(), MeshError> {
        self.command(Command::Close)
    }

    /// Acquire the selected camera/microphone and publish the tracks as
    /// `camera`. Returns how many tracks were published.
    pub async fn publish_camera<D>(&self, devices: &D, selection: &DeviceSelection) -> Result<usize, MeshError>
    where
        D: DeviceAccess<Track = T>,
    {
        let tracks = selection.acquire(devices).await?;
        let count = tracks.len();
        for track in tracks {
            self.add_track(track, StreamKind::Camera)?;
        }
        Ok(count)
    }

    pub async fn publish_screen<D>(&self, devices: &D) -> Result<usize, MeshError>
    where
        D: DeviceAccess<Track = T>,
    {
        let tracks = devices.screen_stream().await?.unwrap_or_default();
        let count = tracks.len();
        for track in tracks {
            self.add_track(track, StreamKind::ScreenShare)?;
        }
        Ok(count)
    }
}

pub struct Mesh<F: ConnectionFactory> {
    pub handle: MeshHandle<LocalTrackOf<F>>,
    pub events: mpsc::UnboundedReceiver<MeshEvent<RemoteTrackOf<F>>>,
    /// Ends with `Err(SignalingClosed)` when the relay goes away.
    pub task: JoinHandle<Result<(), MeshError>>,
}

/// Join the session on `channel` and start negotiating with everyone in it.
pub fn spawn<F: ConnectionFactory>(
    config: MeshConfig,
    factory: F,
    mut channel: SignalingChannel,
) -> Result<Mesh<F>, MeshError> {
    let mut signaling = channel.subscribe()?;
    let (mut coordinator, mut connection_events, events) =
        Coordinator::new(config, factory, channel.sender());
    let (command_tx, mut commands) = mpsc::unbounded_channel();
    let handle = MeshHandle {
        local_id: coordinator.local_id().to_string(),
        commands: command_tx,
    };

    let task = tokio::spawn(async move {
        coordinator.announce()?;
        tracing::info!(target = "mesh", local_id = %coordinator.local_id(), "joined session");
        loop {
            let deadline = coordinator.next_correlation_deadline();
            tokio::select! {
                event = signaling.recv() => match event {
                    Some(ChannelEvent::Envelope(envelope)) => {
                        coordinator.handle_inbound(envelope).await;
                    }
                    Some(ChannelEvent::Closed) | None => {
                        coordinator.handle_signaling_lost().await;
                        return Err(MeshError::SignalingClosed);
                    }
                },
                Some(event) = connection_events.recv() => {
                    coordinator.handle_connection_event(event).await;
                }
                command = commands.recv() => match command {
                    Some(Command::Close) | None => {
                        coordinator.close().await;
                        channel.close();
                        tracing::info!(target = "mesh", "mesh closed");
                        return Ok(());
                    }
                    Some(command) => apply(&mut coordinator, command).await,
                },
                _ = wait_until(deadline) => {
                    coordinator.expire_correlations(Instant::now());
                }
            }
        }
    });

    Ok(Mesh {
        handle,
        events,
        task,
    })
}

async fn apply<F: ConnectionFactory>(coordinator: &mut Coordinator<F>, command: Command<LocalTrackOf<F>>) {
    match command {
        Command::AddTrack { track, kind } => coordinator.add_track(track, kind).await,
        Command::ReplaceTrack { old_id, track } => {
            coordinator.replace_track(&old_id, track).await;
        }
        Command::RemoveTrack { track_id } => {
            coordinator.remove_track(&track_id).await;
        }
        Command::AddPeer { peer_id } => {
            if let Err(err) = coordinator.add_peer(&peer_id).await {
                tracing::warn!(target = "mesh", peer_id = %peer_id, error = %err, "add peer failed");
            }
        }
        Command::RemovePeer { peer_id } => {
            coordinator.remove_peer(&peer_id).await;
        }
        Command::Send { kind, dest, data } => {
            if let Err(err) = coordinator.send(kind, &dest, &data) {
                tracing::warn!(target = "mesh", dest = %dest, error = %err, "send failed");
            }
        }
        Command::Close => coordinator.close().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
