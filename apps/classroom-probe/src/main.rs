mod camera;
mod cli;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use classroom_mesh::connection::rtc::RtcConnectionFactory;
use classroom_mesh::connection::RemoteMediaTrack;
use classroom_mesh::{MeshConfig, MeshError, MeshEvent, StreamKind, signaling};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::camera::SyntheticCamera;
use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing()?;

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let local_id = cli
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let channel = signaling::connect(&cli.relay, &cli.session, &local_id)
        .await
        .with_context(|| format!("joining session {}", cli.session))?;
    let factory = RtcConnectionFactory::new(&config)?;
    let mut mesh = classroom_mesh::spawn(config, factory, channel)?;
    info!(local_id = %local_id, session = %cli.session, "joined classroom");

    let _camera = if cli.camera {
        let camera = SyntheticCamera::start(&local_id);
        mesh.handle.add_track(camera.track.clone(), StreamKind::Camera)?;
        Some(camera)
    } else {
        None
    };

    let mut greeted = false;
    loop {
        tokio::select! {
            event = mesh.events.recv() => {
                let Some(event) = event else { break };
                match event {
                    MeshEvent::PeerReady { peer_id } => {
                        info!(peer_id = %peer_id, "peer ready");
                        if let (Some(text), false) = (cli.greet.as_deref(), greeted) {
                            mesh.handle.send_chat("", text)?;
                            greeted = true;
                        }
                    }
                    MeshEvent::TrackAdded { peer_id, kind, track } => {
                        info!(
                            peer_id = %peer_id,
                            kind = %kind,
                            track_id = %track.id(),
                            stream_id = %track.stream_id(),
                            "track added"
                        );
                    }
                    MeshEvent::TrackRemoved { peer_id, kind, track } => {
                        info!(peer_id = %peer_id, kind = %kind, track_id = %track.id(), "track removed");
                    }
                    MeshEvent::PeerDisconnected { peer_id } => {
                        info!(peer_id = %peer_id, "peer disconnected");
                    }
                    MeshEvent::Message(envelope) => {
                        info!(from = %envelope.src, kind = ?envelope.kind, data = %envelope.data, "message");
                    }
                    MeshEvent::SignalingLost => {
                        warn!("relay connection lost");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("leaving classroom");
                let _ = mesh.handle.close();
                break;
            }
        }
    }

    match mesh.task.await.context("mesh task panicked")? {
        Ok(()) => Ok(()),
        Err(MeshError::SignalingClosed) => Err(anyhow!("relay closed the session")),
        Err(err) => Err(err.into()),
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,classroom_probe=info"));
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow!(err))
}

fn load_config(cli: &Cli) -> Result<MeshConfig> {
    match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(MeshConfig::from_toml_str(&text)?)
        }
        None => Ok(MeshConfig::from_env()?),
    }
}
