use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "classroom-probe")]
#[command(about = "Join a classroom session and report what the mesh negotiates")]
pub struct Cli {
    /// Relay base URL; http(s) is mapped to ws(s)
    #[arg(long, env = "CLASSROOM_RELAY_URL", default_value = "ws://localhost:8080")]
    pub relay: String,

    /// Session to join
    #[arg(short, long, env = "CLASSROOM_SESSION")]
    pub session: String,

    /// Participant id; a random one is generated when omitted
    #[arg(long)]
    pub id: Option<String>,

    /// Mesh settings as TOML; environment variables are used otherwise
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Publish a synthetic VP8 camera track
    #[arg(long)]
    pub camera: bool,

    /// Send a chat message to everyone once the first peer is ready
    #[arg(long)]
    pub greet: Option<String>,
}
