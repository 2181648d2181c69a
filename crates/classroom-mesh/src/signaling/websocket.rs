use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message, error::ProtocolError},
};
use url::Url;

use super::SignalingChannel;
use crate::error::MeshError;

/// Websocket URL of one classroom session: `<relay>/<session_id>`, with
/// `http(s)` mapped onto `ws(s)`.
pub fn session_url(relay_url: &str, session_id: &str) -> Result<Url, MeshError> {
    if session_id.is_empty() || session_id.contains('/') {
        return Err(MeshError::Setup(format!("invalid session id '{session_id}'")));
    }
    let mut url = Url::parse(relay_url)
        .map_err(|err| MeshError::Setup(format!("invalid relay url {relay_url}: {err}")))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(MeshError::Setup(format!("unsupported relay scheme '{other}'")));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| MeshError::Setup("invalid websocket scheme".into()))?;
    url.path_segments_mut()
        .map_err(|_| MeshError::Setup("relay url cannot carry a path".into()))?
        .pop_if_empty()
        .push(session_id);
    url.set_fragment(None);
    Ok(url)
}

/// Join a session on a websocket relay.
pub async fn connect(
    relay_url: &str,
    session_id: &str,
    local_id: &str,
) -> Result<SignalingChannel, MeshError> {
    let url = session_url(relay_url, session_id)?;
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .map_err(|err| MeshError::Setup(format!("websocket connect failed: {err}")))?;
    tracing::debug!(
        target = "signaling",
        url = %url,
        local_id = %local_id,
        "signaling websocket connected"
    );
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(err) = ws_write.send(Message::Text(frame)).await {
                tracing::debug!(target = "signaling", "signaling websocket write failed: {err}");
                break;
            }
        }
        let _ = ws_write.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(msg) = ws_read.next().await {
            let frame = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    match &err {
                        WsError::ConnectionClosed
                        | WsError::AlreadyClosed
                        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                            tracing::debug!(target = "signaling", "signaling websocket closed: {err}");
                        }
                        _ => {
                            tracing::warn!(target = "signaling", "signaling websocket error: {err}");
                        }
                    }
                    break;
                }
            };
            if in_tx.send(frame).is_err() {
                break;
            }
        }
    });

    let channel = SignalingChannel::from_frames(local_id, out_tx, in_rx);
    channel.attach_task(writer);
    channel.attach_task(reader);
    Ok(channel)
}
