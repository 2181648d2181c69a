//! [`MediaConnection`] over the `webrtc` crate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::sdp::SessionDescription as ParsedSdp;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::{
    ConnectionEvent, ConnectionFactory, EventSink, IceState, LocalMediaTrack, MediaConnection,
    RemoteMediaTrack,
};
use crate::config::{IceConfig, MeshConfig};
use crate::error::MeshError;
use crate::protocol::{IceCandidate, SdpType, SessionDescription};

#[derive(Clone)]
pub struct RtcLocalTrack(Arc<dyn TrackLocal + Send + Sync>);

impl RtcLocalTrack {
    pub fn new(track: Arc<dyn TrackLocal + Send + Sync>) -> Self {
        Self(track)
    }

    pub fn inner(&self) -> &Arc<dyn TrackLocal + Send + Sync> {
        &self.0
    }
}

impl LocalMediaTrack for RtcLocalTrack {
    fn id(&self) -> String {
        self.0.id().to_string()
    }

    fn stream_id(&self) -> String {
        self.0.stream_id().to_string()
    }
}

#[derive(Clone)]
pub struct RtcRemoteTrack(Arc<TrackRemote>);

impl RtcRemoteTrack {
    pub fn inner(&self) -> &Arc<TrackRemote> {
        &self.0
    }
}

impl RemoteMediaTrack for RtcRemoteTrack {
    fn id(&self) -> String {
        self.0.id()
    }

    fn stream_id(&self) -> String {
        self.0.stream_id()
    }
}

pub fn ice_servers(config: &IceConfig) -> Vec<RTCIceServer> {
    if config.urls.is_empty() {
        return Vec::new();
    }
    vec![RTCIceServer {
        urls: config.urls.clone(),
        username: config.username.clone().unwrap_or_default(),
        credential: config.credential.clone().unwrap_or_default(),
        ..Default::default()
    }]
}

pub struct RtcConnectionFactory {
    api: Arc<API>,
    ice_servers: Vec<RTCIceServer>,
    side_channel_label: String,
}

impl RtcConnectionFactory {
    pub fn new(config: &MeshConfig) -> Result<Self, MeshError> {
        Self::with_setting_engine(config, SettingEngine::default())
    }

    pub fn with_setting_engine(config: &MeshConfig, settings: SettingEngine) -> Result<Self, MeshError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(settings)
            .build();
        Ok(Self {
            api: Arc::new(api),
            ice_servers: ice_servers(&config.ice),
            side_channel_label: config.side_channel_label.clone(),
        })
    }
}

#[async_trait]
impl ConnectionFactory for RtcConnectionFactory {
    type Connection = RtcConnection;

    async fn open(
        &self,
        peer_id: &str,
        events: EventSink<RtcRemoteTrack>,
    ) -> Result<RtcConnection, MeshError> {
        let peer = Arc::new(
            self.api
                .new_peer_connection(RTCConfiguration {
                    ice_servers: self.ice_servers.clone(),
                    ..Default::default()
                })
                .await?,
        );
        let side_channel = Arc::new(Mutex::new(None));
        let remote_tracks = ReportedTracks::default();
        wire_peer(&peer, &events, &side_channel, &remote_tracks, &self.side_channel_label);
        tracing::debug!(target = "webrtc", peer_id = %peer_id, "peer connection created");
        Ok(RtcConnection {
            peer,
            events,
            side_channel,
            remote_tracks,
        })
    }
}

/// Remote track ids surfaced through `on_track`, keyed by transceiver mid.
type ReportedTracks = Arc<Mutex<HashMap<String, String>>>;

pub struct RtcConnection {
    peer: Arc<RTCPeerConnection>,
    events: EventSink<RtcRemoteTrack>,
    side_channel: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    remote_tracks: ReportedTracks,
}

fn wire_peer(
    peer: &Arc<RTCPeerConnection>,
    events: &EventSink<RtcRemoteTrack>,
    side_channel: &Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    remote_tracks: &ReportedTracks,
    label: &str,
) {
    let sink = events.clone();
    peer.on_negotiation_needed(Box::new(move || {
        let sink = sink.clone();
        Box::pin(async move {
            sink.emit(ConnectionEvent::NegotiationNeeded);
        })
    }));

    let sink = events.clone();
    peer.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let sink = sink.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else {
                return;
            };
            match candidate.to_json() {
                Ok(init) => {
                    sink.emit(ConnectionEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                        username_fragment: init.username_fragment,
                    }));
                }
                Err(err) => {
                    tracing::warn!(
                        target = "webrtc",
                        peer_id = %sink.peer_id(),
                        error = %err,
                        "failed to serialize local candidate"
                    );
                }
            }
        })
    }));

    let sink = events.clone();
    peer.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
        let sink = sink.clone();
        Box::pin(async move {
            tracing::debug!(
                target = "webrtc",
                peer_id = %sink.peer_id(),
                state = %state,
                "ice connection state changed"
            );
            if let Some(state) = map_ice_state(state) {
                sink.emit(ConnectionEvent::IceStateChanged(state));
            }
        })
    }));

    let sink = events.clone();
    let reported = Arc::clone(remote_tracks);
    peer.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              transceiver: Arc<RTCRtpTransceiver>| {
            let sink = sink.clone();
            let reported = Arc::clone(&reported);
            Box::pin(async move {
                let mid = transceiver.mid().map(|mid| mid.to_string());
                tracing::debug!(
                    target = "webrtc",
                    peer_id = %sink.peer_id(),
                    track_id = %track.id(),
                    stream_id = %track.stream_id(),
                    mid = ?mid,
                    "remote track"
                );
                if let Some(mid) = mid {
                    reported.lock().insert(mid, track.id());
                }
                sink.emit(ConnectionEvent::Track(RtcRemoteTrack(track)));
            })
        },
    ));

    let sink = events.clone();
    let slot = Arc::clone(side_channel);
    let expected = label.to_string();
    peer.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
        let sink = sink.clone();
        let slot = Arc::clone(&slot);
        let expected = expected.clone();
        Box::pin(async move {
            if channel.label() != expected {
                tracing::debug!(
                    target = "webrtc",
                    peer_id = %sink.peer_id(),
                    label = %channel.label(),
                    "ignoring unexpected data channel"
                );
                return;
            }
            wire_side_channel(&channel, &sink);
            *slot.lock() = Some(channel);
        })
    }));
}

fn wire_side_channel(channel: &Arc<RTCDataChannel>, events: &EventSink<RtcRemoteTrack>) {
    let sink = events.clone();
    channel.on_open(Box::new(move || {
        Box::pin(async move {
            sink.emit(ConnectionEvent::SideChannelOpen);
        })
    }));

    let sink = events.clone();
    channel.on_message(Box::new(move |message: DataChannelMessage| {
        let sink = sink.clone();
        Box::pin(async move {
            match String::from_utf8(message.data.to_vec()) {
                Ok(text) => {
                    sink.emit(ConnectionEvent::SideChannelMessage(text));
                }
                Err(_) => {
                    tracing::debug!(
                        target = "webrtc",
                        peer_id = %sink.peer_id(),
                        "dropping binary side channel message"
                    );
                }
            }
        })
    }));

    let sink = events.clone();
    channel.on_close(Box::new(move || {
        let sink = sink.clone();
        Box::pin(async move {
            sink.emit(ConnectionEvent::SideChannelClosed);
        })
    }));
}

fn map_ice_state(state: RTCIceConnectionState) -> Option<IceState> {
    match state {
        RTCIceConnectionState::New => Some(IceState::New),
        RTCIceConnectionState::Checking => Some(IceState::Checking),
        RTCIceConnectionState::Connected => Some(IceState::Connected),
        RTCIceConnectionState::Completed => Some(IceState::Completed),
        RTCIceConnectionState::Disconnected => Some(IceState::Disconnected),
        RTCIceConnectionState::Failed => Some(IceState::Failed),
        RTCIceConnectionState::Closed => Some(IceState::Closed),
        _ => None,
    }
}

/// Mids of the media sections in which the remote side no longer sends:
/// rejected sections and those marked `recvonly` or `inactive`.
fn silenced_mids(description: &ParsedSdp) -> Vec<String> {
    description
        .media_descriptions
        .iter()
        .filter(|media| {
            media.media_name.port.value == 0
                || media.attribute("recvonly").is_some()
                || media.attribute("inactive").is_some()
        })
        .filter_map(|media| media.attribute("mid").flatten().map(str::to_string))
        .collect()
}

/// An empty sdp is rejected for rollback, so reuse the pending offer's.
fn rollback_of(pending: &RTCSessionDescription) -> Result<RTCSessionDescription, MeshError> {
    Ok(serde_json::from_value(json!({"type": "rollback", "sdp": pending.sdp}))?)
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, MeshError> {
    let converted = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        SdpType::Rollback => {
            return Err(MeshError::InvalidDescription(
                "rollback cannot be applied as a remote description".into(),
            ));
        }
    };
    Ok(converted)
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription, MeshError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        other => {
            return Err(MeshError::InvalidDescription(format!(
                "unexpected local description type {other}"
            )));
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

impl RtcConnection {
    async fn installed_local_description(
        &self,
        fallback: RTCSessionDescription,
    ) -> Result<SessionDescription, MeshError> {
        let local = self.peer.local_description().await.unwrap_or(fallback);
        from_rtc_description(local)
    }

    /// Report the end of every surfaced remote track whose section the
    /// remote description stopped sending on.
    fn end_silenced_tracks(&self, description: &ParsedSdp) {
        let ended: Vec<String> = {
            let mut reported = self.remote_tracks.lock();
            silenced_mids(description)
                .iter()
                .filter_map(|mid| reported.remove(mid))
                .collect()
        };
        for track_id in ended {
            tracing::debug!(
                target = "webrtc",
                peer_id = %self.events.peer_id(),
                track_id = %track_id,
                "remote track ended"
            );
            self.events.emit(ConnectionEvent::TrackEnded { track_id });
        }
    }
}

#[async_trait]
impl MediaConnection for RtcConnection {
    type LocalTrack = RtcLocalTrack;
    type RemoteTrack = RtcRemoteTrack;
    type Sender = Arc<RTCRtpSender>;

    async fn create_offer(&self) -> Result<SessionDescription, MeshError> {
        let offer = self.peer.create_offer(None).await?;
        self.peer.set_local_description(offer.clone()).await?;
        self.installed_local_description(offer).await
    }

    async fn create_answer(&self) -> Result<SessionDescription, MeshError> {
        let answer = self.peer.create_answer(None).await?;
        self.peer.set_local_description(answer.clone()).await?;
        self.installed_local_description(answer).await
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MeshError> {
        let description = to_rtc_description(description)?;
        let parsed = description.unmarshal()?;
        self.peer.set_remote_description(description).await?;
        self.end_silenced_tracks(&parsed);
        Ok(())
    }

    /// Roll back whichever side holds the pending offer. The webrtc 0.14
    /// signaling state machine has no rollback transition, so on that stack
    /// this reports the refusal and the caller drops the peer.
    async fn rollback(&self) -> Result<(), MeshError> {
        if let Some(local) = self.peer.pending_local_description().await {
            self.peer.set_local_description(rollback_of(&local)?).await?;
            return Ok(());
        }
        if let Some(remote) = self.peer.pending_remote_description().await {
            self.peer.set_remote_description(rollback_of(&remote)?).await?;
            return Ok(());
        }
        Err(MeshError::Connection("no pending offer to roll back".into()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), MeshError> {
        self.peer
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    fn is_stable(&self) -> bool {
        self.peer.signaling_state() == RTCSignalingState::Stable
    }

    async fn open_side_channel(&self, label: &str) -> Result<(), MeshError> {
        let channel = self
            .peer
            .create_data_channel(
                label,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await?;
        wire_side_channel(&channel, &self.events);
        *self.side_channel.lock() = Some(channel);
        Ok(())
    }

    async fn send_side_channel(&self, text: &str) -> Result<(), MeshError> {
        let channel = self
            .side_channel
            .lock()
            .clone()
            .ok_or_else(|| MeshError::Connection("side channel not open".into()))?;
        channel.send_text(text.to_string()).await?;
        Ok(())
    }

    async fn add_track(&self, track: &RtcLocalTrack) -> Result<Arc<RTCRtpSender>, MeshError> {
        let sender = self.peer.add_track(Arc::clone(track.inner())).await?;
        let rtcp_sender = Arc::clone(&sender);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtcp_sender.read(&mut buf).await.is_ok() {}
        });
        Ok(sender)
    }

    async fn replace_track(
        &self,
        sender: &Arc<RTCRtpSender>,
        track: &RtcLocalTrack,
    ) -> Result<(), MeshError> {
        sender.replace_track(Some(Arc::clone(track.inner()))).await?;
        Ok(())
    }

    async fn remove_track(&self, sender: &Arc<RTCRtpSender>) -> Result<(), MeshError> {
        self.peer.remove_track(sender).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), MeshError> {
        self.side_channel.lock().take();
        self.peer.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc::{self, UnboundedReceiver};
    use webrtc::api::media_engine::MIME_TYPE_VP8;
    use webrtc::ice::network_type::NetworkType;
    use webrtc::media::Sample;
    use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
    use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

    use super::*;
    use crate::connection::PeerEvent;

    #[test]
    fn ice_servers_carry_turn_credentials() {
        let servers = ice_servers(&IceConfig {
            urls: vec!["turn:turn.example.com:3478".into()],
            username: Some("user".into()),
            credential: Some("pass".into()),
        });
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].username, "user");
        assert_eq!(servers[0].credential, "pass");
        assert!(ice_servers(&IceConfig::localhost()).is_empty());
    }

    #[test]
    fn terminal_ice_states() {
        assert_eq!(
            map_ice_state(RTCIceConnectionState::Failed),
            Some(IceState::Failed)
        );
        assert!(map_ice_state(RTCIceConnectionState::Disconnected).is_some_and(IceState::is_terminal));
        assert!(!IceState::Connected.is_terminal());
        assert_eq!(map_ice_state(RTCIceConnectionState::Unspecified), None);
    }

    #[test]
    fn remote_rollback_is_rejected() {
        let result = to_rtc_description(SessionDescription {
            sdp_type: SdpType::Rollback,
            sdp: String::new(),
        });
        assert!(matches!(result, Err(MeshError::InvalidDescription(_))));
    }

    #[test]
    fn sections_that_stop_sending_are_silenced() {
        let sdp = [
            "v=0",
            "o=- 1 2 IN IP4 127.0.0.1",
            "s=-",
            "t=0 0",
            "m=video 9 UDP/TLS/RTP/SAVPF 96",
            "c=IN IP4 0.0.0.0",
            "a=mid:0",
            "a=recvonly",
            "m=audio 9 UDP/TLS/RTP/SAVPF 111",
            "c=IN IP4 0.0.0.0",
            "a=mid:1",
            "a=sendrecv",
            "m=video 0 UDP/TLS/RTP/SAVPF 96",
            "c=IN IP4 0.0.0.0",
            "a=mid:2",
            "m=video 9 UDP/TLS/RTP/SAVPF 96",
            "c=IN IP4 0.0.0.0",
            "a=mid:3",
            "a=inactive",
            "m=application 9 UDP/DTLS/SCTP webrtc-datachannel",
            "c=IN IP4 0.0.0.0",
            "a=mid:4",
            "",
        ]
        .join("\r\n");
        let parsed = RTCSessionDescription::offer(sdp).unwrap().unmarshal().unwrap();
        assert_eq!(silenced_mids(&parsed), vec!["0", "2", "3"]);
    }

    fn loopback_factory() -> RtcConnectionFactory {
        let mut settings = SettingEngine::default();
        settings.set_include_loopback_candidate(true);
        settings.set_network_types(vec![NetworkType::Udp4]);
        RtcConnectionFactory::with_setting_engine(
            &MeshConfig {
                ice: IceConfig::localhost(),
                ..MeshConfig::default()
            },
            settings,
        )
        .unwrap()
    }

    async fn open(
        factory: &RtcConnectionFactory,
        peer_id: &str,
    ) -> (RtcConnection, UnboundedReceiver<PeerEvent<RtcRemoteTrack>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = factory.open(peer_id, EventSink::new(peer_id, 1, tx)).await.unwrap();
        (connection, rx)
    }

    /// The local description once gathering finished, candidates included.
    async fn gathered(connection: &RtcConnection) -> SessionDescription {
        let mut complete = connection.peer.gathering_complete_promise().await;
        let _ = complete.recv().await;
        let local = connection.peer.local_description().await.unwrap();
        from_rtc_description(local).unwrap()
    }

    async fn negotiate(offerer: &RtcConnection, answerer: &RtcConnection) {
        offerer.create_offer().await.unwrap();
        answerer
            .set_remote_description(gathered(offerer).await)
            .await
            .unwrap();
        answerer.create_answer().await.unwrap();
        offerer
            .set_remote_description(gathered(answerer).await)
            .await
            .unwrap();
    }

    async fn next_event<F>(
        events: &mut UnboundedReceiver<PeerEvent<RtcRemoteTrack>>,
        mut predicate: F,
    ) -> ConnectionEvent<RtcRemoteTrack>
    where
        F: FnMut(&ConnectionEvent<RtcRemoteTrack>) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(20), async {
            loop {
                let event = events.recv().await.expect("event stream ended").event;
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for connection event")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn removed_remote_track_is_reported_as_ended() {
        let factory = loopback_factory();
        let (sender, _sender_events) = open(&factory, "receiver").await;
        let (receiver, mut receiver_events) = open(&factory, "sender").await;

        let camera = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
            "cam".into(),
            "cam-stream".into(),
        ));
        let rtp_sender = sender
            .add_track(&RtcLocalTrack::new(camera.clone()))
            .await
            .unwrap();
        let writer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(20));
            loop {
                ticker.tick().await;
                let sample = Sample {
                    data: Bytes::from_static(&[0u8; 64]),
                    duration: Duration::from_millis(20),
                    ..Default::default()
                };
                let _ = camera.write_sample(&sample).await;
            }
        });

        negotiate(&sender, &receiver).await;
        match next_event(&mut receiver_events, |event| {
            matches!(event, ConnectionEvent::Track(_))
        })
        .await
        {
            ConnectionEvent::Track(track) => {
                assert_eq!(track.id(), "cam");
                assert_eq!(track.stream_id(), "cam-stream");
            }
            _ => unreachable!(),
        }

        sender.remove_track(&rtp_sender).await.unwrap();
        negotiate(&sender, &receiver).await;
        match next_event(&mut receiver_events, |event| {
            matches!(event, ConnectionEvent::TrackEnded { .. })
        })
        .await
        {
            ConnectionEvent::TrackEnded { track_id } => assert_eq!(track_id, "cam"),
            _ => unreachable!(),
        }
        assert!(receiver.remote_tracks.lock().is_empty());

        writer.abort();
        sender.close().await.unwrap();
        receiver.close().await.unwrap();
    }

    #[tokio::test]
    async fn stack_refusing_rollback_leaves_the_offer_pending() {
        let factory = loopback_factory();
        let (offerer, _offerer_events) = open(&factory, "answerer").await;
        let (answerer, _answerer_events) = open(&factory, "offerer").await;
        assert!(offerer.rollback().await.is_err());

        offerer.open_side_channel("classroom-correlation").await.unwrap();
        let offer = offerer.create_offer().await.unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert!(!offerer.is_stable());
        assert!(matches!(offerer.rollback().await, Err(MeshError::Connection(_))));
        assert!(!offerer.is_stable());

        answerer.set_remote_description(offer).await.unwrap();
        assert_eq!(
            answerer.peer.signaling_state(),
            RTCSignalingState::HaveRemoteOffer
        );
        assert!(matches!(answerer.rollback().await, Err(MeshError::Connection(_))));
        assert_eq!(
            answerer.peer.signaling_state(),
            RTCSignalingState::HaveRemoteOffer
        );

        offerer.close().await.unwrap();
        answerer.close().await.unwrap();
    }
}
