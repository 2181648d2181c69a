use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use classroom_mesh::connection::rtc::RtcLocalTrack;
use tokio::task::JoinHandle;
use webrtc::api::media_engine::MIME_TYPE_VP8;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Keyframe-sized filler. Receivers will not decode it, but RTP flows and the
/// track shows up on the far side.
static FILLER: [u8; 1200] = [0; 1200];

pub struct SyntheticCamera {
    pub track: RtcLocalTrack,
    pump: JoinHandle<()>,
}

impl SyntheticCamera {
    pub fn start(local_id: &str) -> Self {
        let sample_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90_000,
                ..Default::default()
            },
            format!("{local_id}-video"),
            format!("{local_id}-camera"),
        ));
        let writer = Arc::clone(&sample_track);
        let pump = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_INTERVAL);
            loop {
                ticker.tick().await;
                let sample = Sample {
                    data: Bytes::from_static(&FILLER),
                    duration: FRAME_INTERVAL,
                    ..Default::default()
                };
                if let Err(err) = writer.write_sample(&sample).await {
                    tracing::debug!(target = "webrtc", error = %err, "synthetic camera write failed");
                }
            }
        });
        Self {
            track: RtcLocalTrack::new(sample_track),
            pump,
        }
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
