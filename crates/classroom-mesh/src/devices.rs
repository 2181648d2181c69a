//! Contract for the layer that turns local capture devices into tracks.
//!
//! Enumeration UI and permission prompts live outside the engine; the
//! engine only needs tracks for an explicit [`DeviceSelection`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::connection::LocalMediaTrack;
use crate::error::MeshError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    AudioInput,
    VideoInput,
    AudioOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub kind: DeviceKind,
    pub label: String,
}

impl DeviceInfo {
    /// Labels stay empty until the user has granted access.
    pub fn is_accessible(&self) -> bool {
        !self.label.is_empty() && self.label != "default"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DevicePermissions {
    pub microphone: bool,
    pub camera: bool,
}

#[async_trait]
pub trait DeviceAccess: Send + Sync {
    type Track: LocalMediaTrack;

    async fn devices(&self) -> Result<Vec<DeviceInfo>, MeshError>;

    /// `Ok(None)` when the device is unavailable or access was refused.
    async fn microphone_stream(&self, device_id: &str)
    -> Result<Option<Vec<Self::Track>>, MeshError>;

    async fn camera_stream(
        &self,
        device_id: &str,
        microphone_id: Option<&str>,
    ) -> Result<Option<Vec<Self::Track>>, MeshError>;

    async fn screen_stream(&self) -> Result<Option<Vec<Self::Track>>, MeshError>;

    async fn permissions(&self) -> Result<DevicePermissions, MeshError> {
        let devices = self.devices().await?;
        let granted = |kind: DeviceKind| {
            devices
                .iter()
                .any(|device| device.kind == kind && device.is_accessible())
        };
        Ok(DevicePermissions {
            microphone: granted(DeviceKind::AudioInput),
            camera: granted(DeviceKind::VideoInput),
        })
    }
}

/// Devices the caller picked; nothing is read from ambient storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    pub camera_id: Option<String>,
    pub microphone_id: Option<String>,
}

impl DeviceSelection {
    /// Tracks for the selection: camera with optional microphone audio, or
    /// microphone alone.
    pub async fn acquire<D: DeviceAccess>(&self, devices: &D) -> Result<Vec<D::Track>, MeshError> {
        let stream = match (&self.camera_id, &self.microphone_id) {
            (Some(camera), microphone) => {
                devices
                    .camera_stream(camera, microphone.as_deref())
                    .await?
            }
            (None, Some(microphone)) => devices.microphone_stream(microphone).await?,
            (None, None) => None,
        };
        Ok(stream.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Track(String);

    impl LocalMediaTrack for Track {
        fn id(&self) -> String {
            self.0.clone()
        }

        fn stream_id(&self) -> String {
            "local".into()
        }
    }

    struct Devices {
        listed: Vec<DeviceInfo>,
    }

    #[async_trait]
    impl DeviceAccess for Devices {
        type Track = Track;

        async fn devices(&self) -> Result<Vec<DeviceInfo>, MeshError> {
            Ok(self.listed.clone())
        }

        async fn microphone_stream(&self, device_id: &str) -> Result<Option<Vec<Track>>, MeshError> {
            Ok(Some(vec![Track(format!("audio:{device_id}"))]))
        }

        async fn camera_stream(
            &self,
            device_id: &str,
            microphone_id: Option<&str>,
        ) -> Result<Option<Vec<Track>>, MeshError> {
            if device_id == "missing" {
                return Ok(None);
            }
            let mut tracks = vec![Track(format!("video:{device_id}"))];
            if let Some(mic) = microphone_id {
                tracks.push(Track(format!("audio:{mic}")));
            }
            Ok(Some(tracks))
        }

        async fn screen_stream(&self) -> Result<Option<Vec<Track>>, MeshError> {
            Ok(None)
        }
    }

    fn device(kind: DeviceKind, label: &str) -> DeviceInfo {
        DeviceInfo {
            device_id: format!("{kind:?}-{label}"),
            kind,
            label: label.into(),
        }
    }

    #[tokio::test]
    async fn permissions_follow_device_labels() {
        let devices = Devices {
            listed: vec![
                device(DeviceKind::AudioInput, "Built-in Microphone"),
                device(DeviceKind::VideoInput, "default"),
                device(DeviceKind::VideoInput, ""),
            ],
        };
        let permissions = devices.permissions().await.unwrap();
        assert!(permissions.microphone);
        assert!(!permissions.camera);
    }

    #[tokio::test]
    async fn selection_acquires_camera_with_microphone() {
        let devices = Devices { listed: vec![] };
        let selection = DeviceSelection {
            camera_id: Some("cam".into()),
            microphone_id: Some("mic".into()),
        };
        let tracks = selection.acquire(&devices).await.unwrap();
        assert_eq!(tracks, vec![Track("video:cam".into()), Track("audio:mic".into())]);

        let audio_only = DeviceSelection {
            camera_id: None,
            microphone_id: Some("mic".into()),
        };
        assert_eq!(
            audio_only.acquire(&devices).await.unwrap(),
            vec![Track("audio:mic".into())]
        );
        assert!(DeviceSelection::default().acquire(&devices).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_camera_yields_no_tracks() {
        let devices = Devices { listed: vec![] };
        let selection = DeviceSelection {
            camera_id: Some("missing".into()),
            microphone_id: None,
        };
        assert!(selection.acquire(&devices).await.unwrap().is_empty());
    }

    #[test]
    fn device_kinds_use_browser_names() {
        assert_eq!(
            serde_json::to_string(&DeviceKind::VideoInput).unwrap(),
            "\"videoinput\""
        );
    }
}
