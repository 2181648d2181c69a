use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

pub const DEFAULT_SIDE_CHANNEL_LABEL: &str = "classroom-correlation";
pub const DEFAULT_CORRELATION_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// How the two ends of a session agree on which one is polite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RolePolicy {
    /// The side that learns about the other through a presence announcement
    /// is impolite; the side that receives an unsolicited offer is polite.
    /// Two participants that announce before seeing each other both end up
    /// impolite.
    #[default]
    FirstContact,
    /// The lexicographically smaller participant id is impolite.
    CompareIds,
}

impl RolePolicy {
    fn parse(value: &str) -> Result<Self, MeshError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first-contact" | "first_contact" => Ok(RolePolicy::FirstContact),
            "compare-ids" | "compare_ids" => Ok(RolePolicy::CompareIds),
            other => Err(MeshError::Config(format!("unknown role policy '{other}'"))),
        }
    }
}

/// Short-lived TURN credential pair handed out by the classroom API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCredentials {
    pub username: String,
    pub password: String,
}

/// Network traversal servers used by every peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            urls: vec![DEFAULT_STUN_URL.to_string()],
            username: None,
            credential: None,
        }
    }
}

impl IceConfig {
    /// No STUN/TURN; host candidates only.
    pub fn localhost() -> Self {
        Self {
            urls: Vec::new(),
            username: None,
            credential: None,
        }
    }

    pub fn with_turn(mut self, url: impl Into<String>, credentials: TurnCredentials) -> Self {
        self.urls.push(url.into());
        self.username = Some(credentials.username);
        self.credential = Some(credentials.password);
        self
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// How long an inbound track waits for its `{sid, kind}` before it is
    /// surfaced as uncorrelated.
    pub correlation_timeout_ms: u64,
    pub role_policy: RolePolicy,
    pub side_channel_label: String,
    pub ice: IceConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            correlation_timeout_ms: DEFAULT_CORRELATION_TIMEOUT_MS,
            role_policy: RolePolicy::default(),
            side_channel_label: DEFAULT_SIDE_CHANNEL_LABEL.to_string(),
            ice: IceConfig::default(),
        }
    }
}

impl MeshConfig {
    /// Load configuration from `CLASSROOM_MESH_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, MeshError> {
        let mut config = Self::default();
        if let Ok(value) = env::var("CLASSROOM_MESH_CORRELATION_TIMEOUT_MS") {
            config.correlation_timeout_ms = value.trim().parse().map_err(|err| {
                MeshError::Config(format!("invalid correlation timeout '{value}': {err}"))
            })?;
        }
        if let Ok(value) = env::var("CLASSROOM_MESH_ROLE_POLICY") {
            config.role_policy = RolePolicy::parse(&value)?;
        }
        if let Ok(value) = env::var("CLASSROOM_MESH_SIDE_CHANNEL_LABEL") {
            if value.trim().is_empty() {
                return Err(MeshError::Config("side channel label is empty".into()));
            }
            config.side_channel_label = value;
        }
        if let Ok(value) = env::var("CLASSROOM_MESH_ICE_URLS") {
            config.ice.urls = value
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.ice.username = env::var("CLASSROOM_MESH_ICE_USERNAME").ok();
        config.ice.credential = env::var("CLASSROOM_MESH_ICE_CREDENTIAL").ok();
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, MeshError> {
        Ok(toml::from_str(text)?)
    }

    pub fn correlation_timeout(&self) -> Duration {
        Duration::from_millis(self.correlation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    const VARS: [&str; 6] = [
        "CLASSROOM_MESH_CORRELATION_TIMEOUT_MS",
        "CLASSROOM_MESH_ROLE_POLICY",
        "CLASSROOM_MESH_SIDE_CHANNEL_LABEL",
        "CLASSROOM_MESH_ICE_URLS",
        "CLASSROOM_MESH_ICE_USERNAME",
        "CLASSROOM_MESH_ICE_CREDENTIAL",
    ];

    fn clear_env() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn default_config() {
        let config = MeshConfig::default();
        assert_eq!(config.correlation_timeout(), Duration::from_secs(3));
        assert_eq!(config.role_policy, RolePolicy::FirstContact);
        assert_eq!(config.side_channel_label, "classroom-correlation");
        assert_eq!(config.ice.urls, vec![DEFAULT_STUN_URL.to_string()]);
    }

    #[test]
    fn from_env_without_vars_is_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert_eq!(MeshConfig::from_env().unwrap(), MeshConfig::default());
    }

    #[test]
    fn from_env_reads_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var("CLASSROOM_MESH_CORRELATION_TIMEOUT_MS", "750");
            env::set_var("CLASSROOM_MESH_ROLE_POLICY", "compare-ids");
            env::set_var(
                "CLASSROOM_MESH_ICE_URLS",
                "stun:stun.example.com:3478, turn:turn.example.com:3478",
            );
            env::set_var("CLASSROOM_MESH_ICE_USERNAME", "1700000000:alice");
            env::set_var("CLASSROOM_MESH_ICE_CREDENTIAL", "secret");
        }
        let config = MeshConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.correlation_timeout(), Duration::from_millis(750));
        assert_eq!(config.role_policy, RolePolicy::CompareIds);
        assert_eq!(
            config.ice.urls,
            vec![
                "stun:stun.example.com:3478".to_string(),
                "turn:turn.example.com:3478".to_string()
            ]
        );
        assert_eq!(config.ice.username.as_deref(), Some("1700000000:alice"));
        assert_eq!(config.ice.credential.as_deref(), Some("secret"));
    }

    #[test]
    fn from_env_rejects_bad_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var("CLASSROOM_MESH_ROLE_POLICY", "alphabetical");
        }
        let result = MeshConfig::from_env();
        clear_env();
        assert!(matches!(result, Err(MeshError::Config(_))));
    }

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = MeshConfig::from_toml_str(
            r#"
            correlation_timeout_ms = 1200
            role_policy = "compare-ids"

            [ice]
            urls = ["turn:turn.example.com:3478"]
            username = "u"
            credential = "p"
            "#,
        )
        .unwrap();
        assert_eq!(config.correlation_timeout_ms, 1200);
        assert_eq!(config.role_policy, RolePolicy::CompareIds);
        assert_eq!(config.side_channel_label, DEFAULT_SIDE_CHANNEL_LABEL);
        assert_eq!(config.ice.username.as_deref(), Some("u"));
    }

    #[test]
    fn turn_credentials_extend_ice_config() {
        let ice = IceConfig::localhost().with_turn(
            "turn:turn.example.com:3478",
            TurnCredentials {
                username: "user".into(),
                password: "pass".into(),
            },
        );
        assert_eq!(ice.urls, vec!["turn:turn.example.com:3478".to_string()]);
        assert_eq!(ice.credential.as_deref(), Some("pass"));
    }
}
