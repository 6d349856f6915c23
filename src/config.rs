use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use webrtc::ice_transport::ice_server::RTCIceServer;

use crate::error::{CallError, Result};
use crate::peer::types::MediaConstraints;
use crate::utils::add_ice_url_scheme;

/// Debug builds log the handshake in detail; release builds only report
/// warnings unless `RUST_LOG` or the config says otherwise.
#[cfg(debug_assertions)]
pub const DEFAULT_LOG_FILTER: &str = "ssc_call=debug,info";

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_FILTER: &str = "ssc_call=warn,warn";

/// Public STUN servers used when nothing is configured.
pub static DEFAULT_ICE_SERVERS: Lazy<Vec<IceServerConfig>> = Lazy::new(|| {
    vec![
        IceServerConfig {
            id: "default-stun-1".into(),
            r#type: "stun".into(),
            url: "stun:stun1.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
        IceServerConfig {
            id: "default-stun-2".into(),
            r#type: "stun".into(),
            url: "stun:stun2.l.google.com:19302".into(),
            username: None,
            credential: None,
        },
    ]
});

/// One STUN or TURN server as entered by the operator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IceServerConfig {
    pub id: String,
    pub r#type: String, // 'stun' or 'turn'
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(CallError::Config(format!(
                "ICE server '{}' has an empty URL",
                self.id
            )));
        }
        if self.r#type != "stun" && self.r#type != "turn" {
            return Err(CallError::Config(format!(
                "ICE server '{}' has unknown type '{}'",
                self.id, self.r#type
            )));
        }
        if self.r#type == "turn" && (self.username.is_none() || self.credential.is_none()) {
            return Err(CallError::Config(format!(
                "TURN server '{}' requires username and credential",
                self.id
            )));
        }
        Ok(())
    }

    pub fn to_rtc(&self) -> RTCIceServer {
        RTCIceServer {
            urls: vec![add_ice_url_scheme(self)],
            username: self.username.clone().unwrap_or_default(),
            credential: self.credential.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Settings for one participant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CallConfig {
    pub ice_servers: Vec<IceServerConfig>,
    pub ice_candidate_pool_size: u8,
    pub media: MediaConstraints,
    pub log_filter: Option<String>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_ICE_SERVERS.clone(),
            ice_candidate_pool_size: 10,
            media: MediaConstraints::default(),
            log_filter: None,
        }
    }
}

impl CallConfig {
    /// Reads a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: CallConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        info!(
            "Loaded call config from {} ({} ICE servers)",
            path.display(),
            config.ice_servers.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for server in &self.ice_servers {
            server.validate()?;
        }
        if !self.media.audio && !self.media.video {
            return Err(CallError::Config(
                "at least one of audio or video must be requested".into(),
            ));
        }
        Ok(())
    }

    pub fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        let servers: Vec<RTCIceServer> = self.ice_servers.iter().map(IceServerConfig::to_rtc).collect();
        debug!("Using {} ICE servers", servers.len());
        servers
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_use_public_stun() {
        let config = CallConfig::default();
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.ice_candidate_pool_size, 10);
        assert!(config.validate().is_ok());
        let rtc = config.rtc_ice_servers();
        assert_eq!(rtc[0].urls, vec!["stun:stun1.l.google.com:19302".to_string()]);
    }

    #[test]
    fn turn_without_credentials_is_rejected() {
        let server = IceServerConfig {
            id: "relay".into(),
            r#type: "turn".into(),
            url: "relay.example.org:3478".into(),
            username: Some("user".into()),
            credential: None,
        };
        assert!(matches!(server.validate(), Err(CallError::Config(_))));
    }

    #[test]
    fn load_merges_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"ice_servers":[{{"id":"t","type":"turn","url":"relay.example.org","username":"u","credential":"p"}}],"media":{{"audio":true,"video":false}}}}"#
        )
        .unwrap();

        let config = CallConfig::load(file.path()).unwrap();
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.ice_candidate_pool_size, 10);
        assert!(!config.media.video);
        assert_eq!(config.rtc_ice_servers()[0].urls, vec!["turn:relay.example.org".to_string()]);
        assert_eq!(config.rtc_ice_servers()[0].username, "u");
    }

    #[test]
    fn load_rejects_media_without_tracks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"media":{{"audio":false,"video":false}}}}"#).unwrap();
        assert!(matches!(CallConfig::load(file.path()), Err(CallError::Config(_))));
    }
}
