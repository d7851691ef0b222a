//! Channel configuration.
//!
//! [`ChannelConfig`] holds plain values so it can be read from a file or the
//! environment. It is checked and turned into a [`SessionConfig`] once, when a
//! [`Channel`](crate::Channel) is created.

use std::time::Duration;

use ofchannel_core::VersionSet;
use ofchannel_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

/// Environment variable with a comma-separated version list, e.g. `1,4`.
pub const ENV_VERSIONS: &str = "OFCHANNEL_VERSIONS";
/// Environment variable with the HELLO timeout in milliseconds.
pub const ENV_HELLO_TIMEOUT_MS: &str = "OFCHANNEL_HELLO_TIMEOUT_MS";
/// Environment variable with the connect timeout in milliseconds.
pub const ENV_CONNECT_TIMEOUT_MS: &str = "OFCHANNEL_CONNECT_TIMEOUT_MS";
/// Environment variable: `true`/`false`, whether to send a version bitmap.
pub const ENV_ADVERTISE_BITMAP: &str = "OFCHANNEL_ADVERTISE_BITMAP";

/// Configuration for channel sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Protocol versions offered to controllers.
    pub supported_versions: Vec<u8>,
    /// How long to wait for the controller's HELLO.
    pub hello_timeout_ms: u64,
    /// Bound on dialing a controller.
    pub connect_timeout_ms: u64,
    /// Send a version bitmap in our HELLO.
    pub advertise_bitmap: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            supported_versions: session.supported_versions.into(),
            hello_timeout_ms: session.hello_timeout.as_millis() as u64,
            connect_timeout_ms: session.connect_timeout.as_millis() as u64,
            advertise_bitmap: session.advertise_bitmap,
        }
    }
}

impl ChannelConfig {
    /// Defaults overridden by any `OFCHANNEL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_VERSIONS) {
            config.supported_versions = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<u8>().map_err(|e| {
                        ChannelError::Config(format!("{}: bad version {:?}: {}", ENV_VERSIONS, s, e))
                    })
                })
                .collect::<Result<Vec<u8>>>()?;
        }
        if let Some(raw) = lookup(ENV_HELLO_TIMEOUT_MS) {
            config.hello_timeout_ms = parse_env(ENV_HELLO_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CONNECT_TIMEOUT_MS) {
            config.connect_timeout_ms = parse_env(ENV_CONNECT_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ADVERTISE_BITMAP) {
            config.advertise_bitmap = parse_env(ENV_ADVERTISE_BITMAP, &raw)?;
        }

        Ok(config)
    }

    /// Validate and convert into per-session settings.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let supported_versions = VersionSet::new(self.supported_versions.iter().copied())?;
        if self.hello_timeout_ms == 0 {
            return Err(ChannelError::Config("hello_timeout_ms must be positive".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ChannelError::Config("connect_timeout_ms must be positive".into()));
        }

        Ok(SessionConfig {
            supported_versions,
            hello_timeout: Duration::from_millis(self.hello_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            advertise_bitmap: self.advertise_bitmap,
        })
    }
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ChannelError::Config(format!("{}: {:?}: {}", key, raw, e)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use ofchannel_core::CoreError;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.supported_versions, vec![4]);
        assert_eq!(config.hello_timeout_ms, 30_000);
        assert!(config.advertise_bitmap);

        let session = config.session_config().unwrap();
        assert_eq!(session.supported_versions.highest(), 4);
        assert_eq!(session.hello_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ChannelConfig::from_lookup(lookup(&[
            (ENV_VERSIONS, "1, 4,5"),
            (ENV_HELLO_TIMEOUT_MS, "250"),
            (ENV_ADVERTISE_BITMAP, "false"),
        ]))
        .unwrap();

        assert_eq!(config.supported_versions, vec![1, 4, 5]);
        assert_eq!(config.hello_timeout_ms, 250);
        assert_eq!(config.connect_timeout_ms, ChannelConfig::default().connect_timeout_ms);
        assert!(!config.advertise_bitmap);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = ChannelConfig::from_lookup(lookup(&[(ENV_VERSIONS, "1,x")]));
        assert!(matches!(result, Err(ChannelError::Config(_))));

        let result = ChannelConfig::from_lookup(lookup(&[(ENV_CONNECT_TIMEOUT_MS, "-1")]));
        assert!(matches!(result, Err(ChannelError::Config(_))));
    }

    #[test]
    fn test_session_config_validation() {
        let empty = ChannelConfig {
            supported_versions: vec![],
            ..ChannelConfig::default()
        };
        assert!(matches!(
            empty.session_config(),
            Err(ChannelError::Core(CoreError::EmptyVersionSet))
        ));

        let zero = ChannelConfig {
            hello_timeout_ms: 0,
            ..ChannelConfig::default()
        };
        assert!(matches!(zero.session_config(), Err(ChannelError::Config(_))));
    }

    #[test]
    fn test_serde_partial_document() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{"supported_versions":[1,4],"hello_timeout_ms":500}"#).unwrap();
        assert_eq!(config.supported_versions, vec![1, 4]);
        assert_eq!(config.hello_timeout_ms, 500);
        assert!(config.advertise_bitmap);

        let json = serde_json::to_string(&config).unwrap();
        let back: ChannelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
