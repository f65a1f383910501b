//! Sync configuration.
//!
//! Loaded either from a JSON document or from the flat string map a plugin
//! host hands over at init time.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Default cap on groups requested per session.
pub const DEFAULT_MAX_GROUPS: usize = 100;
/// Default cap on attestations sent or applied per session.
pub const DEFAULT_MAX_ATTESTATIONS: usize = 1000;
/// Default bound on each receive.
pub const DEFAULT_PHASE_TIMEOUT_SECS: u64 = 30;

/// Per-session resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLimits {
    pub max_groups: usize,
    pub max_attestations: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_groups: DEFAULT_MAX_GROUPS,
            max_attestations: DEFAULT_MAX_ATTESTATIONS,
        }
    }
}

/// Node-level sync settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name used in log lines for this node
    pub name: String,
    pub max_groups: usize,
    pub max_attestations: usize,
    pub phase_timeout_secs: u64,
    /// Seconds between scheduled syncs; 0 leaves scheduling to the caller
    pub sync_interval_secs: u64,
    /// Known peers, name → URL
    pub peers: BTreeMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            name: "qntx".to_string(),
            max_groups: DEFAULT_MAX_GROUPS,
            max_attestations: DEFAULT_MAX_ATTESTATIONS,
            phase_timeout_secs: DEFAULT_PHASE_TIMEOUT_SECS,
            sync_interval_secs: 0,
            peers: BTreeMap::new(),
        }
    }
}

impl SyncConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from a flat string map.
    ///
    /// Recognised keys: `name`, `max_groups`, `max_attestations`,
    /// `phase_timeout_secs`, `sync_interval_secs`, and `peer.<name>` for
    /// peer URLs. Unknown keys are ignored.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in map {
            match key.as_str() {
                "name" => config.name = value.clone(),
                "max_groups" => config.max_groups = parse_number(key, value)?,
                "max_attestations" => config.max_attestations = parse_number(key, value)?,
                "phase_timeout_secs" => config.phase_timeout_secs = parse_number(key, value)?,
                "sync_interval_secs" => config.sync_interval_secs = parse_number(key, value)?,
                other => {
                    if let Some(peer) = other.strip_prefix("peer.") {
                        config.peers.insert(peer.to_string(), value.clone());
                    }
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_groups == 0 {
            return Err(SyncError::Config("max_groups must be greater than 0".into()));
        }
        if self.max_attestations == 0 {
            return Err(SyncError::Config(
                "max_attestations must be greater than 0".into(),
            ));
        }
        if self.phase_timeout_secs == 0 {
            return Err(SyncError::Config(
                "phase_timeout_secs must be greater than 0".into(),
            ));
        }
        for (peer, url) in &self.peers {
            if url.trim().is_empty() {
                return Err(SyncError::Config(format!("peer '{}' has no URL", peer)));
            }
        }
        Ok(())
    }

    pub fn limits(&self) -> SessionLimits {
        SessionLimits {
            max_groups: self.max_groups,
            max_attestations: self.max_attestations,
        }
    }

    pub fn phase_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_timeout_secs)
    }

    /// `None` when scheduling is left to the caller.
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_secs > 0).then(|| Duration::from_secs(self.sync_interval_secs))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SyncError::Config(format!("{} must be a number, got '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.limits(), SessionLimits::default());
        assert_eq!(config.limits().max_groups, 100);
        assert_eq!(config.limits().max_attestations, 1000);
        assert_eq!(config.phase_timeout(), Duration::from_secs(30));
        assert_eq!(config.sync_interval(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_json_partial() {
        let config =
            SyncConfig::from_json(r#"{"name":"laptop","max_attestations":50,"peers":{"phone":"ws://10.0.0.2:877"}}"#)
                .unwrap();
        assert_eq!(config.name, "laptop");
        assert_eq!(config.max_attestations, 50);
        assert_eq!(config.max_groups, DEFAULT_MAX_GROUPS);
        assert_eq!(config.peers.get("phone").map(String::as_str), Some("ws://10.0.0.2:877"));
    }

    #[test]
    fn from_json_rejects_zero_limits() {
        let err = SyncConfig::from_json(r#"{"max_groups":0}"#).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn from_json_rejects_garbage() {
        let err = SyncConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, SyncError::Serialization(_)));
    }

    #[test]
    fn from_map() {
        let map: HashMap<String, String> = [
            ("name", "desk"),
            ("max_groups", "10"),
            ("phase_timeout_secs", "5"),
            ("sync_interval_secs", "60"),
            ("peer.server", "ws://sync.example:877"),
            ("unrelated", "ignored"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = SyncConfig::from_map(&map).unwrap();
        assert_eq!(config.name, "desk");
        assert_eq!(config.max_groups, 10);
        assert_eq!(config.phase_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync_interval(), Some(Duration::from_secs(60)));
        assert_eq!(config.peers.len(), 1);
    }

    #[test]
    fn from_map_bad_number() {
        let map = HashMap::from([("max_attestations".to_string(), "lots".to_string())]);
        let err = SyncConfig::from_map(&map).unwrap_err();
        assert!(err.to_string().contains("max_attestations"));
    }
}
