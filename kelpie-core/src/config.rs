//! Configuration for a pool's local table, IOM backend, and behavior preset.
//!
//! Wiring these into an actual config-file/CLI loader is out of scope here; this module
//! only defines the shapes so an embedder has something concrete to deserialize into.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::pool::PoolBehavior;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("`database_url` must be set for a remote IOM backend"))]
    MissingDatabaseUrl,
    #[snafu(display("`path` must be set for a {kind} IOM backend"))]
    MissingPath { kind: &'static str },
}

/// One configured persistence backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IomConfig {
    File { name: String, path: PathBuf },
    EmbeddedKv { name: String, path: PathBuf },
    Remote { name: String, database_url: String },
}

impl IomConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::EmbeddedKv { name, .. } | Self::Remote { name, .. } => name,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::File { path, .. } if path.as_os_str().is_empty() => Err(ConfigError::MissingPath { kind: "per-file" }),
            Self::EmbeddedKv { path, .. } if path.as_os_str().is_empty() => {
                Err(ConfigError::MissingPath { kind: "embedded-kv" })
            }
            Self::Remote { database_url, .. } if database_url.is_empty() => Err(ConfigError::MissingDatabaseUrl),
            _ => Ok(()),
        }
    }
}

/// A named behavior preset, deserialized from a short string instead of the raw bitmask.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorPreset {
    Local,
    LocalIom,
    Remote,
}

impl From<BehaviorPreset> for PoolBehavior {
    fn from(preset: BehaviorPreset) -> Self {
        match preset {
            BehaviorPreset::Local => PoolBehavior::DEFAULT_LOCAL,
            BehaviorPreset::LocalIom => PoolBehavior::DEFAULT_LOCAL_IOM,
            BehaviorPreset::Remote => PoolBehavior::DEFAULT_REMOTE,
        }
    }
}

/// Top-level configuration for one pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    pub behavior: BehaviorPreset,
    #[serde(default)]
    pub iom: Option<IomConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_iom_variant() {
        let json = r#"{"type": "file", "name": "disk", "path": "/tmp/kelpie"}"#;
        let config: IomConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name(), "disk");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_remote_backend_missing_database_url() {
        let config = IomConfig::Remote {
            name: "pg".to_string(),
            database_url: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn behavior_preset_maps_to_expected_flags() {
        let behavior: PoolBehavior = BehaviorPreset::LocalIom.into();
        assert!(behavior.contains(PoolBehavior::WRITE_TO_IOM));
        assert!(behavior.contains(PoolBehavior::WRITE_TO_LOCAL));
    }
}
