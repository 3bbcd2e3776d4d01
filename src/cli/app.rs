use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk configuration for the demo node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default bind address for the listener
    pub bind: String,
    /// Topic this node participates in
    pub topic: String,
    /// Capability string advertised during handshake
    pub caps: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5100".to_string(),
            topic: "edge".to_string(),
            caps: "fmt=tensor/v1".to_string(),
        }
    }
}

impl Config {
    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        ProjectDirs::from("dev", "edgelink", "edgelink")
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
    }

    /// Get the default config file path
    pub fn default_config_file() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.toml"))
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context("Failed to read configuration file")?;
        toml::from_str(&content).context("Failed to parse configuration file")
    }

    /// Load configuration from the default file, creating it if missing.
    pub fn load_or_create_default() -> Result<Self> {
        let config_file = Self::default_config_file()?;

        if config_file.exists() {
            Self::load_from(&config_file)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to the default file.
    pub fn save(&self) -> Result<()> {
        let config_file = Self::default_config_file()?;

        if let Some(parent) = config_file.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(&config_file, content).context("Failed to write configuration file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.bind, "127.0.0.1:5100");
        assert_eq!(config.topic, "edge");
        assert!(config.caps.starts_with("fmt="));
    }

    #[test]
    fn toml_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.bind, config.bind);
        assert_eq!(deserialized.topic, config.topic);
        assert_eq!(deserialized.caps, config.caps);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "bind = \"0.0.0.0:9000\"\ntopic = \"cameras\"\ncaps = \"fmt=tensor/v2\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.topic, "cameras");
        assert_eq!(config.caps, "fmt=tensor/v2");
    }

    #[test]
    fn load_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("nope.toml")).is_err());
    }
}
