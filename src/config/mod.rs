//! Application configuration
//!
//! Built-in defaults, then an installed framework header, then an optional
//! JSON file. Command line flags are applied on top by `main`.

pub mod defaults;
mod schema;

pub use schema::AppConfig;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AppError, Result};

impl AppConfig {
    /// Build the configuration from defaults and an optional JSON file
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        // The header only replaces built-in values, never file values
        let builtin = Self::default();
        let framework = defaults::read_installed();
        if config.info_port == builtin.info_port {
            if let Some(port) = framework.info_port {
                config.info_port = port;
            }
        }
        if config.info_group == builtin.info_group {
            if let Some(group) = framework.multicast_group {
                config.info_group = group;
            }
        }

        config.cameras_config = expand_home(&config.cameras_config);
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file. Missing fields take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.is_empty() || self.user_id.contains('/') {
            return Err(AppError::Config(format!(
                "invalid user id {:?}",
                self.user_id
            )));
        }
        if !self.info_group.is_multicast() {
            return Err(AppError::Config(format!(
                "info group {} is not a multicast address",
                self.info_group
            )));
        }
        if !self.osc_root.starts_with('/') || self.osc_root.ends_with('/') {
            return Err(AppError::Config(format!(
                "invalid OSC root {:?}",
                self.osc_root
            )));
        }
        if self.keepalive_interval_secs == 0 || self.snapshot_interval_secs == 0 {
            return Err(AppError::Config("timer intervals must be positive".to_string()));
        }
        Ok(())
    }
}

/// Replace a leading `~` with `$HOME`
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.info_port, 54320);
        assert_eq!(config.osc_root, "/SPIN");
        assert!(!config.user_id.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"user_id": "alice", "default_session": "lab", "multicast_ttl": 1}}"#
        )
        .unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.default_session.as_deref(), Some("lab"));
        assert_eq!(config.multicast_ttl, 1);
        assert_eq!(config.keepalive_interval_secs, 15);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = AppConfig {
            info_group: "10.0.0.1".parse().unwrap(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let config = AppConfig {
            osc_root: "SPIN".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            user_id: "a/b".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::from_file(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_expand_home() {
        let plain = Path::new("/etc/peerview.json");
        assert_eq!(expand_home(plain), plain.to_path_buf());
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/.peerview.json")),
                PathBuf::from(home).join(".peerview.json")
            );
        }
    }
}
