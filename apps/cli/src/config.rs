//! CLI configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/roomdrop/config.toml`
//! - Windows: `%APPDATA%/roomdrop/config.toml`
//!
//! The file is optional. Command-line flags override what it sets.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use roomdrop_session::SessionConfig;
use roomdrop_transport::WsConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name attached to chat messages (hostname by default).
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Where received files are saved.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Port a sender listens on (0 = auto-assign).
    #[serde(default)]
    pub listen_port: u16,

    /// How long a receiver browses the network for the room.
    #[serde(default = "default_resolve_timeout")]
    pub resolve_timeout_secs: u64,

    /// Lifetime of a finished session.
    #[serde(default = "default_self_destruct")]
    pub self_destruct_secs: u64,
}

fn default_display_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "roomdrop".into())
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_resolve_timeout() -> u64 {
    5
}

fn default_self_destruct() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            download_dir: default_download_dir(),
            listen_port: 0,
            resolve_timeout_secs: default_resolve_timeout(),
            self_destruct_secs: default_self_destruct(),
        }
    }
}

impl Config {
    /// Loads the default config file, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Loads `path`. A missing file yields defaults; an unreadable or
    /// unparsable one is logged and also yields defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        let parsed = std::fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|content| toml::from_str::<Config>(&content).map_err(anyhow::Error::from));
        match parsed {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "configuration loaded");
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to load config, using defaults: {e}");
                Self::default()
            }
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            self_destruct_after: Duration::from_secs(self.self_destruct_secs),
            display_name: Some(self.display_name.clone()).filter(|n| !n.is_empty()),
            ..SessionConfig::default()
        }
    }

    pub fn ws_config(&self, port: Option<u16>, direct_addr: Option<SocketAddr>) -> WsConfig {
        WsConfig {
            port: port.unwrap_or(self.listen_port),
            resolve_timeout: Duration::from_secs(self.resolve_timeout_secs),
            direct_addr,
            ..WsConfig::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("roomdrop").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("roomdrop")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(!config.display_name.is_empty());
        assert_eq!(config.listen_port, 0);
        assert_eq!(config.resolve_timeout_secs, 5);
        assert_eq!(config.self_destruct_secs, 300);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(r#"display_name = "ana""#).unwrap();
        assert_eq!(config.display_name, "ana");
        assert_eq!(config.self_destruct_secs, 300);
        assert_eq!(config.download_dir, default_download_dir());
    }

    #[test]
    fn download_dir_follows_platform_dirs() {
        let expected = dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."));
        assert_eq!(Config::default().download_dir, expected);
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "listen_port = 4242\nself_destruct_secs = 60\ndownload_dir = \"/srv/in\"\n",
        )
        .unwrap();
        let config = Config::load_from(&path);
        assert_eq!(config.listen_port, 4242);
        assert_eq!(config.download_dir, PathBuf::from("/srv/in"));
        assert_eq!(
            config.session_config().self_destruct_after,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn missing_or_broken_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = Config::load_from(&tmp.path().join("nope.toml"));
        assert_eq!(missing.listen_port, 0);

        let broken = tmp.path().join("broken.toml");
        std::fs::write(&broken, "listen_port = \"not a number\"").unwrap();
        assert_eq!(Config::load_from(&broken).listen_port, 0);
    }

    #[test]
    fn flags_override_file() {
        let config = Config {
            listen_port: 4000,
            ..Config::default()
        };
        assert_eq!(config.ws_config(None, None).port, 4000);
        assert_eq!(config.ws_config(Some(5000), None).port, 5000);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(config.ws_config(None, Some(addr)).direct_addr, Some(addr));
    }

    #[test]
    fn config_path_names_roomdrop() {
        assert!(config_path().to_string_lossy().contains("roomdrop"));
    }
}
