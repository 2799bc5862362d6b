use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Tunable configuration, figment-layered: struct defaults → config.toml in
// the data directory → PORTSIDE_* env vars (double underscore = nesting):
//
//   config.toml:     [server]
//                    port = 9090
//
//   env var:         PORTSIDE_SERVER__PORT=9090

/// Top-level tunable configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub channel: ChannelFileConfig,
    #[serde(default)]
    pub launcher: LauncherFileConfig,
}

/// HTTP server knobs (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Live channel knobs (lives under `[channel]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelFileConfig {
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl Default for ChannelFileConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

fn default_heartbeat_ms() -> u64 {
    1000
}

/// Item launcher knobs (lives under `[launcher]` in config.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LauncherFileConfig {
    /// Binary invoked with a connected item's recorded arguments. When
    /// unset, connects only track state.
    #[serde(default)]
    pub program: Option<PathBuf>,
}

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Build a figment that layers: defaults → config.toml → PORTSIDE_* env.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("PORTSIDE_").split("__"))
}

/// Directory layout (not tunable via figment — derived from --data-dir).
#[derive(Clone, Debug)]
pub struct PortsideConfig {
    pub data_dir: PathBuf,
    pub store_path: PathBuf,
}

impl PortsideConfig {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => dirs::config_dir()
                .context("no config directory for this platform")?
                .join("portside"),
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating {}", data_dir.display()))?;
        let store_path = data_dir.join("store.json");
        Ok(Self {
            data_dir,
            store_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert!(fc.server.host.is_none());
        assert!(fc.server.port.is_none());
        assert_eq!(fc.channel.heartbeat_ms, 1000);
    }

    #[test]
    fn toml_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nhost = \"0.0.0.0\"\nport = 9090\n\n[channel]\nheartbeat_ms = 250\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(fc.server.port, Some(9090));
        assert_eq!(fc.channel.heartbeat_ms, 250);
    }

    #[test]
    fn data_dir_layout_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let config = PortsideConfig::new(Some(tmp.path().join("nested"))).unwrap();
        assert!(config.data_dir.exists());
        assert!(config.store_path.ends_with("store.json"));
    }
}
