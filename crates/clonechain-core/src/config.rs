use crate::error::{ClonechainError, ClonechainResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/clonechain.toml";

const NAME_PLACEHOLDER: &str = "%s";

/// On-disk format the configuration was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Yaml,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Backend {
    /// Pool holding the volumes this node serves.
    pub pool: String,

    #[serde(default)]
    pub rbd_path: Option<String>,

    #[serde(default)]
    pub ceph_conf: Option<String>,

    #[serde(default)]
    pub rbd_user: Option<String>,

    #[serde(default)]
    pub cluster_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandCfg {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for CommandCfg {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Templates mapping volume/snapshot ids onto backend object names.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Naming {
    #[serde(default = "default_volume_template")]
    pub volume_name_template: String,

    #[serde(default = "default_snapshot_template")]
    pub snapshot_name_template: String,
}

fn default_volume_template() -> String {
    "volume-%s".to_string()
}

fn default_snapshot_template() -> String {
    "snapshot-%s".to_string()
}

impl Default for Naming {
    fn default() -> Self {
        Self {
            volume_name_template: default_volume_template(),
            snapshot_name_template: default_snapshot_template(),
        }
    }
}

impl Naming {
    pub fn volume_name(&self, volume_id: &str) -> String {
        self.volume_name_template.replacen(NAME_PLACEHOLDER, volume_id, 1)
    }

    pub fn snapshot_name(&self, snapshot_id: &str) -> String {
        self.snapshot_name_template
            .replacen(NAME_PLACEHOLDER, snapshot_id, 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DaemonCfg {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8788".to_string()
}

impl Default for DaemonCfg {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClonechainConfig {
    pub backend: Backend,

    #[serde(default)]
    pub command: CommandCfg,

    #[serde(default)]
    pub naming: Naming,

    #[serde(default)]
    pub daemon: DaemonCfg,

    #[serde(skip)]
    pub path: PathBuf,

    #[serde(skip)]
    pub format: ConfigFormat,
}

impl ClonechainConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ClonechainResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let format = if matches!(path.extension().and_then(|ext| ext.to_str()), Some(ext) if ext.eq_ignore_ascii_case("toml"))
        {
            ConfigFormat::Toml
        } else {
            ConfigFormat::Yaml
        };

        let mut cfg = Self::parse(&contents, format)?;
        cfg.path = path.to_path_buf();
        Ok(cfg)
    }

    /// Parse configuration text in the given format.
    pub fn parse(contents: &str, format: ConfigFormat) -> ClonechainResult<Self> {
        let mut cfg = match format {
            ConfigFormat::Toml => toml::from_str::<Self>(contents)?,
            ConfigFormat::Yaml => serde_yaml::from_str::<Self>(contents)?,
        };
        cfg.format = format;

        if cfg.backend.pool.trim().is_empty() {
            return Err(ClonechainError::InvalidConfig(
                "backend.pool must name a pool".to_string(),
            ));
        }
        if cfg.command.timeout_secs == 0 {
            return Err(ClonechainError::InvalidConfig(
                "command.timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(cfg)
    }

    /// Collect every problem with the configuration; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.backend.pool.trim().is_empty() {
            issues.push("backend.pool must name a pool".to_string());
        }
        if self.command.timeout_secs == 0 {
            issues.push("command.timeout_secs must be greater than zero".to_string());
        }
        for (key, template) in [
            ("naming.volume_name_template", &self.naming.volume_name_template),
            ("naming.snapshot_name_template", &self.naming.snapshot_name_template),
        ] {
            if template.matches(NAME_PLACEHOLDER).count() != 1 {
                issues.push(format!(
                    "{key} must contain exactly one `{NAME_PLACEHOLDER}` (got `{template}`)"
                ));
            }
        }
        if let Err(err) = self.listen_addr() {
            issues.push(err.to_string());
        }
        if let Some(path) = self.rbd_binary_path() {
            if !path.exists() {
                issues.push(format!("backend.rbd_path {} does not exist", path.display()));
            }
        }

        issues
    }

    pub fn pool(&self) -> &str {
        &self.backend.pool
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command.timeout_secs)
    }

    pub fn rbd_binary_path(&self) -> Option<PathBuf> {
        self.backend.rbd_path.as_ref().map(PathBuf::from)
    }

    pub fn listen_addr(&self) -> ClonechainResult<SocketAddr> {
        self.daemon.listen_addr.parse().map_err(|err| {
            ClonechainError::InvalidConfig(format!(
                "daemon.listen_addr `{}` is not a socket address: {}",
                self.daemon.listen_addr, err
            ))
        })
    }
}
