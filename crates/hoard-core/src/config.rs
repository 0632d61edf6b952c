use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Curl transfer limits (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Abort a transfer slower than this many bytes/sec for `low_speed_time_secs`.
    pub low_speed_limit_bytes: u32,
    pub low_speed_time_secs: u64,
    /// Wall-clock limit for one item; 0 means no limit. Stalled transfers are
    /// already caught by the low-speed abort.
    pub timeout_secs: u64,
    /// Optional User-Agent header.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
            timeout_secs: 0,
            user_agent: None,
        }
    }
}

impl TransferConfig {
    /// Whole-transfer timeout to apply, if any.
    pub fn total_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Static credentials handed to the transport (optional section in config.toml).
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token; the `HOARD_TOKEN` environment variable takes precedence.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Extra request headers sent with every GET.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

// Keeps secrets out of `debug!("{:?}", cfg)`.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Global configuration loaded from `~/.config/hoard/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoardConfig {
    /// Base directory for downloaded media.
    pub output_dir: PathBuf,
    /// Ledger snapshot path; None = `~/.local/state/hoard/ledger.json`.
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
    /// Maximum concurrent transfers.
    pub concurrency: usize,
    /// Persist the ledger after every this many dispatched items.
    pub checkpoint_interval: usize,
    /// Shard the output directory once the ledger holds more items than this.
    pub split_threshold: usize,
    /// Items per shard directory.
    pub shard_capacity: usize,
    /// Minimum body size used when the catalog does not give one.
    pub default_min_bytes: u64,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl Default for HoardConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("media"),
            ledger_path: None,
            concurrency: 10,
            checkpoint_interval: 100,
            split_threshold: 10_000,
            shard_capacity: 10_000,
            default_min_bytes: 1000,
            transfer: TransferConfig::default(),
            auth: None,
        }
    }
}

impl HoardConfig {
    /// Ledger snapshot path: the configured one, or the XDG state default.
    pub fn resolved_ledger_path(&self) -> Result<PathBuf> {
        match &self.ledger_path {
            Some(p) => Ok(p.clone()),
            None => default_ledger_path(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("hoard")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Default snapshot location: `~/.local/state/hoard/ledger.json`.
pub fn default_ledger_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("hoard")?;
    Ok(xdg_dirs.get_state_home().join("ledger.json"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<HoardConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = HoardConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: HoardConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}
