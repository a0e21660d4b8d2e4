use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "ledgerchat_config.json";

// About 24h of ledgers at ~5s per close.
const DEFAULT_BACK_WINDOW_LEDGERS: u32 = 17_280;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;
const DEFAULT_CONTRACT_FUNCTION: &str = "send";
const DEFAULT_EXPLORER_TX_URL: &str = "https://stellar.expert/explorer/public/tx/";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub back_window_ledgers: u32,
    pub poll_interval_secs: u64,
    /// Chat contract that outgoing messages invoke. Empty until configured.
    pub chat_contract_id: String,
    /// Contract entry point the outgoing message invokes.
    pub contract_function: String,
    pub explorer_tx_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            back_window_ledgers: DEFAULT_BACK_WINDOW_LEDGERS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            chat_contract_id: String::new(),
            contract_function: DEFAULT_CONTRACT_FUNCTION.to_string(),
            explorer_tx_url: DEFAULT_EXPLORER_TX_URL.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_number::<u32>("LEDGERCHAT_BACK_WINDOW") {
            self.back_window_ledgers = v;
        }
        if let Some(v) = env_number::<u64>("LEDGERCHAT_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = v;
        }
        if let Ok(v) = std::env::var("LEDGERCHAT_CHAT_CONTRACT_ID") {
            self.chat_contract_id = v.trim().to_string();
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric env override");
            None
        }
    }
}

/// Load `<dir>/ledgerchat_config.json`, falling back to defaults.
///
/// A missing file is normal; an unreadable or malformed one is logged and
/// ignored. Environment overrides apply on top either way.
pub fn load_config(dir: impl AsRef<Path>) -> SyncConfig {
    let path = dir.as_ref().join(CONFIG_FILE_NAME);
    let mut config = match read_config_file(&path) {
        Ok(Some(config)) => config,
        Ok(None) => SyncConfig::default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), "config ignored: {err:#}");
            SyncConfig::default()
        }
    };
    config.apply_env_overrides();
    config
}

fn read_config_file(path: &Path) -> anyhow::Result<Option<SyncConfig>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("read {}", path.display()));
        }
    };
    let config = serde_json::from_slice::<SyncConfig>(&bytes)
        .with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(config))
}
