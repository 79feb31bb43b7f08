use std::path::{Path, PathBuf};

use anyhow::Context;
use dshare_backend::QuotaLimits;
use dshare_backend::backend::{DEFAULT_TOTAL_BANDWIDTH, DEFAULT_TOTAL_STORAGE};
use dshare_core::{MAX_UPLOAD_SIZE, TransferLimits};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DshareConfig {
    pub identity: ConfigIdentity,
    pub backend: ConfigBackend,
    #[serde(default)]
    pub limits: ConfigLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigIdentity {
    pub email: String,
    /// Relative paths are resolved against the config file's directory.
    pub seed_phrase_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigBackend {
    pub ledger_path: PathBuf,
    pub blob_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigLimits {
    pub max_upload_size: u64,
    pub total_storage: u64,
    pub total_bandwidth: u64,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_upload_size: MAX_UPLOAD_SIZE,
            total_storage: DEFAULT_TOTAL_STORAGE,
            total_bandwidth: DEFAULT_TOTAL_BANDWIDTH,
        }
    }
}

impl ConfigLimits {
    pub fn quota(&self) -> QuotaLimits {
        QuotaLimits {
            total_storage: self.total_storage,
            total_bandwidth: self.total_bandwidth,
        }
    }

    pub fn transfer(&self) -> TransferLimits {
        TransferLimits {
            max_upload_size: self.max_upload_size,
        }
    }
}

impl DshareConfig {
    pub fn load(config_file: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(config_file).with_context(|| {
            format!(
                "could not read {}; run `dshare config init --email <EMAIL>` first",
                config_file.display()
            )
        })?;
        toml::from_str(&content).context("could not parse config file")
    }

    pub fn seed_phrase_path(&self, config_file: &Path) -> PathBuf {
        let path = Path::new(&self.identity.seed_phrase_file);
        match config_file.parent() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn read_seed_phrase(&self, config_file: &Path) -> anyhow::Result<String> {
        let path = self.seed_phrase_path(config_file);
        let phrase = std::fs::read_to_string(&path)
            .with_context(|| format!("could not read seed phrase from {}", path.display()))?;
        Ok(phrase.trim().to_string())
    }
}
