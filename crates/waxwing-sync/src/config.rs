//! Synchronizer configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use waxwing_mcl::codec::{BlobCodec, NonceLayout};
use waxwing_mcl::store::MclOptions;

/// Settings for local persistence of the roster models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Gzip the stored models.
    #[serde(default = "default_true")]
    pub compress: bool,
    /// Seal the stored models under the account password.
    #[serde(default = "default_true")]
    pub encrypt: bool,
    /// Password for the sealing key. None = zero key.
    #[serde(default)]
    pub password: Option<String>,
    /// Read files written by old builds (shared fixed nonce). Leave off
    /// unless migrating; new files always get per-file nonces.
    #[serde(default)]
    pub legacy_store_format: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            compress: true,
            encrypt: true,
            password: None,
            legacy_store_format: false,
        }
    }
}

fn default_true() -> bool {
    true
}

impl SyncConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: SyncConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// The data directory holding the persisted models.
    pub fn data_dir(&self) -> PathBuf {
        if self.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.data_dir)
        }
    }

    /// Path of the addressbook container, one file per account.
    pub fn addressbook_path(&self, account: &str) -> PathBuf {
        self.data_dir().join(format!("{}.mcl", sanitize(account)))
    }

    /// Path of the deltas container, one file per account.
    pub fn deltas_path(&self, account: &str) -> PathBuf {
        self.data_dir().join(format!("{}.deltas.mcl", sanitize(account)))
    }

    /// Store options implied by this configuration.
    pub fn store_options(&self) -> MclOptions {
        MclOptions {
            codec: BlobCodec::from_flags(self.compress, self.encrypt),
            password: self.password.clone(),
            nonce_layout: if self.legacy_store_format {
                NonceLayout::LegacyFixed
            } else {
                NonceLayout::Random
            },
            use_cache: true,
        }
    }

    fn config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("WAXWING_DATA_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        Self::default_data_dir().join("config.toml")
    }

    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("WAXWING_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            home_fallback("Library/Application Support/Waxwing")
        }
        #[cfg(not(target_os = "macos"))]
        {
            home_fallback(".waxwing")
        }
    }
}

/// Account names become file names; keep only filesystem-safe characters.
fn sanitize(account: &str) -> String {
    account
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

fn home_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/waxwing"))
}
