use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fd_lock::RwLock;
use fjall::Keyspace;
use serde::Deserialize;

#[derive(Clone, Default, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub(crate) repository: RepositoryConfig,
    pub(crate) quota: QuotaConfig,
    pub(crate) cache: CacheConfig,
    pub(crate) auth: AuthConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct RepositoryConfig {
    pub(crate) base_url: String,
    pub(crate) store_path: PathBuf,
    pub(crate) data_folder: PathBuf,
    pub(crate) backup_folder: PathBuf,
    pub(crate) system_context_aliases: Vec<String>,
    pub(crate) provenance: bool,
}

#[derive(Clone, Default, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct QuotaConfig {
    pub(crate) enabled: bool,
    pub(crate) default_bytes: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct CacheConfig {
    pub(crate) max_entries: u64,
    pub(crate) time_to_idle_secs: Option<u64>,
}

#[derive(Clone, Default, Debug, Deserialize)]
#[serde(default)]
pub(crate) struct AuthConfig {
    /// Principal URI the command line acts as. Administrator when unset.
    pub(crate) principal: Option<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8181/store/".into(),
            store_path: "data/store".into(),
            data_folder: "data/files".into(),
            backup_folder: "data/backup".into(),
            system_context_aliases: vec!["_contexts".into(), "_principals".into()],
            provenance: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            time_to_idle_secs: None,
        }
    }
}

impl Config {
    pub(crate) fn load(path: Option<&Path>) -> Result<Config> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        toml::from_str(&text).context("unable to parse config file")
    }
}

/// Parsed configuration together with the opened keyspace.
#[derive(Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) init: Config,
    pub(crate) keyspace: Keyspace,
}

impl RuntimeConfig {
    pub(crate) fn open(init: Config) -> Result<RuntimeConfig> {
        let keyspace = fjall::Config::new(&init.repository.store_path)
            .open()
            .context("unable to open the store keyspace")?;
        Ok(RuntimeConfig { init, keyspace })
    }
}

/// Lock file next to the store directory, held exclusively for the life of
/// the process.
pub(crate) fn lock_store_dir(store_path: &Path) -> Result<RwLock<File>> {
    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("unable to create {}", parent.display()))?;
    }
    let file = File::create(store_path.with_extension("lock"))
        .context("unable to create the store lock file")?;
    Ok(RwLock::new(file))
}
