use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub store: StoreConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.to_string_lossy()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

/// Where a catalog lives.
///
/// Several `Catalog` instances opened with the same config attach to the same
/// persisted data; `name` is the opaque store key.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub name: String,
    #[serde(default)]
    pub in_memory: bool,
    pub directory: Option<PathBuf>,
    /// how long a writer waits for another writer's transaction before giving up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl StoreConfig {
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_memory: true,
            directory: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    pub fn on_disk(directory: impl AsRef<Path>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            in_memory: false,
            directory: Some(directory.as_ref().to_path_buf()),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    /// file backing an on-disk store, `None` for in-memory stores
    pub fn database_file(&self) -> Option<PathBuf> {
        if self.in_memory {
            return None;
        }
        self.directory
            .as_ref()
            .map(|dir| dir.join(format!("{}.sqlite", self.name)))
    }
}
