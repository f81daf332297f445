use anyhow::Context;
use devicecore::TiePolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Jsonl { path: PathBuf },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub store: StoreBackend,
    pub store_timeout_ms: u64,
    pub tie_policy: TiePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            store: StoreBackend::Memory,
            store_timeout_ms: 2_000,
            tie_policy: TiePolicy::Shared,
        }
    }
}

impl ServerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading server config {}", path_ref.display()))?;
        let config: ServerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing server config {}", path_ref.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_args(
        bind: SocketAddr,
        data_file: Option<PathBuf>,
        store_timeout_ms: u64,
        tie_policy: TiePolicy,
    ) -> anyhow::Result<Self> {
        let store = match data_file {
            Some(path) => StoreBackend::Jsonl { path },
            None => StoreBackend::Memory,
        };
        let config = Self {
            bind,
            store,
            store_timeout_ms,
            tie_policy,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.store_timeout_ms > 0, "store_timeout_ms must be positive");
        Ok(())
    }
}
