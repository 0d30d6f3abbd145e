use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_kernel::GameConfig;

/// Server settings. Every field has a default, so a config file may set
/// any subset of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub world_path: PathBuf,
    pub chunk_radius: i32,
    pub queue_capacity: usize,
    pub tick_period_ms: u64,
    pub tick_step: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let game = GameConfig::default();
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 25565)),
            world_path: PathBuf::from("world"),
            chunk_radius: game.chunk_radius,
            queue_capacity: game.queue_capacity,
            tick_period_ms: 1000,
            tick_step: game.tick_step,
        }
    }
}

impl ServerConfig {
    /// Defaults, or the YAML file at `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let txt = std::fs::read_to_string(path)
                    .with_context(|| format!("read config: {}", path.display()))?;
                Self::from_yaml(&txt)
            }
        }
    }

    pub fn from_yaml(txt: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(txt).context("parse config yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_radius >= 0, "chunk_radius must not be negative");
        anyhow::ensure!(self.queue_capacity > 0, "queue_capacity must be positive");
        anyhow::ensure!(self.tick_period_ms > 0, "tick_period_ms must be positive");
        Ok(())
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            chunk_radius: self.chunk_radius,
            queue_capacity: self.queue_capacity,
            tick_step: self.tick_step,
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
}
