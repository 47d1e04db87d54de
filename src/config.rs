use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::upstream::UpstreamService;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "WAYPOST_CONFIG";

pub const DEFAULT_LISTEN: &str = "localhost:8000";

/// Log filter used when `RUST_LOG` is not set.
pub const DEFAULT_LOG: &str = "info";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// `host:port` the proxy listens on
    #[serde(default = "default_listen")]
    pub listen: String,
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log")]
    pub log: String,
    /// Upstreams in match priority order
    pub services: Vec<UpstreamService>,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_owned()
}

fn default_log() -> String {
    DEFAULT_LOG.to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log: default_log(),
            services: vec![
                UpstreamService::new("service1", "/service1", "http://localhost:8002"),
                UpstreamService::new("service2", "/service2", "http://localhost:8003"),
            ],
        }
    }
}

impl Config {
    pub fn from_yaml(source: &str) -> Result<Self> {
        serde_yaml::from_str(source).context("failed to parse configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        Self::from_yaml(&source).with_context(|| format!("in {}", path.display()))
    }

    /// Loads the file at `path`, or the built-in defaults when there is none.
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
