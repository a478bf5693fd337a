use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use caixa_core::MessageBoxConfig;

use crate::error::ConfigError;

/// Declaration of one connector instance in a route file. `kind` is the
/// registry key; `name` is the adapter name recorded on provenance and
/// subscriptions.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectorDecl {
    pub name: String,
    pub kind: String,
    /// Backing location for file-based kinds (csv).
    pub path: Option<PathBuf>,
}

/// One transport route: a source feeding an interface, one or more
/// destinations consuming it. Deserializable from TOML; every knob has a
/// default so partial files parse.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouteConfig {
    /// The logical route name binding producer to consumers.
    pub interface: String,
    /// Producer-side write chunk size, a throughput/memory knob with no
    /// durability meaning.
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub messagebox: MessageBoxConfig,
    pub source: ConnectorDecl,
    pub destinations: Vec<ConnectorDecl>,
}

impl RouteConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 1_000;
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: RouteConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.is_empty() {
            return Err(ConfigError::Invalid("interface must not be empty".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if self.source.kind.is_empty() {
            return Err(ConfigError::Invalid("source.kind must not be empty".into()));
        }
        if self.destinations.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one destination is required".into(),
            ));
        }
        for decl in std::iter::once(&self.source).chain(&self.destinations) {
            if decl.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "connector of kind '{}' is missing a name",
                    decl.kind
                )));
            }
        }
        Ok(())
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            batch_size: Self::DEFAULT_BATCH_SIZE,
            poll_interval_ms: Self::DEFAULT_POLL_INTERVAL_MS,
            messagebox: MessageBoxConfig::default(),
            source: ConnectorDecl::default(),
            destinations: Vec::new(),
        }
    }
}
