use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConnectorDecl;
use crate::connector::Connector;
use crate::connectors::csv::CsvConnector;
use crate::connectors::memory::MemoryConnector;
use crate::error::ConnectorError;

/// Builds one connector instance from its route declaration.
pub type ConnectorFactory =
    Arc<dyn Fn(&ConnectorDecl) -> Result<Box<dyn Connector>, ConnectorError> + Send + Sync>;

/// Name-keyed connector lookup, resolved once at configuration load time.
/// Adding a connector kind means registering a factory under its name;
/// there is no reflection and no downcasting anywhere in dispatch.
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// An empty registry, for callers wiring custom kinds only.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with the bundled kinds: `csv` and `memory`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("csv", |decl| {
            let path = decl.path.as_ref().ok_or_else(|| {
                ConnectorError::Config(format!("csv connector '{}' requires a path", decl.name))
            })?;
            Ok(Box::new(CsvConnector::new(path)) as Box<dyn Connector>)
        });
        registry.register("memory", |_| {
            Ok(Box::new(MemoryConnector::new()) as Box<dyn Connector>)
        });
        registry
    }

    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ConnectorDecl) -> Result<Box<dyn Connector>, ConnectorError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Arc::new(factory));
    }

    /// Instantiate the connector a declaration names.
    pub fn resolve(&self, decl: &ConnectorDecl) -> Result<Box<dyn Connector>, ConnectorError> {
        let factory = self.factories.get(&decl.kind).ok_or_else(|| {
            ConnectorError::Config(format!(
                "unknown connector kind '{}' (available: {})",
                decl.kind,
                self.kinds().join(", ")
            ))
        })?;
        factory(decl)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
