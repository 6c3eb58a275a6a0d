//! The process factory contract consumed by the external flow-management
//! layer (spec §6). A factory is a pure constructor: no I/O, no lifecycle
//! side effects — those belong to `Process::initialize`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CoreError, Result};
use crate::process::Process;

/// A snapshot of configuration values keyed by name, the shape a
/// configuration layer hands to a factory. Deliberately untyped (`String`
/// values) at this boundary; a factory is responsible for parsing its own
/// fields and returning `ConfigError` on a bad snapshot.
pub type ConfigSnapshot = HashMap<String, String>;

/// Produces a new process instance from a configuration snapshot.
pub trait ProcessFactory: Send + Sync {
    /// Process-type name this factory answers for (e.g. `"mapper"`).
    fn type_name(&self) -> &str;

    /// Construct a process. Pure: no I/O, no background work.
    fn create(&self, name: &str, config: &ConfigSnapshot) -> Result<Arc<dyn Process>>;
}

/// A registry of process factories keyed by type name. An explicit,
/// caller-owned parameter rather than global state (spec §5: "registries, if
/// any, are explicit parameters").
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn ProcessFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn ProcessFactory>) {
        self.factories.insert(factory.type_name().to_string(), factory);
    }

    pub fn create(
        &self,
        type_name: &str,
        process_name: &str,
        config: &ConfigSnapshot,
    ) -> Result<Arc<dyn Process>> {
        let factory = self.factories.get(type_name).ok_or_else(|| {
            CoreError::config(format!("no factory registered for process type `{type_name}`"))
        })?;
        factory.create(process_name, config)
    }
}
