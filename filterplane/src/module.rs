//! Pluggable pipeline stages: a [`Module`] reads packets out of a
//! [`crate::pipeline::PipelineFront`]'s input and places each one into its
//! output or drop list. A module's runtime state lives in its
//! [`ModuleConfig`], not the module itself — one module instance can back
//! many differently-configured stages in the same chain.

use crate::pipeline::PipelineFront;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Per-instance runtime state for a [`Module`]. Cheaply cloned (behind an
/// `Arc`) so a reconfiguration that reuses an existing instance doesn't pay
/// to rebuild it.
pub trait ModuleConfig: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
}

/// A named, stateless handler that processes packets according to whatever
/// [`ModuleConfig`] it's invoked with.
pub trait Module: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Builds (or updates) the config instance for a `(module, config_name)`
    /// pair named in a reconfiguration request. `previous` is the instance
    /// already running under that name, if any — a module that can apply
    /// `data` on top of its existing runtime state (counters, compiled
    /// filters) should return a config built from it rather than starting
    /// over.
    fn configure(
        &self,
        data: &[u8],
        previous: Option<&dyn ModuleConfig>,
    ) -> Result<Arc<dyn ModuleConfig>, Box<dyn Error + Send + Sync>>;

    fn process(&self, config: &dyn ModuleConfig, front: &mut PipelineFront);
}

/// The set of modules a [`crate::pipeline::Pipeline`] may be configured
/// with, passed explicitly to [`crate::pipeline::Pipeline::configure`]
/// rather than looked up through a process-wide registry — a pipeline under
/// test gets exactly the modules the test wires up, nothing more.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn Module>) {
        self.modules.insert(module.name().to_string(), module);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoopConfig;
    impl ModuleConfig for NoopConfig {
        fn name(&self) -> &str {
            "default"
        }
    }

    #[derive(Debug)]
    struct NoopModule;
    impl Module for NoopModule {
        fn name(&self) -> &str {
            "noop"
        }
        fn configure(
            &self,
            _data: &[u8],
            _previous: Option<&dyn ModuleConfig>,
        ) -> Result<Arc<dyn ModuleConfig>, Box<dyn Error + Send + Sync>> {
            Ok(Arc::new(NoopConfig))
        }
        fn process(&self, _config: &dyn ModuleConfig, _front: &mut PipelineFront) {}
    }

    #[test]
    fn registry_looks_up_by_module_name() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(NoopModule));
        assert!(registry.lookup("noop").is_some());
        assert!(registry.lookup("missing").is_none());
    }
}
