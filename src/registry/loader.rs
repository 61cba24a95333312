//! Extension module loading.
//!
//! Descriptors of extension types are registered up front; the code behind them
//! is brought in lazily through a [`ModuleLoader`] the first time one of those
//! types is instantiated.

use std::collections::HashMap;

/// Loads the extension module identified by a plugin id.
///
/// The registry calls [`load`](ModuleLoader::load) at most once per module and
/// holds its module table lock for the duration, so implementations must not
/// instantiate types through the same registry.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, module: &str) -> Result<(), String>;
}

/// Loader used when no extension support is configured. Every load fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModuleLoader;

impl ModuleLoader for NoModuleLoader {
    fn load(&self, module: &str) -> Result<(), String> {
        Err(format!("no module loader is configured for '{}'", module))
    }
}

/// Loader backed by in-process initialization hooks, one per module id.
#[derive(Default)]
pub struct StaticModuleLoader {
    hooks: HashMap<String, Box<dyn Fn() -> Result<(), String> + Send + Sync>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the initialization hook for `module`.
    pub fn with_module<F>(mut self, module: impl Into<String>, hook: F) -> Self
    where
        F: Fn() -> Result<(), String> + Send + Sync + 'static,
    {
        self.hooks.insert(module.into(), Box::new(hook));
        self
    }
}

impl ModuleLoader for StaticModuleLoader {
    fn load(&self, module: &str) -> Result<(), String> {
        match self.hooks.get(module) {
            Some(hook) => hook(),
            None => Err(format!("module '{}' is not available", module)),
        }
    }
}
