//! Engine context: the shared, read-mostly state every subsystem consults.
//!
//! One context owns the type registry, the configuration, the resolved ids of
//! the built-in types and the background worker pool. Independent contexts
//! can coexist, e.g. one per test.

use crate::concurrent::TaskManager;
use crate::config::EngineConfig;
use crate::error::{EngineResult, ResultExt};
use crate::registry::{register_all_builtins, BuiltinClasses, TypeRegistry};

pub struct EngineContext {
    registry: TypeRegistry,
    config: EngineConfig,
    classes: BuiltinClasses,
    tasks: TaskManager,
}

impl EngineContext {
    /// Context with a fresh registry holding the built-in types.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        Self::with_registry(TypeRegistry::new(), config)
    }

    /// Context around a prepared registry, e.g. one with a module loader.
    ///
    /// Built-ins are registered into `registry` here; extension types may be
    /// registered before or after through [`registry_mut`](Self::registry_mut)
    /// as long as their names do not collide.
    pub fn with_registry(mut registry: TypeRegistry, config: EngineConfig) -> EngineResult<Self> {
        let classes = register_all_builtins(&mut registry).context("Failed to register built-in types")?;
        let threads = config.resolved_worker_threads();
        tracing::info!("Engine context ready with {} worker threads", threads);

        Ok(Self {
            registry,
            config,
            classes,
            tasks: TaskManager::new(threads),
        })
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Mutable registry access for extension registration before the context is shared.
    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classes(&self) -> &BuiltinClasses {
        &self.classes
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }
}
