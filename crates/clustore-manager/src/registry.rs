use std::collections::BTreeMap;
use std::sync::Arc;

use clustore_store::{ClusterStorage, FileClusterStorage, InMemoryClusterStorage};

use crate::config::BackendConfig;
use crate::error::{ManagerError, ManagerResult};

/// Builds one backend from its configuration entry.
pub type BackendFactory =
    Box<dyn Fn(&BackendConfig) -> ManagerResult<Arc<dyn ClusterStorage>> + Send + Sync>;

/// Maps a backend `kind` string to its constructor.
///
/// Populated at process start; configuration then names backends by kind.
#[derive(Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the bundled `memory` and `file` backends.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("memory", |config| {
            let mut store = InMemoryClusterStorage::new(config.id.clone());
            if let Some(cap) = config.default_capability {
                store = store.with_default_capability(cap);
            }
            for (ct, cap) in config.capability_overrides()? {
                store = store.with_capability(ct, cap);
            }
            Ok(Arc::new(store) as Arc<dyn ClusterStorage>)
        });
        registry.register("file", |config| {
            let root = config.root.clone().ok_or_else(|| {
                ManagerError::Config(format!("file backend '{}' needs a root", config.id))
            })?;
            let mut store = FileClusterStorage::new(config.id.clone(), root);
            if let Some(cap) = config.default_capability {
                store = store.with_default_capability(cap);
            }
            for (ct, cap) in config.capability_overrides()? {
                store = store.with_capability(ct, cap);
            }
            Ok(Arc::new(store) as Arc<dyn ClusterStorage>)
        });
        registry
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&BackendConfig) -> ManagerResult<Arc<dyn ClusterStorage>> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct the backend `config` describes; unknown kinds are a
    /// configuration error.
    pub fn build(&self, config: &BackendConfig) -> ManagerResult<Arc<dyn ClusterStorage>> {
        let factory = self.factories.get(&config.kind).ok_or_else(|| {
            ManagerError::Config(format!(
                "backend '{}' has unknown kind '{}'",
                config.id, config.kind
            ))
        })?;
        factory(config)
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
