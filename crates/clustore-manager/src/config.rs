//! Storage configuration, loaded from TOML.
//!
//! ```toml
//! [[backends]]
//! kind = "file"
//! id = "local"
//! root = "/var/lib/clustore"
//!
//! [[backends]]
//! kind = "memory"
//! id = "scratch"
//! default_capability = "none"
//! capabilities = { Job = "readwrite" }
//!
//! [cache]
//! policy = "bounded"
//! max_entries = 10000
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use clustore_store::Capability;
use clustore_types::ClusterType;

use crate::cache::CachePolicy;
use crate::error::{ManagerError, ManagerResult};

/// Default directory of the file backend when no configuration is given.
pub const DEFAULT_DATA_DIR: &str = "clustore-data";

/// Top-level configuration: backends in priority order, plus the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// One backend entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Registry key of the backend implementation, e.g. `file`.
    pub kind: String,
    /// Unique short code for logs and errors.
    pub id: String,
    /// Storage location, for backends that need one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Capability for types not listed in `capabilities`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_capability: Option<Capability>,
    /// Per-type overrides, keyed by cluster type name (`Property`,
    /// `AuditTrail`, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<String, Capability>,
}

impl BackendConfig {
    /// A backend entry with no capability overrides.
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            root: None,
            default_capability: None,
            capabilities: BTreeMap::new(),
        }
    }

    /// Set the storage root (required by `file` backends).
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Resolve `capabilities` keys to cluster types.
    pub fn capability_overrides(&self) -> ManagerResult<Vec<(ClusterType, Capability)>> {
        self.capabilities
            .iter()
            .map(|(name, cap)| match ClusterType::from_name(name) {
                Some(ct) if ct != ClusterType::Root => Ok((ct, *cap)),
                _ => Err(ManagerError::Config(format!(
                    "backend '{}': unknown cluster type '{name}'",
                    self.id
                ))),
            })
            .collect()
    }
}

/// Cache retention as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum CacheConfig {
    Unbounded,
    Bounded { max_entries: usize },
    Expiring { ttl_secs: u64 },
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::Expiring { ttl_secs: 600 }
    }
}

impl CacheConfig {
    /// Retention policy this section describes.
    pub fn policy(&self) -> CachePolicy {
        match *self {
            Self::Unbounded => CachePolicy::Unbounded,
            Self::Bounded { max_entries } => CachePolicy::Bounded { max_entries },
            Self::Expiring { ttl_secs } => CachePolicy::Expiring {
                ttl: Duration::from_secs(ttl_secs),
            },
        }
    }
}

impl StorageConfig {
    /// A single read-write file backend rooted at `root`.
    pub fn single_file(root: impl Into<PathBuf>) -> Self {
        Self {
            backends: vec![BackendConfig::new("file", "file").with_root(root)],
            cache: CacheConfig::default(),
        }
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> ManagerResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ManagerError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ManagerResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ManagerError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Render back to TOML.
    pub fn to_toml_string(&self) -> ManagerResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ManagerError::Config(format!("failed to encode config: {e}")))
    }

    /// Reject configurations no manager can be built from.
    pub fn validate(&self) -> ManagerResult<()> {
        if self.backends.is_empty() {
            return Err(ManagerError::Config("no storage backends configured".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.id.as_str()) {
                return Err(ManagerError::Config(format!(
                    "duplicate backend id '{}'",
                    backend.id
                )));
            }
            backend.capability_overrides()?;
        }
        if let CacheConfig::Bounded { max_entries: 0 } = self.cache {
            return Err(ManagerError::Config(
                "bounded cache needs max_entries > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::single_file(DEFAULT_DATA_DIR)
    }
}
