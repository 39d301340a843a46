//! Plugin lookup façade.
//!
//! A [`Registry`] ties discovery, normalization and constraint filtering
//! together:
//!
//! 1. the queried directory is resolved into one or more plugin roots,
//! 2. [`DiscoveryIndex`] yields raw metadata blobs for those roots,
//! 3. each blob is normalized into a [`PluginRecord`] (invalid ones dropped),
//! 4. records not declaring the requested capability are removed,
//! 5. the compiled constraint is applied to what is left.
//!
//! Results keep discovery order. Failures never surface to the caller: a bad
//! constraint yields no records, a broken index or library yields fewer.
//!
//! # Shared instance
//!
//! [`Registry::global`] returns a lazily built process-wide registry
//! configured from the environment. Code that wants explicit control (tests
//! in particular) builds its own with [`Registry::new`].

use crate::config::RegistryConfig;
use crate::constraint::Constraint;
use crate::discovery::DiscoveryIndex;
use crate::loader::{EmbeddedMetadataLoader, MetadataLoader};
use crate::metadata::MetadataNormalizer;
use crate::plugin::PluginRecord;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

static GLOBAL: OnceLock<Registry> = OnceLock::new();

pub struct Registry {
    config: RegistryConfig,
    loader: Box<dyn MetadataLoader>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new(config: RegistryConfig, loader: impl MetadataLoader + 'static) -> Self {
        Self {
            config,
            loader: Box::new(loader),
        }
    }

    /// The process-wide registry, built on first use from
    /// [`RegistryConfig::from_env`] with the [`EmbeddedMetadataLoader`].
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(|| {
            let config = RegistryConfig::from_env();
            debug!(paths = ?config.library_paths, "Initializing plugin registry");
            Registry::new(config, EmbeddedMetadataLoader)
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Plugin roots for a queried directory. An absolute path is the only
    /// root; a relative one is looked up below every configured library
    /// path, in order.
    pub fn resolve_roots(&self, subdir: &str) -> Vec<PathBuf> {
        let path = Path::new(subdir);
        if path.is_absolute() {
            return vec![path.to_path_buf()];
        }
        self.config
            .library_paths
            .iter()
            .map(|base| {
                if subdir.is_empty() {
                    base.clone()
                } else {
                    base.join(path)
                }
            })
            .collect()
    }

    /// All valid plugins below `subdir`, restricted to `capability` unless
    /// it is empty.
    pub fn discover(&self, subdir: &str, capability: &str) -> Vec<PluginRecord> {
        let roots = self.resolve_roots(subdir);
        let capability = (!capability.is_empty()).then_some(capability);
        let discovery = DiscoveryIndex::new(&self.config, &*self.loader);

        let blobs = discovery
            .discover(&roots, capability)
            .into_iter()
            .map(|plugin| (plugin.metadata, plugin.library_path));
        let mut records = MetadataNormalizer::normalize_all(blobs);

        if let Some(tag) = capability {
            records.retain(|record| record.has_service_type(tag));
        }
        records
    }

    /// Plugins below `subdir` that declare `capability` and satisfy
    /// `constraint`.
    ///
    /// An empty capability or constraint does not filter. A constraint that
    /// fails to compile matches nothing; the directory is not even scanned.
    pub fn query(&self, subdir: &str, capability: &str, constraint: &str) -> Vec<PluginRecord> {
        let compiled = if constraint.trim().is_empty() {
            None
        } else {
            match Constraint::parse(constraint) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!(constraint, error = %e, "Rejecting plugin query");
                    return Vec::new();
                }
            }
        };

        let records = self.discover(subdir, capability);
        match compiled {
            Some(compiled) => Self::filter(&records, &compiled),
            None => records,
        }
    }

    /// Keeps only the records matching `constraint`, in place.
    ///
    /// An empty constraint keeps everything; one that fails to compile
    /// empties the list.
    pub fn apply_constraints(records: &mut Vec<PluginRecord>, constraint: &str) {
        if constraint.trim().is_empty() {
            return;
        }
        match Constraint::parse(constraint) {
            Ok(compiled) => records.retain(|record| compiled.matches(record)),
            Err(e) => {
                warn!(constraint, error = %e, "Invalid plugin constraint, dropping all candidates");
                records.clear();
            }
        }
    }

    /// Records matching a compiled constraint, in their original order.
    pub fn filter(records: &[PluginRecord], constraint: &Constraint) -> Vec<PluginRecord> {
        records
            .iter()
            .filter(|record| constraint.matches(*record))
            .cloned()
            .collect()
    }
}
