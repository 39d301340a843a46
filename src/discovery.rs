//! Plugin discovery from plugin directories.
//!
//! # Lookup per directory
//!
//! 1. If the directory holds a plugin index (`pluginindex.json` by default),
//!    every entry of the index is a candidate and the directory is not
//!    scanned. An index that is older than the libraries next to it still
//!    wins; regenerating it is the installer's job.
//! 2. Otherwise the directory is scanned (non-recursively) for files with a
//!    loadable-library suffix, and each one is asked for its embedded
//!    metadata through a [`MetadataLoader`].
//!
//! A corrupt index is logged and handled like a missing one. Directories are
//! processed in the order given and their results concatenated; the same
//! plugin id may therefore show up more than once.

use crate::config::RegistryConfig;
use crate::error::{FinderError, FinderResult};
use crate::loader::MetadataLoader;
use crate::metadata::{keys, split_list, MetadataSource};
use crate::properties::{FlatProperties, PropertyValue};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Version written into newly generated index files.
pub const INDEX_VERSION: u32 = 1;

/// Where a discovered blob came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOrigin {
    Index,
    Scan,
}

/// A raw metadata blob found during discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPlugin {
    pub metadata: MetadataSource,
    pub library_path: String,
    pub origin: DiscoveryOrigin,
}

/// On-disk plugin index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginIndex {
    #[serde(default)]
    pub version: Option<u32>,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: Option<f64>,
    pub plugins: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PluginIndex {
    /// Reads and decodes an index file.
    ///
    /// # Errors
    ///
    /// [`FinderError::IndexParse`] when the file cannot be read, is not valid
    /// JSON, or lacks the `plugins` mapping.
    pub fn read(path: &Path) -> FinderResult<Self> {
        let parse_error = |message: String| FinderError::IndexParse {
            path: path.to_path_buf(),
            message,
        };
        let content = fs::read_to_string(path).map_err(|e| parse_error(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to encode plugin index")?;
        fs::write(path, content).context(format!("Failed to write plugin index: {:?}", path))?;
        Ok(())
    }

    /// Generation time of the index, if recorded.
    pub fn generated_at(&self) -> Option<DateTime<Utc>> {
        let timestamp = self.timestamp?;
        let secs = timestamp.floor();
        let nanos = ((timestamp - secs) * 1e9) as u32;
        DateTime::from_timestamp(secs as i64, nanos)
    }

    /// Converts the entries into discovered blobs, in id order. Entries
    /// without an explicit id get the index key.
    pub fn into_discovered(self) -> Vec<DiscoveredPlugin> {
        self.plugins
            .into_iter()
            .map(|(id, entry)| {
                let mut properties: FlatProperties = entry
                    .metadata
                    .iter()
                    .filter_map(|(key, value)| {
                        PropertyValue::from_json(value).map(|v| (key.clone(), v))
                    })
                    .collect();
                properties
                    .entry(keys::ID.to_string())
                    .or_insert(PropertyValue::String(id));
                DiscoveredPlugin {
                    metadata: MetadataSource::Flat(properties),
                    library_path: entry.path,
                    origin: DiscoveryOrigin::Index,
                }
            })
            .collect()
    }
}

/// Finds plugin metadata in plugin directories.
pub struct DiscoveryIndex<'a> {
    config: &'a RegistryConfig,
    loader: &'a dyn MetadataLoader,
}

impl<'a> DiscoveryIndex<'a> {
    pub fn new(config: &'a RegistryConfig, loader: &'a dyn MetadataLoader) -> Self {
        Self { config, loader }
    }

    /// Discovers plugins under every root, in root order.
    ///
    /// With a capability tag, blobs whose service types do not list it are
    /// skipped before normalization.
    pub fn discover(&self, roots: &[PathBuf], capability: Option<&str>) -> Vec<DiscoveredPlugin> {
        let mut found = Vec::new();
        for root in roots {
            if !root.is_dir() {
                debug!(path = %root.display(), "Skipping missing plugin directory");
                continue;
            }
            let discovered = self.discover_directory(root);
            found.extend(discovered.into_iter().filter(|plugin| match capability {
                Some(tag) if !tag.is_empty() => declares_service_type(&plugin.metadata, tag),
                _ => true,
            }));
        }
        debug!(count = found.len(), "Discovered plugin metadata");
        found
    }

    fn discover_directory(&self, dir: &Path) -> Vec<DiscoveredPlugin> {
        let index_path = dir.join(&self.config.index_file_name);
        if index_path.is_file() {
            match PluginIndex::read(&index_path) {
                Ok(index) => {
                    debug!(
                        path = %index_path.display(),
                        plugins = index.plugins.len(),
                        generated_at = ?index.generated_at(),
                        "Using plugin index"
                    );
                    return index.into_discovered();
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Ignoring unreadable plugin index, scanning directory instead"
                    );
                }
            }
        }

        match self.scan_directory(dir) {
            Ok(plugins) => plugins,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to scan plugin directory");
                Vec::new()
            }
        }
    }

    /// Scans `dir` (non-recursively) for loadable libraries and queries each
    /// for embedded metadata. Libraries without metadata are skipped.
    pub fn scan_directory(&self, dir: &Path) -> Result<Vec<DiscoveredPlugin>> {
        let entries = fs::read_dir(dir).context(format!("Failed to read directory: {:?}", dir))?;

        let mut libraries = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && self.is_library(&path) {
                libraries.push(path);
            }
        }
        libraries.sort();

        let plugins = libraries
            .into_iter()
            .filter_map(|path| {
                let metadata = self.loader.load_metadata(&path);
                if metadata.is_none() {
                    debug!(path = %path.display(), "Library carries no plugin metadata");
                }
                metadata.map(|properties| DiscoveredPlugin {
                    metadata: MetadataSource::Flat(properties),
                    library_path: path.display().to_string(),
                    origin: DiscoveryOrigin::Scan,
                })
            })
            .collect();
        Ok(plugins)
    }

    fn is_library(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.config
            .library_suffixes
            .iter()
            .any(|suffix| name.len() > suffix.len() && name.ends_with(suffix.as_str()))
    }
}

/// Whether raw metadata lists `tag` among its service types.
fn declares_service_type(metadata: &MetadataSource, tag: &str) -> bool {
    let MetadataSource::Flat(properties) = metadata else {
        return true;
    };
    match properties.get(keys::SERVICE_TYPES) {
        Some(PropertyValue::StringList(types)) => types.iter().any(|t| t == tag),
        Some(PropertyValue::String(types)) => split_list(types).iter().any(|t| t == tag),
        _ => false,
    }
}

/// Scans `dir` and writes a fresh index file for it.
///
/// Returns the index path and the number of plugins recorded.
pub fn write_index(
    dir: &Path,
    config: &RegistryConfig,
    loader: &dyn MetadataLoader,
) -> Result<(PathBuf, usize)> {
    let discovery = DiscoveryIndex::new(config, loader);
    let mut plugins = BTreeMap::new();
    for plugin in discovery.scan_directory(dir)? {
        let MetadataSource::Flat(properties) = plugin.metadata else {
            continue;
        };
        let id = match properties.get(keys::ID) {
            Some(PropertyValue::String(id)) if !id.is_empty() => id.clone(),
            _ => Path::new(&plugin.library_path)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let metadata = properties
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        let entry = IndexEntry {
            path: plugin.library_path,
            metadata,
        };
        if plugins.insert(id.clone(), entry).is_some() {
            warn!(plugin_id = %id, "Duplicate plugin id while indexing, keeping the last");
        }
    }

    let count = plugins.len();
    let index = PluginIndex {
        version: Some(INDEX_VERSION),
        timestamp: Some(Utc::now().timestamp_millis() as f64 / 1000.0),
        plugins,
    };
    let path = dir.join(&config.index_file_name);
    index.write(&path)?;
    info!(path = %path.display(), plugins = count, "Wrote plugin index");
    Ok((path, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{EmbeddedMetadataLoader, METADATA_MARKER};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn flat(id: &str, service_type: &str) -> FlatProperties {
        let mut properties = FlatProperties::new();
        properties.insert(keys::ID.into(), id.into());
        properties.insert(keys::SERVICE_TYPES.into(), vec![service_type.to_string()].into());
        properties
    }

    fn write_library(dir: &Path, file: &str, id: &str, service_type: &str) {
        let mut contents = b"\x7fELF".to_vec();
        contents.extend_from_slice(METADATA_MARKER);
        let json = serde_json::json!({ keys::ID: id, keys::SERVICE_TYPES: [service_type] });
        contents.extend_from_slice(json.to_string().as_bytes());
        fs::write(dir.join(file), contents).unwrap();
    }

    const INDEX: &str = r#"{
        "version": 1,
        "timestamp": 1400000000.5,
        "plugins": {
            "zeta": {
                "path": "/opt/zeta.so",
                "metadata": { "X-Plugin-ServiceTypes": ["Plugin/NSA"] }
            },
            "alpha": {
                "path": "/opt/alpha.so",
                "metadata": { "X-Plugin-Id": "alpha", "X-Plugin-ServiceTypes": "Plugin/Other" }
            }
        }
    }"#;

    #[test]
    fn index_wins_and_scanning_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pluginindex.json"), INDEX).unwrap();
        write_library(dir.path(), "stale.so", "stale", "Plugin/NSA");

        let calls = AtomicUsize::new(0);
        let loader = |_: &Path| -> Option<FlatProperties> {
            calls.fetch_add(1, Ordering::SeqCst);
            None
        };
        let config = RegistryConfig::default();
        let found =
            DiscoveryIndex::new(&config, &loader).discover(&[dir.path().to_path_buf()], None);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.origin == DiscoveryOrigin::Index));
        assert_eq!(found[0].library_path, "/opt/alpha.so");
        match &found[1].metadata {
            MetadataSource::Flat(properties) => {
                assert_eq!(properties.get(keys::ID), Some(&PropertyValue::from("zeta")))
            }
            other => panic!("unexpected metadata {other:?}"),
        }
    }

    #[test]
    fn corrupt_or_incomplete_index_falls_back_to_scan() {
        for broken in ["{ not json", r#"{ "version": 1 }"#] {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("pluginindex.json"), broken).unwrap();
            write_library(dir.path(), "spy.so", "spy", "Plugin/NSA");

            let config = RegistryConfig::default();
            let found = DiscoveryIndex::new(&config, &EmbeddedMetadataLoader)
                .discover(&[dir.path().to_path_buf()], None);
            assert_eq!(found.len(), 1, "index {broken:?}");
            assert_eq!(found[0].origin, DiscoveryOrigin::Scan);
        }
    }

    #[test]
    fn scan_yields_one_blob_per_library_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        write_library(dir.path(), "b.so", "b", "Plugin/NSA");
        write_library(dir.path(), "a.dylib", "a", "Plugin/NSA");
        fs::write(dir.path().join("empty.so"), b"no metadata").unwrap();
        fs::write(dir.path().join("readme.txt"), b"not a library").unwrap();
        fs::create_dir(dir.path().join("nested.so")).unwrap();

        let config = RegistryConfig {
            library_suffixes: vec![".so".into(), ".dylib".into()],
            ..RegistryConfig::default()
        };
        let found = DiscoveryIndex::new(&config, &EmbeddedMetadataLoader)
            .scan_directory(dir.path())
            .unwrap();
        let libraries: Vec<_> = found
            .iter()
            .map(|p| Path::new(&p.library_path).file_name().unwrap().to_owned())
            .collect();
        assert_eq!(libraries, vec!["a.dylib", "b.so"]);
    }

    #[test]
    fn roots_are_concatenated_without_dedup() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let loader = |path: &Path| Some(flat("same", "Plugin/NSA")).filter(|_| path.exists());
        fs::write(first.path().join("same.so"), b"").unwrap();
        fs::write(second.path().join("same.so"), b"").unwrap();

        let config = RegistryConfig {
            library_suffixes: vec![".so".into()],
            ..RegistryConfig::default()
        };
        let roots = vec![
            second.path().to_path_buf(),
            PathBuf::from("/this/path/does/not/exist"),
            first.path().to_path_buf(),
        ];
        let found = DiscoveryIndex::new(&config, &loader).discover(&roots, None);
        assert_eq!(found.len(), 2);
        assert!(found[0].library_path.starts_with(&*second.path().to_string_lossy()));
        assert!(found[1].library_path.starts_with(&*first.path().to_string_lossy()));
    }

    #[test]
    fn capability_prefilters_raw_metadata() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pluginindex.json"), INDEX).unwrap();
        let config = RegistryConfig::default();
        let found = DiscoveryIndex::new(&config, &EmbeddedMetadataLoader)
            .discover(&[dir.path().to_path_buf()], Some("Plugin/Other"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].library_path, "/opt/alpha.so");
    }

    #[test]
    fn written_index_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        write_library(dir.path(), "spy.so", "spy", "Plugin/NSA");
        write_library(dir.path(), "other.so", "other", "Plugin/Other");
        let config = RegistryConfig::default();

        let (path, count) = write_index(dir.path(), &config, &EmbeddedMetadataLoader).unwrap();
        assert_eq!(count, 2);
        let index = PluginIndex::read(&path).unwrap();
        assert_eq!(index.version, Some(INDEX_VERSION));
        assert!(index.generated_at().is_some());
        assert!(index.plugins["spy"].path.ends_with("spy.so"));

        // The directory is now served from the index.
        let loader = |_: &Path| -> Option<FlatProperties> { panic!("scanned despite index") };
        let found =
            DiscoveryIndex::new(&config, &loader).discover(&[dir.path().to_path_buf()], None);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn timestamp_converts_to_utc() {
        let index: PluginIndex = serde_json::from_str(INDEX).unwrap();
        let generated = index.generated_at().unwrap();
        assert_eq!(generated.timestamp(), 1_400_000_000);
        assert_eq!(generated.timestamp_subsec_millis(), 500);
    }
}
