//! Access to metadata embedded in loadable plugin libraries.
//!
//! Discovery never loads or executes a library. It asks a [`MetadataLoader`]
//! for the flat metadata a file carries and treats `None` as "no plugin".

use crate::properties::{FlatProperties, PropertyValue};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::warn;

/// Marker preceding the JSON metadata object inside a library file.
pub const METADATA_MARKER: &[u8] = b"PLUGIN_METADATA";

/// Supplies the embedded metadata of a plugin library.
pub trait MetadataLoader: Send + Sync {
    /// Returns the flat metadata of the library at `path`, or `None` when
    /// the file carries none.
    fn load_metadata(&self, path: &Path) -> Option<FlatProperties>;
}

impl<F> MetadataLoader for F
where
    F: Fn(&Path) -> Option<FlatProperties> + Send + Sync,
{
    fn load_metadata(&self, path: &Path) -> Option<FlatProperties> {
        self(path)
    }
}

/// Reads metadata stored as a JSON object right after [`METADATA_MARKER`]
/// in the library's bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedMetadataLoader;

impl EmbeddedMetadataLoader {
    /// Like [`MetadataLoader::load_metadata`] but reports why a file with a
    /// marker could not be decoded.
    pub fn read_metadata(path: &Path) -> Result<Option<FlatProperties>> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read library: {:?}", path))?;
        let Some(start) = find_marker(&bytes) else {
            return Ok(None);
        };
        let payload = &bytes[start + METADATA_MARKER.len()..];
        let mut stream = serde_json::Deserializer::from_slice(payload).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) => Ok(Some(
                map.iter()
                    .filter_map(|(key, value)| {
                        PropertyValue::from_json(value).map(|v| (key.clone(), v))
                    })
                    .collect(),
            )),
            Some(Ok(_)) => bail!("Embedded metadata in {:?} is not a JSON object", path),
            Some(Err(e)) => {
                Err(e).with_context(|| format!("Failed to decode embedded metadata in {:?}", path))
            }
            None => Ok(None),
        }
    }
}

impl MetadataLoader for EmbeddedMetadataLoader {
    fn load_metadata(&self, path: &Path) -> Option<FlatProperties> {
        match Self::read_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring library metadata");
                None
            }
        }
    }
}

fn find_marker(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(METADATA_MARKER.len())
        .position(|window| window == METADATA_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_library(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_json_after_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut contents = b"\x7fELF\0\0garbage".to_vec();
        contents.extend_from_slice(METADATA_MARKER);
        contents.extend_from_slice(
            br#" {"X-Plugin-Id": "spy", "X-Plugin-ServiceTypes": ["Plugin/NSA"], "Weight": 2}"#,
        );
        contents.extend_from_slice(b"\0\x01trailing bytes");
        let path = write_library(dir.path(), "spy.so", &contents);

        let metadata = EmbeddedMetadataLoader.load_metadata(&path).unwrap();
        assert_eq!(metadata.get("X-Plugin-Id"), Some(&PropertyValue::from("spy")));
        assert_eq!(metadata.get("Weight"), Some(&PropertyValue::Number(2.0)));
    }

    #[test]
    fn library_without_marker_has_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_library(dir.path(), "plain.so", b"\x7fELF nothing here");
        assert!(EmbeddedMetadataLoader.load_metadata(&path).is_none());
        assert!(EmbeddedMetadataLoader::read_metadata(&path).unwrap().is_none());
    }

    #[test]
    fn undecodable_metadata_is_reported_then_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut contents = METADATA_MARKER.to_vec();
        contents.extend_from_slice(b"[1, 2]");
        let path = write_library(dir.path(), "array.so", &contents);
        assert!(EmbeddedMetadataLoader::read_metadata(&path).is_err());
        assert!(EmbeddedMetadataLoader.load_metadata(&path).is_none());
    }

    #[test]
    fn closures_are_loaders() {
        let loader = |path: &Path| {
            path.ends_with("yes.so").then(|| {
                let mut flat = FlatProperties::new();
                flat.insert("X-Plugin-Id".into(), "yes".into());
                flat
            })
        };
        assert!(loader.load_metadata(Path::new("/tmp/yes.so")).is_some());
        assert!(loader.load_metadata(Path::new("/tmp/no.so")).is_none());
    }
}
