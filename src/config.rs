use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable holding the plugin library search path.
pub const PLUGIN_PATH_ENV: &str = "PLUGIN_PATH";

/// Conventional name of the precomputed index inside a plugin directory.
pub const INDEX_FILE_NAME: &str = "pluginindex.json";

/// Settings for plugin lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base directories that relative query paths are resolved against, in
    /// precedence order.
    pub library_paths: Vec<PathBuf>,
    /// File name of the precomputed index inside a plugin directory.
    pub index_file_name: String,
    /// File suffixes (including the dot) of loadable libraries.
    pub library_suffixes: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            library_paths: Vec::new(),
            index_file_name: INDEX_FILE_NAME.to_string(),
            library_suffixes: default_library_suffixes(),
        }
    }
}

impl RegistryConfig {
    /// Default settings with library paths taken from `PLUGIN_PATH`.
    pub fn from_env() -> Self {
        let library_paths = std::env::var_os(PLUGIN_PATH_ENV)
            .map(|paths| {
                std::env::split_paths(&paths)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            library_paths,
            ..Self::default()
        }
    }
}

/// Returns the loadable-library suffixes of the current platform.
pub fn default_library_suffixes() -> Vec<String> {
    #[cfg(windows)]
    let suffixes: &[&str] = &[".dll"];

    #[cfg(not(windows))]
    let suffixes: &[&str] = &[".so", ".dylib", ".bundle", ".sl"];

    suffixes.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{ "library_paths": ["/opt/plugins"] }"#).unwrap();
        assert_eq!(config.library_paths, vec![PathBuf::from("/opt/plugins")]);
        assert_eq!(config.index_file_name, INDEX_FILE_NAME);
        assert_eq!(config.library_suffixes, default_library_suffixes());
    }

    #[test]
    #[serial_test::serial]
    fn library_paths_come_from_plugin_path() {
        let joined = std::env::join_paths(["/usr/lib/plugins", "", "/opt/plugins"]).unwrap();
        std::env::set_var(PLUGIN_PATH_ENV, &joined);
        let config = RegistryConfig::from_env();
        std::env::remove_var(PLUGIN_PATH_ENV);

        assert_eq!(
            config.library_paths,
            vec![PathBuf::from("/usr/lib/plugins"), PathBuf::from("/opt/plugins")]
        );
        assert_eq!(config.index_file_name, INDEX_FILE_NAME);
    }

    #[cfg(unix)]
    #[test]
    fn unix_suffixes() {
        assert!(default_library_suffixes().contains(&".so".to_string()));
    }
}
