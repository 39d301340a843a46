//! PluginFinder Core Library
//!
//! Discovers plugins, normalizes their self-describing metadata into one
//! record model and filters them with a small constraint query language.
//!
//! # Overview
//!
//! ```text
//! Registry::query(dir, capability, constraint)
//!   -> DiscoveryIndex      index file or library scan per plugin directory
//!   -> MetadataNormalizer  raw blob -> PluginRecord (invalid blobs dropped)
//!   -> capability filter   X-Plugin-ServiceTypes membership
//!   -> Constraint          compiled once, evaluated per record
//! ```
//!
//! # Modules
//!
//! ## Metadata (`metadata`, `plugin`, `properties`, `locale`)
//! - `MetadataNormalizer` - Turns structured, legacy and flat metadata into a `PluginRecord`
//! - `PluginRecord` - Immutable plugin description with typed accessors
//! - `PropertyValue` / `PropertyBag` - Closed set of property value types
//! - `TranslationTable` - Locale-keyed display text; eager records freeze it,
//!   lazy records re-resolve on every read
//!
//! ## Constraints (`constraint`, `evaluate`)
//! - `Constraint::parse()` - Recursive-descent parser producing an owned AST
//! - `Constraint::evaluate()` - Tri-state evaluation (match, no match, indeterminate)
//!
//! ## Discovery (`discovery`, `loader`, `config`)
//! - `DiscoveryIndex` - Reads `pluginindex.json` or scans for loadable libraries
//! - `write_index()` - Generates an index file for a plugin directory
//! - `MetadataLoader` - Source of metadata embedded in a library file
//! - `RegistryConfig` - Library paths, index file name and library suffixes
//!
//! ## Lookup (`registry`)
//! - `Registry::query()` - Discover, normalize and filter in one call
//! - `Registry::apply_constraints()` - Filter an existing record list
//! - `Registry::global()` - Process-wide instance configured from `PLUGIN_PATH`
//!
//! # Example
//!
//! ```no_run
//! use pluginfinder_core::Registry;
//!
//! let plugins = Registry::global().query(
//!     "audio",
//!     "Audio/Effect",
//!     "[X-Plugin-Category] == 'Filters' AND [X-Plugin-EnabledByDefault] == true",
//! );
//! for plugin in &plugins {
//!     println!("{} ({})", plugin.name(), plugin.library_path());
//! }
//! ```

pub mod config;
pub mod constraint;
pub mod discovery;
pub mod error;
pub mod evaluate;
pub mod loader;
pub mod locale;
pub mod metadata;
pub mod plugin;
pub mod properties;
pub mod registry;

pub use config::RegistryConfig;
pub use constraint::{CompareOp, Constraint, Literal, LogicalOp, Node};
pub use discovery::{write_index, DiscoveredPlugin, DiscoveryIndex, DiscoveryOrigin, PluginIndex};
pub use error::{FinderError, FinderResult};
pub use evaluate::Outcome;
pub use loader::{EmbeddedMetadataLoader, MetadataLoader};
pub use locale::TranslationTable;
pub use metadata::{MetadataNormalizer, MetadataSource};
pub use plugin::{DisplayText, PluginRecord, TranslationPolicy};
pub use properties::{FlatProperties, PropertyBag, PropertyLookup, PropertyValue};
pub use registry::Registry;
