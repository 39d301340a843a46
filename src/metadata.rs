//! Metadata normalization.
//!
//! Plugin metadata arrives in three shapes:
//!
//! - **Structured**: a JSON document whose reserved fields live under the
//!   `Plugin` object. Custom properties sit at the top level.
//! - **Legacy**: a JSON document using the older flat key names
//!   (`X-PluginInfo-*`), renamed here to the canonical keys.
//! - **Flat**: a plain key/value map, as read from a desktop entry, from the
//!   metadata embedded in a library, or from a plugin index entry.
//!
//! Translatable keys (`Name`, `Comment`) carry locale variants as
//! `Key[locale]`. Structured and legacy sources keep every translation and
//! resolve on each read ([`TranslationPolicy::Lazy`]); flat sources resolve
//! once against the locale active during normalization and drop the rest
//! ([`TranslationPolicy::Eager`]).

use crate::error::{FinderError, FinderResult};
use crate::locale::{current_locale, TranslationTable};
use crate::plugin::{DisplayText, PluginRecord, TranslationPolicy};
use crate::properties::{FlatProperties, PropertyBag, PropertyValue};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Canonical property keys.
pub mod keys {
    pub const NAME: &str = "Name";
    pub const COMMENT: &str = "Comment";
    pub const ICON: &str = "Icon";
    pub const HIDDEN: &str = "Hidden";
    pub const ID: &str = "X-Plugin-Id";
    pub const AUTHOR: &str = "X-Plugin-Author";
    pub const EMAIL: &str = "X-Plugin-Email";
    pub const CATEGORY: &str = "X-Plugin-Category";
    pub const DEPENDS: &str = "X-Plugin-Depends";
    pub const ENABLED_BY_DEFAULT: &str = "X-Plugin-EnabledByDefault";
    pub const LICENSE: &str = "X-Plugin-License";
    pub const VERSION: &str = "X-Plugin-Version";
    pub const WEBSITE: &str = "X-Plugin-Website";
    pub const SERVICE_TYPES: &str = "X-Plugin-ServiceTypes";
    pub const LIBRARY: &str = "X-Plugin-Library";
}

/// Name of the reserved namespace object in structured metadata.
pub const NAMESPACE: &str = "Plugin";

const DESKTOP_GROUP: &str = "Desktop Entry";

const TRANSLATABLE_KEYS: [&str; 2] = [keys::NAME, keys::COMMENT];
const LIST_KEYS: [&str; 2] = [keys::DEPENDS, keys::SERVICE_TYPES];
const BOOL_KEYS: [&str; 2] = [keys::HIDDEN, keys::ENABLED_BY_DEFAULT];

const RESERVED_KEYS: [&str; 15] = [
    keys::NAME,
    keys::COMMENT,
    keys::ICON,
    keys::HIDDEN,
    keys::ID,
    keys::AUTHOR,
    keys::EMAIL,
    keys::CATEGORY,
    keys::DEPENDS,
    keys::ENABLED_BY_DEFAULT,
    keys::LICENSE,
    keys::VERSION,
    keys::WEBSITE,
    keys::SERVICE_TYPES,
    keys::LIBRARY,
];

/// Field names inside the structured namespace. `Authors` is handled apart.
const STRUCTURED_FIELDS: [(&str, &str); 12] = [
    ("Id", keys::ID),
    ("Name", keys::NAME),
    ("Description", keys::COMMENT),
    ("Icon", keys::ICON),
    ("Category", keys::CATEGORY),
    ("Dependencies", keys::DEPENDS),
    ("EnabledByDefault", keys::ENABLED_BY_DEFAULT),
    ("License", keys::LICENSE),
    ("Version", keys::VERSION),
    ("Website", keys::WEBSITE),
    ("ServiceTypes", keys::SERVICE_TYPES),
    ("Hidden", keys::HIDDEN),
];

const LEGACY_FIELDS: [(&str, &str); 15] = [
    ("Name", keys::NAME),
    ("Comment", keys::COMMENT),
    ("Icon", keys::ICON),
    ("Hidden", keys::HIDDEN),
    ("X-PluginInfo-Name", keys::ID),
    ("X-PluginInfo-Author", keys::AUTHOR),
    ("X-PluginInfo-Email", keys::EMAIL),
    ("X-PluginInfo-Category", keys::CATEGORY),
    ("X-PluginInfo-Depends", keys::DEPENDS),
    ("X-PluginInfo-EnabledByDefault", keys::ENABLED_BY_DEFAULT),
    ("X-PluginInfo-License", keys::LICENSE),
    ("X-PluginInfo-Version", keys::VERSION),
    ("X-PluginInfo-Website", keys::WEBSITE),
    ("ServiceTypes", keys::SERVICE_TYPES),
    ("X-Library", keys::LIBRARY),
];

/// One raw metadata blob.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataSource {
    Structured(Map<String, Value>),
    Legacy(Map<String, Value>),
    Flat(FlatProperties),
}

impl MetadataSource {
    /// Classifies a JSON document: structured when it has a `Plugin`
    /// object, legacy otherwise. Non-object documents are treated as empty.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) if map.get(NAMESPACE).is_some_and(Value::is_object) => {
                MetadataSource::Structured(map)
            }
            Value::Object(map) => MetadataSource::Legacy(map),
            _ => MetadataSource::Legacy(Map::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MetadataSource::Structured(map) | MetadataSource::Legacy(map) => map.is_empty(),
            MetadataSource::Flat(flat) => flat.is_empty(),
        }
    }

    /// The translation policy records built from this shape get.
    pub fn translation_policy(&self) -> TranslationPolicy {
        match self {
            MetadataSource::Structured(_) | MetadataSource::Legacy(_) => TranslationPolicy::Lazy,
            MetadataSource::Flat(_) => TranslationPolicy::Eager,
        }
    }
}

/// Fields gathered from a source before the record is assembled.
#[derive(Default)]
struct Collected {
    reserved: FlatProperties,
    translations: BTreeMap<&'static str, TranslationTable>,
    custom: FlatProperties,
}

impl Collected {
    fn add_reserved(&mut self, key: &'static str, locale: Option<&str>, value: PropertyValue) {
        if TRANSLATABLE_KEYS.contains(&key) {
            let Some(text) = display_string(&value) else {
                debug!(key, "Ignoring non-text translatable value");
                return;
            };
            let table = self.translations.remove(key).unwrap_or_default();
            let table = match locale {
                Some(tag) => table.with_translation(tag, text),
                None => {
                    let mut replaced = TranslationTable::new(text);
                    for (tag, translated) in table.translations() {
                        replaced = replaced.with_translation(tag, translated);
                    }
                    replaced
                }
            };
            self.translations.insert(key, table);
            return;
        }
        match coerce_reserved(key, value) {
            Some(value) => {
                self.reserved.insert(key.to_string(), value);
            }
            None => debug!(key, "Dropping reserved field with unusable value"),
        }
    }
}

/// Converts metadata blobs into [`PluginRecord`]s.
pub struct MetadataNormalizer;

impl MetadataNormalizer {
    /// Normalizes one blob.
    ///
    /// Returns `Ok(None)` for an empty blob and for metadata that fails the
    /// validity rule (no capability tags and no declared enabled-by-default
    /// flag). Fails with [`FinderError::MalformedMetadata`] when no plugin id
    /// can be determined.
    pub fn normalize(
        source: MetadataSource,
        library_path: &str,
    ) -> FinderResult<Option<PluginRecord>> {
        Self::normalize_entry(source, library_path, "")
    }

    /// Normalizes flat metadata read from the file at `entry_path`.
    pub fn normalize_file_entry(
        properties: FlatProperties,
        library_path: &str,
        entry_path: &str,
    ) -> FinderResult<Option<PluginRecord>> {
        Self::normalize_entry(MetadataSource::Flat(properties), library_path, entry_path)
    }

    /// Reads a desktop entry file and normalizes it as flat metadata.
    ///
    /// The library path is taken from the `X-Plugin-Library` key.
    pub fn from_desktop_file(path: &Path) -> FinderResult<Option<PluginRecord>> {
        let text = std::fs::read_to_string(path)?;
        let properties = parse_desktop_entry(&text);
        let entry_path = path.display().to_string();
        Self::normalize_file_entry(properties, "", &entry_path)
    }

    /// Normalizes a batch, logging and skipping blobs that fail.
    pub fn normalize_all<I>(sources: I) -> Vec<PluginRecord>
    where
        I: IntoIterator<Item = (MetadataSource, String)>,
    {
        sources
            .into_iter()
            .filter_map(|(source, library_path)| {
                match Self::normalize(source, &library_path) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(library = %library_path, error = %e, "Skipping plugin metadata");
                        None
                    }
                }
            })
            .collect()
    }

    fn normalize_entry(
        source: MetadataSource,
        library_path: &str,
        entry_path: &str,
    ) -> FinderResult<Option<PluginRecord>> {
        if source.is_empty() {
            return Ok(None);
        }
        let policy = source.translation_policy();
        let collected = match source {
            MetadataSource::Structured(map) => collect_structured(map),
            MetadataSource::Legacy(map) => collect_legacy(map),
            MetadataSource::Flat(flat) => collect_flat(flat),
        };
        assemble(collected, policy, library_path, entry_path)
    }
}

fn collect_structured(mut root: Map<String, Value>) -> Collected {
    let mut collected = Collected::default();
    let namespace = match root.remove(NAMESPACE) {
        Some(Value::Object(namespace)) => namespace,
        _ => Map::new(),
    };

    for (field, value) in namespace {
        let (base, locale) = split_locale_suffix(&field);
        if base == "Authors" && locale.is_none() {
            collect_authors(&mut collected, &value);
            continue;
        }
        let Some(converted) = PropertyValue::from_json(&value) else {
            continue;
        };
        match lookup_key(&STRUCTURED_FIELDS, base) {
            Some(key) if locale.is_none() || TRANSLATABLE_KEYS.contains(&key) => {
                collected.add_reserved(key, locale, converted)
            }
            _ => {
                collected.custom.insert(field, converted);
            }
        }
    }

    for (key, value) in root {
        if let Some(converted) = PropertyValue::from_json(&value) {
            collected.custom.insert(key, converted);
        }
    }
    collected
}

fn collect_legacy(root: Map<String, Value>) -> Collected {
    let mut collected = Collected::default();
    for (field, value) in root {
        let Some(converted) = PropertyValue::from_json(&value) else {
            continue;
        };
        let (base, locale) = split_locale_suffix(&field);
        match lookup_key(&LEGACY_FIELDS, base) {
            Some(key) if locale.is_none() || TRANSLATABLE_KEYS.contains(&key) => {
                collected.add_reserved(key, locale, converted)
            }
            _ => {
                collected.custom.insert(field, converted);
            }
        }
    }
    collected
}

fn collect_flat(flat: FlatProperties) -> Collected {
    let mut collected = Collected::default();
    for (field, value) in flat {
        let (base, locale) = split_locale_suffix(&field);
        let reserved = RESERVED_KEYS.iter().copied().find(|key| *key == base);
        match reserved {
            Some(key) if locale.is_none() || TRANSLATABLE_KEYS.contains(&key) => {
                collected.add_reserved(key, locale, value)
            }
            _ => {
                collected.custom.insert(field, value);
            }
        }
    }
    collected
}

/// Authors may be a single `{Name, Email}` object or an array of them; only
/// the first author maps onto the reserved fields.
fn collect_authors(collected: &mut Collected, value: &Value) {
    let first = match value {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(value),
        _ => None,
    };
    let Some(Value::Object(author)) = first else {
        return;
    };
    if let Some(Value::String(name)) = author.get("Name") {
        collected.add_reserved(keys::AUTHOR, None, name.as_str().into());
    }
    if let Some(Value::String(email)) = author.get("Email") {
        collected.add_reserved(keys::EMAIL, None, email.as_str().into());
    }
}

fn assemble(
    mut collected: Collected,
    policy: TranslationPolicy,
    library_path: &str,
    entry_path: &str,
) -> FinderResult<Option<PluginRecord>> {
    let library_path = if library_path.is_empty() {
        collected
            .reserved
            .get(keys::LIBRARY)
            .and_then(PropertyValue::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        library_path.to_string()
    };

    let plugin_id = match collected.reserved.get(keys::ID).and_then(PropertyValue::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => match Path::new(&library_path).file_stem() {
            Some(stem) if !stem.is_empty() => stem.to_string_lossy().into_owned(),
            _ => {
                return Err(FinderError::MalformedMetadata(
                    "no plugin id and no library path to derive one from".to_string(),
                ))
            }
        },
    };
    collected
        .reserved
        .insert(keys::ID.to_string(), plugin_id.as_str().into());

    let service_types = collected
        .reserved
        .get(keys::SERVICE_TYPES)
        .and_then(PropertyValue::as_list)
        .map(<[String]>::to_vec)
        .unwrap_or_default();
    if service_types.is_empty() && !collected.reserved.contains_key(keys::ENABLED_BY_DEFAULT) {
        debug!(plugin_id = %plugin_id, "Dropping plugin without service types or enabled flag");
        return Ok(None);
    }

    let locale = current_locale();
    let mut display = |key: &'static str| -> DisplayText {
        let table = collected.translations.remove(key).unwrap_or_default();
        match policy {
            TranslationPolicy::Lazy => DisplayText::Translatable(table),
            TranslationPolicy::Eager => {
                let text = table.resolve(&locale).to_string();
                if !text.is_empty() {
                    collected.reserved.insert(key.to_string(), text.as_str().into());
                }
                DisplayText::Frozen(text)
            }
        }
    };
    let name = display(keys::NAME);
    let comment = display(keys::COMMENT);

    let reserved = PropertyBag::new(collected.reserved.clone());
    let mut merged = collected.reserved;
    merged.extend(collected.custom);

    Ok(Some(PluginRecord {
        plugin_id,
        service_types,
        name,
        comment,
        policy,
        reserved,
        properties: PropertyBag::new(merged),
        library_path,
        entry_path: entry_path.to_string(),
    }))
}

fn lookup_key(table: &[(&str, &'static str)], field: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, key)| *key)
}

/// Splits `Name[de]` into `("Name", Some("de"))`.
fn split_locale_suffix(field: &str) -> (&str, Option<&str>) {
    if let Some(stripped) = field.strip_suffix(']') {
        if let Some(open) = stripped.rfind('[') {
            let tag = &stripped[open + 1..];
            if !tag.is_empty() && open > 0 {
                return (&stripped[..open], Some(tag));
            }
        }
    }
    (field, None)
}

fn display_string(value: &PropertyValue) -> Option<String> {
    match value {
        PropertyValue::String(s) => Some(s.clone()),
        PropertyValue::Number(n) => Some(n.to_string()),
        PropertyValue::Bool(b) => Some(b.to_string()),
        PropertyValue::StringList(_) | PropertyValue::Absent => None,
    }
}

/// Brings a reserved value to the type its accessor expects.
fn coerce_reserved(key: &str, value: PropertyValue) -> Option<PropertyValue> {
    if LIST_KEYS.contains(&key) {
        return match value {
            PropertyValue::StringList(list) => Some(PropertyValue::StringList(list)),
            PropertyValue::String(s) => Some(PropertyValue::StringList(split_list(&s))),
            _ => None,
        };
    }
    if BOOL_KEYS.contains(&key) {
        return match value {
            PropertyValue::Bool(b) => Some(PropertyValue::Bool(b)),
            PropertyValue::String(s) if s.eq_ignore_ascii_case("true") => Some(true.into()),
            PropertyValue::String(s) if s.eq_ignore_ascii_case("false") => Some(false.into()),
            _ => None,
        };
    }
    display_string(&value).map(PropertyValue::String)
}

/// Splits a comma or semicolon separated list, skipping empty items.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses the `[Desktop Entry]` group of a desktop entry file into flat
/// string properties. Other groups and comment lines are ignored.
pub fn parse_desktop_entry(text: &str) -> FlatProperties {
    let mut properties = FlatProperties::new();
    let mut in_group = false;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(group) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_group = group == DESKTOP_GROUP;
            continue;
        }
        if !in_group {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            properties.insert(key.trim().to_string(), value.trim().into());
        }
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::set_default_locale;
    use serde_json::json;
    use serial_test::serial;

    fn structured() -> MetadataSource {
        MetadataSource::from_json(json!({
            "Plugin": {
                "Name": "NSA Plugin",
                "Name[de]": "NSA-Modul",
                "Description": "Test Plugin Spy",
                "Description[de]": "Test-Spionagemodul",
                "Icon": "preferences-system-time",
                "Authors": { "Name": "Sebastian Kügler", "Email": "sebas@kde.org" },
                "Category": "Examples",
                "Dependencies": [],
                "EnabledByDefault": "true",
                "License": "LGPL",
                "Id": "fakeplugin",
                "Version": "1.0",
                "Website": "http://kde.org/",
                "ServiceTypes": ["Plugin/NSA"]
            },
            "X-Foo-Bar": "Baz"
        }))
    }

    fn legacy() -> MetadataSource {
        MetadataSource::from_json(json!({
            "Name": "NSA Plugin",
            "Name[de]": "NSA-Modul",
            "Comment": "Test Plugin Spy",
            "Comment[de]": "Test-Spionagemodul",
            "Icon": "preferences-system-time",
            "Type": "Service",
            "X-Library": "fakeplugin",
            "X-PluginInfo-Author": "Sebastian Kügler",
            "X-PluginInfo-Category": "Examples",
            "X-PluginInfo-Depends": [],
            "X-PluginInfo-Email": "sebas@kde.org",
            "X-PluginInfo-EnabledByDefault": true,
            "X-PluginInfo-License": "LGPL",
            "X-PluginInfo-Name": "fakeplugin",
            "X-PluginInfo-Version": "1.0",
            "X-PluginInfo-Website": "http://kde.org/",
            "ServiceTypes": ["Plugin/NSA"]
        }))
    }

    const DESKTOP: &str = "\
# a comment
[Desktop Entry]
Name=NSA Plugin
Name[de]=NSA-Modul
Comment=Test Plugin Spy
Comment[de]=Test-Spionagemodul
Icon=preferences-system-time
Type=Service
X-Plugin-Library=fakeplugin
X-Plugin-Author=Sebastian Kügler
X-Plugin-Category=Examples
X-Plugin-Email=sebas@kde.org
X-Plugin-EnabledByDefault=true
X-Plugin-Id=fakeplugin
X-Plugin-License=LGPL
X-Plugin-Version=1.0
X-Plugin-Website=http://kde.org/
X-Plugin-ServiceTypes=Plugin/NSA

[Other Group]
Name=ignored
";

    fn assert_common_fields(record: &PluginRecord) {
        assert_eq!(record.plugin_id(), "fakeplugin");
        assert_eq!(record.author(), "Sebastian Kügler");
        assert_eq!(record.email(), "sebas@kde.org");
        assert_eq!(record.category(), "Examples");
        assert!(record.dependencies().is_empty());
        assert_eq!(record.icon(), "preferences-system-time");
        assert!(!record.is_hidden());
        assert!(record.is_enabled_by_default());
        assert_eq!(record.license(), "LGPL");
        assert_eq!(record.service_types(), ["Plugin/NSA".to_string()]);
        assert_eq!(record.version(), "1.0");
        assert_eq!(record.website(), "http://kde.org/");
    }

    #[test]
    fn structured_source_is_lazy() {
        let source = structured();
        assert_eq!(source.translation_policy(), TranslationPolicy::Lazy);
        let record = MetadataNormalizer::normalize(source, "").unwrap().unwrap();
        assert_common_fields(&record);
        assert_eq!(record.translation_policy(), TranslationPolicy::Lazy);
        assert_eq!(record.name_in("de_DE"), "NSA-Modul");
        assert_eq!(record.comment_in("C"), "Test Plugin Spy");
        assert_eq!(record.property("X-Foo-Bar").as_str(), Some("Baz"));
        assert_eq!(record.entry_path(), "");
    }

    #[test]
    fn legacy_keys_are_renamed() {
        let record = MetadataNormalizer::normalize(legacy(), "").unwrap().unwrap();
        assert_common_fields(&record);
        assert_eq!(record.translation_policy(), TranslationPolicy::Lazy);
        assert_eq!(record.library_path(), "fakeplugin");
        assert_eq!(record.property(keys::CATEGORY).as_str(), Some("Examples"));
        assert!(record.property("X-PluginInfo-Category").is_absent());
        assert_eq!(record.property("Type").as_str(), Some("Service"));
        assert_eq!(record.comment_in("de"), "Test-Spionagemodul");
    }

    #[test]
    #[serial]
    fn flat_source_freezes_translations_at_construction() {
        set_default_locale("de_DE");
        let german = MetadataNormalizer::normalize(
            MetadataSource::Flat(parse_desktop_entry(DESKTOP)),
            "",
        )
        .unwrap()
        .unwrap();
        set_default_locale("C");
        let plain = MetadataNormalizer::normalize(
            MetadataSource::Flat(parse_desktop_entry(DESKTOP)),
            "",
        )
        .unwrap()
        .unwrap();

        assert_common_fields(&german);
        assert_eq!(german.translation_policy(), TranslationPolicy::Eager);
        assert_eq!(german.name(), "NSA-Modul");
        assert_eq!(german.comment(), "Test-Spionagemodul");
        assert_eq!(plain.name(), "NSA Plugin");
        // Translations are gone, so explicit locales do not change anything.
        assert_eq!(german.name_in("C"), "NSA-Modul");
        assert!(german.name_translations().is_none());
        assert!(german.property("Name[de]").is_absent());
    }

    #[test]
    fn desktop_file_sets_entry_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fakeplugin.desktop");
        std::fs::write(&path, DESKTOP).unwrap();

        let record = MetadataNormalizer::from_desktop_file(&path).unwrap().unwrap();
        assert_eq!(record.entry_path(), path.display().to_string());
        assert_eq!(record.library_path(), "fakeplugin");
        assert_common_fields(&record);
    }

    #[test]
    fn missing_desktop_file_is_an_io_error() {
        let missing = Path::new("/this/path/does/not/exist.desktop");
        let result = MetadataNormalizer::from_desktop_file(missing);
        assert!(matches!(result, Err(FinderError::Io(_))));
    }

    #[test]
    fn empty_source_yields_no_record() {
        let result = MetadataNormalizer::normalize(MetadataSource::Flat(FlatProperties::new()), "");
        assert!(matches!(result, Ok(None)));
        let result = MetadataNormalizer::normalize(MetadataSource::from_json(json!([1, 2])), "");
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn missing_identity_is_malformed() {
        let source = MetadataSource::from_json(json!({
            "Plugin": { "Name": "Nameless", "ServiceTypes": ["Plugin/NSA"] }
        }));
        let result = MetadataNormalizer::normalize(source, "");
        assert!(matches!(result, Err(FinderError::MalformedMetadata(_))));
    }

    #[test]
    fn id_falls_back_to_library_stem() {
        let source = MetadataSource::from_json(json!({
            "Plugin": { "ServiceTypes": ["Plugin/NSA"] }
        }));
        let record = MetadataNormalizer::normalize(source, "/usr/lib/plugins/spy.so")
            .unwrap()
            .unwrap();
        assert_eq!(record.plugin_id(), "spy");
        assert_eq!(record.property(keys::ID).as_str(), Some("spy"));
    }

    #[test]
    fn records_without_tags_or_enabled_flag_are_dropped() {
        let mut flat = FlatProperties::new();
        flat.insert(keys::ID.into(), "lonely".into());
        let result = MetadataNormalizer::normalize(MetadataSource::Flat(flat.clone()), "");
        assert!(matches!(result, Ok(None)));

        flat.insert(keys::ENABLED_BY_DEFAULT.into(), "false".into());
        let record = MetadataNormalizer::normalize(MetadataSource::Flat(flat), "")
            .unwrap()
            .unwrap();
        assert!(!record.is_enabled_by_default());
    }

    #[test]
    fn flat_lists_accept_separated_strings() {
        let mut flat = FlatProperties::new();
        flat.insert(keys::ID.into(), "multi".into());
        flat.insert(keys::SERVICE_TYPES.into(), "Plugin/A, Plugin/B;".into());
        let record = MetadataNormalizer::normalize(MetadataSource::Flat(flat), "")
            .unwrap()
            .unwrap();
        assert_eq!(record.service_types(), ["Plugin/A".to_string(), "Plugin/B".to_string()]);
    }

    #[test]
    fn structured_round_trips_through_flat_form() {
        let record = MetadataNormalizer::normalize(structured(), "").unwrap().unwrap();
        let flat = record.to_flat_properties();
        assert_eq!(flat.get("Name[de]"), Some(&PropertyValue::from("NSA-Modul")));

        let again = MetadataNormalizer::normalize(MetadataSource::Flat(flat), "")
            .unwrap()
            .unwrap();
        assert_eq!(again.plugin_id(), record.plugin_id());
        assert_eq!(again.service_types(), record.service_types());
        let custom = |r: &PluginRecord| {
            r.custom_properties()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(custom(&again), custom(&record));
        assert_eq!(again.author(), record.author());
    }

    #[test]
    fn structured_json_normalizes_back_to_equal_record() {
        let record = MetadataNormalizer::normalize(structured(), "").unwrap().unwrap();
        let again = MetadataNormalizer::normalize(
            MetadataSource::from_json(record.to_structured_json()),
            "",
        )
        .unwrap()
        .unwrap();
        assert_eq!(again, record);
        assert_eq!(again.name_in("de"), "NSA-Modul");
    }

    #[test]
    fn normalize_all_skips_failures() {
        let nameless = MetadataSource::from_json(json!({ "Plugin": { "Name": "x" } }));
        let records = MetadataNormalizer::normalize_all(vec![
            (nameless, String::new()),
            (structured(), String::new()),
        ]);
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn splits_locale_suffix() {
        assert_eq!(split_locale_suffix("Name[de]"), ("Name", Some("de")));
        assert_eq!(split_locale_suffix("Name"), ("Name", None));
        assert_eq!(split_locale_suffix("[odd]"), ("[odd]", None));
    }
}
