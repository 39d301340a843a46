use crate::locale::{current_locale, TranslationTable};
use crate::metadata::keys;
use crate::properties::{FlatProperties, PropertyBag, PropertyLookup, PropertyValue};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::borrow::Cow;

/// How the translatable display strings of a record are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TranslationPolicy {
    /// Resolved once when the record was normalized; locale changes made
    /// afterwards are not observed.
    Eager,
    /// Every read resolves against the locale active at that moment.
    Lazy,
}

/// A translatable display string in one of its two policy forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DisplayText {
    Frozen(String),
    Translatable(TranslationTable),
}

impl DisplayText {
    pub fn resolve(&self, locale: &str) -> &str {
        match self {
            DisplayText::Frozen(text) => text,
            DisplayText::Translatable(table) => table.resolve(locale),
        }
    }

    pub fn current(&self) -> Cow<'_, str> {
        match self {
            DisplayText::Frozen(text) => Cow::Borrowed(text),
            DisplayText::Translatable(table) => Cow::Borrowed(table.resolve(&current_locale())),
        }
    }

    pub fn table(&self) -> Option<&TranslationTable> {
        match self {
            DisplayText::Frozen(_) => None,
            DisplayText::Translatable(table) => Some(table),
        }
    }
}

/// Canonical, immutable description of one discoverable plugin.
///
/// Typed accessors read the reserved metadata fields. Custom properties that
/// reuse a reserved key shadow it for generic lookups ([`property`]) and
/// constraint evaluation, never for the typed accessors.
///
/// [`property`]: PluginRecord::property
#[derive(Debug, Clone)]
pub struct PluginRecord {
    pub(crate) plugin_id: String,
    pub(crate) service_types: Vec<String>,
    pub(crate) name: DisplayText,
    pub(crate) comment: DisplayText,
    pub(crate) policy: TranslationPolicy,
    /// Reserved fields only, as normalized from the source shape.
    pub(crate) reserved: PropertyBag,
    /// Reserved fields overlaid with custom properties.
    pub(crate) properties: PropertyBag,
    pub(crate) library_path: String,
    pub(crate) entry_path: String,
}

impl PluginRecord {
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn service_types(&self) -> &[String] {
        &self.service_types
    }

    pub fn has_service_type(&self, service_type: &str) -> bool {
        self.service_types.iter().any(|s| s == service_type)
    }

    /// Display name under the record's translation policy.
    pub fn name(&self) -> Cow<'_, str> {
        self.name.current()
    }

    pub fn name_in(&self, locale: &str) -> &str {
        self.name.resolve(locale)
    }

    /// Description under the record's translation policy.
    pub fn comment(&self) -> Cow<'_, str> {
        self.comment.current()
    }

    pub fn comment_in(&self, locale: &str) -> &str {
        self.comment.resolve(locale)
    }

    pub fn translation_policy(&self) -> TranslationPolicy {
        self.policy
    }

    /// The retained translations of the display name (lazy records only).
    pub fn name_translations(&self) -> Option<&TranslationTable> {
        self.name.table()
    }

    pub fn comment_translations(&self) -> Option<&TranslationTable> {
        self.comment.table()
    }

    pub fn icon(&self) -> &str {
        self.reserved_str(keys::ICON)
    }

    pub fn author(&self) -> &str {
        self.reserved_str(keys::AUTHOR)
    }

    pub fn email(&self) -> &str {
        self.reserved_str(keys::EMAIL)
    }

    pub fn category(&self) -> &str {
        self.reserved_str(keys::CATEGORY)
    }

    pub fn dependencies(&self) -> &[String] {
        self.reserved.get(keys::DEPENDS).as_list().unwrap_or_default()
    }

    pub fn license(&self) -> &str {
        self.reserved_str(keys::LICENSE)
    }

    pub fn version(&self) -> &str {
        self.reserved_str(keys::VERSION)
    }

    pub fn website(&self) -> &str {
        self.reserved_str(keys::WEBSITE)
    }

    pub fn is_hidden(&self) -> bool {
        self.reserved.get(keys::HIDDEN).as_bool().unwrap_or(false)
    }

    pub fn is_enabled_by_default(&self) -> bool {
        self.reserved
            .get(keys::ENABLED_BY_DEFAULT)
            .as_bool()
            .unwrap_or(false)
    }

    /// Path of the loadable library, empty when unknown.
    pub fn library_path(&self) -> &str {
        &self.library_path
    }

    /// Path of the file the metadata was read from, empty when the record
    /// was not built directly from a file.
    pub fn entry_path(&self) -> &str {
        &self.entry_path
    }

    /// All properties, reserved fields shadowed by custom ones.
    ///
    /// Translatable keys of lazy records are not stored here; use
    /// [`property`](Self::property) or [`name`](Self::name) for those.
    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    /// Generic property lookup, the same view constraints are evaluated on.
    pub fn property(&self, key: &str) -> Cow<'_, PropertyValue> {
        self.lookup(key)
    }

    /// Properties that are not reserved fields, or that shadow one.
    pub fn custom_properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties
            .iter()
            .filter(move |(key, value)| self.reserved.get(key) != *value)
    }

    /// Derives a new record carrying one more custom property.
    ///
    /// The result no longer corresponds to the file it was read from, so its
    /// entry path is empty. Reserved fields and the translation policy carry
    /// over unchanged.
    pub fn with_property(&self, key: &str, value: impl Into<PropertyValue>) -> PluginRecord {
        let mut properties = self.properties.to_flat();
        properties.insert(key.to_string(), value.into());
        PluginRecord {
            properties: PropertyBag::new(properties),
            entry_path: String::new(),
            ..self.clone()
        }
    }

    /// Flat (desktop-entry style) view of the record.
    ///
    /// Lazy records emit their default text plus one `Key[locale]` entry per
    /// translation; eager records emit the frozen text. Custom properties
    /// that collide with a reserved key are left out so the declared field
    /// survives normalizing the result again.
    pub fn to_flat_properties(&self) -> FlatProperties {
        let mut flat = self.reserved.to_flat();
        emit_display_text(&mut flat, keys::NAME, &self.name);
        emit_display_text(&mut flat, keys::COMMENT, &self.comment);
        if !self.library_path.is_empty() {
            flat.entry(keys::LIBRARY.to_string())
                .or_insert_with(|| PropertyValue::String(self.library_path.clone()));
        }
        for (key, value) in self.custom_properties() {
            flat.entry(key.to_string()).or_insert_with(|| value.clone());
        }
        flat
    }

    /// Structured JSON document with the reserved fields under the `Plugin`
    /// namespace and custom properties at the top level.
    pub fn to_structured_json(&self) -> Value {
        let mut plugin = Map::new();
        plugin.insert("Id".into(), Value::String(self.plugin_id.clone()));
        emit_display_json(&mut plugin, "Name", &self.name);
        emit_display_json(&mut plugin, "Description", &self.comment);

        let reserved_fields = [
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
        for (field, key) in reserved_fields {
            let value = self.reserved.get(key);
            if !value.is_absent() {
                plugin.insert(field.into(), value.to_json());
            }
        }
        if !self.author().is_empty() || !self.email().is_empty() {
            plugin.insert(
                "Authors".into(),
                json!([{ "Name": self.author(), "Email": self.email() }]),
            );
        }

        let mut root = Map::new();
        root.insert("Plugin".into(), Value::Object(plugin));
        for (key, value) in self.custom_properties() {
            root.insert(key.to_string(), value.to_json());
        }
        Value::Object(root)
    }

    fn reserved_str(&self, key: &str) -> &str {
        self.reserved.get(key).as_str().unwrap_or_default()
    }
}

fn emit_display_text(flat: &mut FlatProperties, key: &str, text: &DisplayText) {
    match text {
        DisplayText::Frozen(s) if s.is_empty() => {}
        DisplayText::Frozen(s) => {
            flat.insert(key.to_string(), PropertyValue::String(s.clone()));
        }
        DisplayText::Translatable(table) => {
            if !table.default_text().is_empty() {
                flat.insert(key.to_string(), table.default_text().into());
            }
            for (tag, translated) in table.translations() {
                flat.insert(format!("{key}[{tag}]"), translated.into());
            }
        }
    }
}

fn emit_display_json(object: &mut Map<String, Value>, field: &str, text: &DisplayText) {
    match text {
        DisplayText::Frozen(s) if s.is_empty() => {}
        DisplayText::Frozen(s) => {
            object.insert(field.to_string(), Value::String(s.clone()));
        }
        DisplayText::Translatable(table) => {
            object.insert(field.to_string(), table.default_text().into());
            for (tag, translated) in table.translations() {
                object.insert(format!("{field}[{tag}]"), translated.into());
            }
        }
    }
}

impl PropertyLookup for PluginRecord {
    fn lookup(&self, key: &str) -> Cow<'_, PropertyValue> {
        let value = self.properties.get(key);
        if !value.is_absent() {
            return Cow::Borrowed(value);
        }
        let text = match key {
            keys::NAME => &self.name,
            keys::COMMENT => &self.comment,
            _ => return Cow::Borrowed(value),
        };
        match text.current() {
            resolved if resolved.is_empty() => Cow::Owned(PropertyValue::Absent),
            resolved => Cow::Owned(PropertyValue::String(resolved.into_owned())),
        }
    }
}

/// Structural equality over properties, display text and paths.
impl PartialEq for PluginRecord {
    fn eq(&self, other: &Self) -> bool {
        self.properties == other.properties
            && self.name == other.name
            && self.comment == other.comment
            && self.library_path == other.library_path
            && self.entry_path == other.entry_path
    }
}
