//! Locale handling for translatable metadata keys.
//!
//! The active locale is process-wide state that this crate only reads. An
//! application may install an in-process default with
//! [`set_default_locale`]; otherwise the usual POSIX environment variables
//! are consulted.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::RwLock;

static DEFAULT_LOCALE: RwLock<Option<String>> = RwLock::new(None);

/// Installs an in-process default locale, overriding the environment.
pub fn set_default_locale(tag: &str) {
    let mut guard = DEFAULT_LOCALE.write().unwrap_or_else(|e| e.into_inner());
    *guard = Some(tag.to_string());
}

/// Removes the in-process default so the environment is consulted again.
pub fn clear_default_locale() {
    let mut guard = DEFAULT_LOCALE.write().unwrap_or_else(|e| e.into_inner());
    *guard = None;
}

/// Returns the active locale tag.
///
/// Order: in-process default, `LC_ALL`, `LC_MESSAGES`, `LANG`, then `C`.
pub fn current_locale() -> String {
    if let Some(tag) = DEFAULT_LOCALE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return tag;
    }
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| "C".to_string())
}

/// Normalizes a locale tag to `lang` or `lang_REGION`.
///
/// Encoding and modifier suffixes are dropped, `-` is accepted as separator.
/// Returns `None` for the untranslated `C`/`POSIX` locales.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let base = tag.split(['.', '@']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('-', "_"))
}

/// Translations of one display string, keyed by normalized locale tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranslationTable {
    default: String,
    translations: BTreeMap<String, String>,
}

impl TranslationTable {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            translations: BTreeMap::new(),
        }
    }

    /// Adds a translation. Tags that normalize to the `C` locale are ignored.
    pub fn with_translation(mut self, tag: &str, text: impl Into<String>) -> Self {
        if let Some(tag) = normalize_tag(tag) {
            self.translations.insert(tag, text.into());
        }
        self
    }

    /// The untranslated fallback text.
    pub fn default_text(&self) -> &str {
        &self.default
    }

    pub fn translations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.translations
            .iter()
            .map(|(tag, text)| (tag.as_str(), text.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.translations.is_empty()
    }

    /// Picks the text for `locale`: full tag, then language, then default.
    pub fn resolve(&self, locale: &str) -> &str {
        let Some(tag) = normalize_tag(locale) else {
            return &self.default;
        };
        if let Some(text) = self.translations.get(&tag) {
            return text;
        }
        let language = tag.split('_').next().unwrap_or_default();
        self.translations
            .get(language)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    /// Resolves against [`current_locale`].
    pub fn resolve_current(&self) -> &str {
        self.resolve(&current_locale())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn table() -> TranslationTable {
        TranslationTable::new("NSA Plugin").with_translation("de", "NSA-Modul")
    }

    #[test]
    fn normalizes_tags() {
        assert_eq!(normalize_tag("de_DE.UTF-8"), Some("de_DE".into()));
        assert_eq!(normalize_tag("sr-RS@latin"), Some("sr_RS".into()));
        assert_eq!(normalize_tag("C.UTF-8"), None);
        assert_eq!(normalize_tag("POSIX"), None);
    }

    #[test]
    fn falls_back_from_region_to_language_to_default() {
        let table = table();
        assert_eq!(table.resolve("de_DE.UTF-8"), "NSA-Modul");
        assert_eq!(table.resolve("de"), "NSA-Modul");
        assert_eq!(table.resolve("fr_FR"), "NSA Plugin");
        assert_eq!(table.resolve("C"), "NSA Plugin");
    }

    #[test]
    fn region_specific_entry_wins() {
        let table = table().with_translation("de-AT", "NSA-Modul (AT)");
        assert_eq!(table.resolve("de_AT"), "NSA-Modul (AT)");
        assert_eq!(table.resolve("de_CH"), "NSA-Modul");
    }

    #[test]
    #[serial]
    fn in_process_default_overrides_environment() {
        set_default_locale("de_DE");
        assert_eq!(current_locale(), "de_DE");
        assert_eq!(table().resolve_current(), "NSA-Modul");
        set_default_locale("C");
        assert_eq!(table().resolve_current(), "NSA Plugin");
        clear_default_locale();
    }
}
