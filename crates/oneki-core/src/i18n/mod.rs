//! Locale catalogs and the translation resolver.
//!
//! A catalog maps `(scope, key)` to content for one locale. Catalogs are TOML
//! documents whose top-level tables are scopes; nested tables are flattened
//! into dotted keys (`embed.title`). Every locale is checked against the
//! default locale when loaded, so a missing key is reported at startup rather
//! than at render time.
//!
//! Resolution fails soft:
//! - an unknown locale falls back to the default locale
//! - an unknown scope is an assertion failure in strict mode (the default for
//!   debug builds) and an empty bundle otherwise
//! - an unknown key resolves to a `scope.key` placeholder

mod bundle;

pub use bundle::Bundle;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default locale used when none is configured.
pub const DEFAULT_LOCALE: &str = "en";

const BUILTIN_CATALOGS: &[(&str, &str)] = &[
    ("en", include_str!("../../locales/en.toml")),
    ("es", include_str!("../../locales/es.toml")),
];

/// Flattened catalog of one locale: scope -> key -> content.
type Catalog = BTreeMap<String, BTreeMap<String, String>>;

/// Loaded translations for every known locale.
#[derive(Debug, Clone)]
pub struct Translations {
    default_locale: String,
    catalogs: HashMap<String, Catalog>,
    strict: bool,
}

impl Translations {
    /// Load the catalogs compiled into the crate.
    pub fn builtin() -> Result<Self> {
        Self::builtin_with_default(DEFAULT_LOCALE)
    }

    /// Load the compiled-in catalogs with another default locale.
    pub fn builtin_with_default(default_locale: &str) -> Result<Self> {
        Self::from_sources(default_locale, BUILTIN_CATALOGS.iter().copied())
    }

    /// Build translations from `(locale, toml source)` pairs.
    pub fn from_sources<'a, I>(default_locale: &str, sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut catalogs = HashMap::new();
        for (locale, source) in sources {
            let catalog = parse_catalog(locale, source)?;
            merge_catalog(&mut catalogs, normalize_locale(locale), catalog);
        }

        let translations = Self {
            default_locale: normalize_locale(default_locale),
            catalogs,
            strict: cfg!(debug_assertions),
        };
        translations.validate()?;
        Ok(translations)
    }

    /// Merge every `<locale>.toml` of a directory over the loaded catalogs.
    pub fn load_dir(mut self, dir: &Path) -> Result<Self> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            let Some(locale) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let source = std::fs::read_to_string(&path)?;
            let catalog = parse_catalog(locale, &source)?;
            debug!(locale = %locale, path = %path.display(), "Loaded locale catalog");
            merge_catalog(&mut self.catalogs, normalize_locale(locale), catalog);
        }
        self.validate()?;
        Ok(self)
    }

    /// Toggle assertion failures for unknown scopes.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    /// Locales with a loaded catalog, sorted.
    pub fn locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        locales.sort_unstable();
        locales
    }

    /// Resolve the bundle of a scope for a locale.
    pub fn bundle(&self, locale: &str, scope: &str) -> Bundle {
        let catalog = self.catalog_for(locale);
        match catalog.and_then(|catalog| catalog.get(scope)) {
            Some(entries) => Bundle::new(scope, entries.clone()),
            None => {
                if self.strict {
                    panic!("unknown translation scope `{scope}`");
                }
                warn!(scope = %scope, locale = %locale, "Unknown translation scope");
                Bundle::empty(scope)
            }
        }
    }

    /// Resolve a single key.
    pub fn resolve(&self, locale: &str, scope: &str, key: &str) -> String {
        self.bundle(locale, scope).get(key).to_string()
    }

    fn catalog_for(&self, locale: &str) -> Option<&Catalog> {
        self.catalogs
            .get(&normalize_locale(locale))
            .or_else(|| self.catalogs.get(&self.default_locale))
    }

    /// Every locale must provide every key of the default locale.
    fn validate(&self) -> Result<()> {
        let Some(reference) = self.catalogs.get(&self.default_locale) else {
            return Err(Error::Translation(format!(
                "no catalog for default locale `{}`",
                self.default_locale
            )));
        };

        let mut missing = Vec::new();
        for (locale, catalog) in &self.catalogs {
            for (scope, keys) in reference {
                for key in keys.keys() {
                    let present = catalog
                        .get(scope)
                        .is_some_and(|entries| entries.contains_key(key));
                    if !present {
                        missing.push(format!("{locale}:{scope}.{key}"));
                    }
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            missing.sort();
            Err(Error::Translation(format!(
                "missing translations: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Reduce a transport locale (`es-ES`, `en_US`) to its language code.
pub fn normalize_locale(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or(locale)
        .trim()
        .to_ascii_lowercase()
}

fn parse_catalog(locale: &str, source: &str) -> Result<Catalog> {
    let table: toml::Table = source
        .parse()
        .map_err(|e| Error::Translation(format!("invalid catalog `{locale}`: {e}")))?;

    let mut catalog = Catalog::new();
    for (scope, value) in table {
        let toml::Value::Table(entries) = value else {
            return Err(Error::Translation(format!(
                "catalog `{locale}`: scope `{scope}` is not a table"
            )));
        };
        let mut flat = BTreeMap::new();
        flatten(locale, &scope, "", &entries, &mut flat)?;
        catalog.insert(scope, flat);
    }
    Ok(catalog)
}

fn flatten(
    locale: &str,
    scope: &str,
    prefix: &str,
    table: &toml::Table,
    out: &mut BTreeMap<String, String>,
) -> Result<()> {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::String(content) => {
                out.insert(path, content.clone());
            }
            toml::Value::Table(nested) => flatten(locale, scope, &path, nested, out)?,
            toml::Value::Array(items) => {
                // Arrays become indexed keys: fields.0, fields.1, ...
                for (index, item) in items.iter().enumerate() {
                    let toml::Value::String(content) = item else {
                        return Err(Error::Translation(format!(
                            "catalog `{locale}`: {scope}.{path} must contain strings"
                        )));
                    };
                    out.insert(format!("{path}.{index}"), content.clone());
                }
            }
            _ => {
                return Err(Error::Translation(format!(
                    "catalog `{locale}`: {scope}.{path} must be a string"
                )));
            }
        }
    }
    Ok(())
}

fn merge_catalog(catalogs: &mut HashMap<String, Catalog>, locale: String, catalog: Catalog) {
    let target = catalogs.entry(locale).or_default();
    for (scope, entries) in catalog {
        target.entry(scope).or_default().extend(entries);
    }
}
