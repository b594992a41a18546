//! Resolved translation bundle for one scope.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Content of one scope in one locale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    scope: String,
    entries: BTreeMap<String, String>,
}

impl Bundle {
    pub(crate) fn new(scope: impl Into<String>, entries: BTreeMap<String, String>) -> Self {
        Self {
            scope: scope.into(),
            entries,
        }
    }

    /// A bundle with no entries; every lookup yields a placeholder.
    pub fn empty(scope: impl Into<String>) -> Self {
        Self::new(scope, BTreeMap::new())
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Content for `key`, or a `scope.key` placeholder.
    pub fn get(&self, key: &str) -> Cow<'_, str> {
        match self.entries.get(key) {
            Some(content) => Cow::Borrowed(content.as_str()),
            None => Cow::Owned(format!("{}.{}", self.scope, key)),
        }
    }

    /// Content for `key` with each `{}` replaced by the next argument.
    pub fn format(&self, key: &str, args: &[&dyn Display]) -> String {
        fill(&self.get(key), args)
    }

    /// Sub-bundle of the entries below `prefix` (`embed` -> `embed.title`).
    ///
    /// `None` when no entry lives below the prefix.
    pub fn nested(&self, prefix: &str) -> Option<Bundle> {
        let lead = format!("{prefix}.");
        let entries: BTreeMap<String, String> = self
            .entries
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&lead)
                    .map(|rest| (rest.to_string(), value.clone()))
            })
            .collect();

        if entries.is_empty() {
            None
        } else {
            Some(Bundle::new(format!("{}.{}", self.scope, prefix), entries))
        }
    }
}

/// Replace successive `{}` markers in `template` with `args`.
///
/// Surplus markers are left untouched; surplus arguments are ignored.
pub(crate) fn fill(template: &str, args: &[&dyn Display]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;

    while let Some(index) = rest.find("{}") {
        out.push_str(&rest[..index]);
        match args.next() {
            Some(arg) => out.push_str(&arg.to_string()),
            None => out.push_str("{}"),
        }
        rest = &rest[index + 2..];
    }
    out.push_str(rest);
    out
}
