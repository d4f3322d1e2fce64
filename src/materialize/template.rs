// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Template placeholder substitution.
//!
//! Templates are mostly shell scripts and daemon configuration, which are
//! full of `$VAR`, `${VAR}`, and `${#array[@]}` syntax that must survive
//! rendering untouched. So hostprep placeholders are namespaced:
//! `${hostprep:key}`. Nothing else is ever substituted.

use regex::{Captures, Regex};
use std::{collections::BTreeMap, sync::OnceLock};

const PLACEHOLDER_RE: &str = r"\$\{hostprep:([a-zA-Z0-9\._\-]+)\}";

fn placeholder_re() -> &'static Regex {
    static RE_ONCE: OnceLock<Regex> = OnceLock::new();
    RE_ONCE.get_or_init(|| Regex::new(PLACEHOLDER_RE).unwrap())
}

/// Substitution values for template placeholders.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Substitutions(BTreeMap<String, String>);

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add substitution, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for Substitutions
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// List placeholder keys used by template, in order of appearance.
pub fn placeholders(content: &str) -> Vec<&str> {
    placeholder_re()
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).map(|key| key.as_str()))
        .collect()
}

/// Substitute every placeholder in template.
///
/// # Errors
///
/// - Return [`TemplateError::MissingKey`] if a placeholder has no
///   substitution. Nothing is rendered in that case.
pub fn render(content: &str, substitutions: &Substitutions) -> Result<String> {
    // INVARIANT: Check all keys before rendering anything.
    if let Some(missing) = placeholders(content)
        .into_iter()
        .find(|key| substitutions.get(key).is_none())
    {
        return Err(TemplateError::MissingKey(missing.to_string()));
    }

    let rendered = placeholder_re().replace_all(content, |caps: &Captures| {
        substitutions
            .get(&caps[1])
            .map(ToString::to_string)
            .unwrap_or_default()
    });

    Ok(rendered.into_owned())
}

/// Template rendering error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// Placeholder has no substitution value.
    #[error("template placeholder ${{hostprep:{0}}} has no substitution")]
    MissingKey(String),
}

/// Friendly result alias :3
pub type Result<T, E = TemplateError> = std::result::Result<T, E>;
