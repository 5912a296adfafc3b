// # Plugin Naming
//
// Configuration keys are free-form. Before lookup they are reduced to an
// identifier (alphanumerics and `_` only) and then mapped two ways:
//
// - module path: lower_snake_case (`FundaListing` -> `funda_listing`)
// - type name:   UpperCamelCase   (`funda_listing` -> `FundaListing`)
//
// The module path is the registry key; the type name is the identity used for
// the seen store, logs and notification text.

use crate::error::{Error, Result};
use std::fmt;

/// A normalized plugin name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginName {
    raw: String,
    module_path: String,
    type_name: String,
}

impl PluginName {
    /// Normalize a configuration key
    ///
    /// Fails with a configuration error when nothing is left after stripping.
    pub fn parse(raw: &str) -> Result<Self> {
        let ident = strip_identifier(raw);
        if ident.is_empty() {
            return Err(Error::config(format!(
                "Plugin name '{}' contains no usable characters",
                raw
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            module_path: to_snake_case(&ident),
            type_name: to_upper_camel_case(&ident),
        })
    }

    /// The key as written in the configuration
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// lower_snake_case lookup key
    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    /// UpperCamelCase identity
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Whether a configuration key refers to this plugin
    pub fn matches(&self, key: &str) -> bool {
        PluginName::parse(key)
            .map(|other| other.module_path == self.module_path)
            .unwrap_or(false)
    }
}

impl fmt::Display for PluginName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name)
    }
}

fn strip_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// `FundaListing` -> `funda_listing`, `HTMLParser` -> `html_parser`
fn to_snake_case(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();

            let after_lower = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            let ends_acronym =
                prev.is_ascii_uppercase() && next.is_some_and(|n| n.is_ascii_lowercase());

            if after_lower || ends_acronym {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }

    out
}

/// `funda_listing` -> `FundaListing`, `mysource1` -> `Mysource1`
fn to_upper_camel_case(ident: &str) -> String {
    let chars: Vec<char> = ident.chars().collect();
    let mut out = String::with_capacity(ident.len());
    let mut i = 0;

    while i < chars.len() {
        if i == 0 {
            out.extend(chars[0].to_uppercase());
            i += 1;
        } else if chars[i] == '_' && i + 1 < chars.len() {
            out.extend(chars[i + 1].to_uppercase());
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}
