//! Name canonicalization and alias resolution
//!
//! Respondents type their names freely ("  john   SMITH "), so every name is
//! canonicalized before it is compared or looked up. The alias sheet maps a
//! canonical name to whatever the organisers want shown instead.

use std::collections::HashMap;

/// Trim, collapse whitespace runs, and capitalize each word
///
/// Each word gets an upper-case first character and a lower-case remainder.
/// Idempotent: `canonicalize(&canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(name: &str) -> String {
    name.split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    // Multi-char expansions ("ß" -> "SS") keep only their head upper-cased
    let mut upper = first.to_uppercase();
    let head = upper.next().unwrap_or(first);
    std::iter::once(head)
        .chain(upper.flat_map(char::to_lowercase))
        .chain(chars.flat_map(char::to_lowercase))
        .collect()
}

/// Canonical name → replacement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    aliases: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from alias sheet rows `[name, replacement, ...]`
    ///
    /// Rows with an empty first cell or no replacement cell are skipped.
    /// Later rows win for the same canonical key.
    pub fn from_rows<R: AsRef<[String]>>(rows: &[R]) -> Self {
        let mut table = Self::new();
        for row in rows {
            let row = row.as_ref();
            let Some(key) = row.first().filter(|k| !k.is_empty()) else {
                continue;
            };
            let Some(replacement) = row.get(1) else {
                continue;
            };
            table.insert(key, replacement.clone());
        }
        table
    }

    /// Insert under the canonical form of `name`
    pub fn insert(&mut self, name: &str, replacement: String) {
        self.aliases.insert(canonicalize(name), replacement);
    }

    /// Replacement for `name`, or its canonical form when no alias exists
    pub fn resolve(&self, name: &str) -> String {
        let canonical = canonicalize(name);
        match self.aliases.get(&canonical) {
            Some(replacement) => replacement.clone(),
            None => canonical,
        }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Free-function form of [`AliasTable::from_rows`]
pub fn build_alias_table<R: AsRef<[String]>>(rows: &[R]) -> AliasTable {
    AliasTable::from_rows(rows)
}

/// Free-function form of [`AliasTable::resolve`]
pub fn resolve(name: &str, aliases: &AliasTable) -> String {
    aliases.resolve(name)
}
