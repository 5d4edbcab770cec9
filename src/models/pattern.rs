use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::IntentCategory;

// ─── On-disk catalog format ───

/// JSON shape of a catalog file: `{ "entries": [ ... ] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub entries: Vec<EntrySpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrySpec {
    pub category: IntentCategory,
    pub priority: i32,
    #[serde(default = "default_strip_punctuation")]
    pub strip_punctuation: bool,
    pub matchers: Vec<MatcherSpec>,
}

fn default_strip_punctuation() -> bool {
    true
}

/// A matcher is either a bare template string or a template with fixed params.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatcherSpec {
    Template(String),
    WithParams {
        template: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
    },
}

impl MatcherSpec {
    pub fn template(&self) -> &str {
        match self {
            MatcherSpec::Template(t) => t,
            MatcherSpec::WithParams { template, .. } => template,
        }
    }

    pub fn params(&self) -> BTreeMap<String, String> {
        match self {
            MatcherSpec::Template(_) => BTreeMap::new(),
            MatcherSpec::WithParams { params, .. } => params.clone(),
        }
    }
}

// ─── Compiled catalog ───

/// Lowercased, whitespace-normalized phrase template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// Case-insensitive substring test.
    Literal(String),
    /// `prefix {slot} suffix`; the slot is whatever falls in between.
    Slotted {
        prefix: String,
        slot: String,
        suffix: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub template: Template,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternEntry {
    pub category: IntentCategory,
    pub priority: i32,
    pub strip_punctuation: bool,
    pub matchers: Vec<Matcher>,
}

/// Immutable table scanned by the interpreter.
///
/// Entries are kept sorted by descending priority; the sort is stable so
/// declaration order breaks ties between equal priorities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternCatalog {
    entries: Vec<PatternEntry>,
}

impl PatternCatalog {
    pub fn new(mut entries: Vec<PatternEntry>) -> Self {
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { entries }
    }

    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
