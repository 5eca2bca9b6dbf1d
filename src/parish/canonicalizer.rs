use log::debug;

use crate::authority::{AuthorityEntry, AuthorityMapping};

/// Outcome of canonicalising one raw parish fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParishResolution {
    pub is_valid: bool,
    pub cleaned_name: String,
    pub canonical_name: String,
    pub subunit: Option<String>,
    /// False when the authority had no entry and the name canonicalised to itself.
    pub mapped: bool,
}

/// Phrases that label aggregate columns rather than name a parish.
const AGGREGATE_PHRASES: [&str; 12] = [
    "demolished parishes",
    "parishes clear of",
    "parishes infected with",
    "parishes within the walls",
    "parishes without the walls",
    "out-parishes",
    "out parishes",
    "christened in the",
    "buried in the",
    "plague in the",
    "in the parishes",
    "parishes infected",
];

/// Matched anywhere in a name, so "Subtotal" and the period spelling "Totall" are caught too.
const AGGREGATE_FRAGMENTS: [&str; 2] = ["total", "sum"];

type Stage = for<'a> fn(&'a AuthorityMapping, &str) -> Option<&'a AuthorityEntry>;

fn exact_stage<'a>(authority: &'a AuthorityMapping, name: &str) -> Option<&'a AuthorityEntry> {
    authority.lookup_exact(name)
}

fn case_insensitive_stage<'a>(authority: &'a AuthorityMapping, name: &str) -> Option<&'a AuthorityEntry> {
    authority.lookup_case_insensitive(name)
}

const RESOLUTION_STAGES: [(&str, Stage); 2] = [
    ("exact", exact_stage),
    ("case_insensitive", case_insensitive_stage),
];

/// Collapses underscores and whitespace runs into single spaces and trims.
pub fn clean_name(raw: &str) -> String {
    raw.replace('_', " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_word(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut capitalize = true;
    for c in word.chars() {
        if capitalize && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            capitalize = false;
        } else {
            out.extend(c.to_lowercase());
        }
        if c == '-' {
            capitalize = true;
        }
    }
    out
}

/// Title-cases each word. `st`/`s` abbreviate "Saint" and always render as `St`/`S`.
pub fn standardize_case(name: &str) -> String {
    clean_name(name)
        .split(' ')
        .map(|word| match word.to_lowercase().as_str() {
            "st" | "st." => "St".to_string(),
            "s" | "s." => "S".to_string(),
            _ => title_word(word),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_valid_parish_name(name: &str) -> bool {
    let lower = clean_name(name).to_lowercase();
    if lower.is_empty() || !lower.chars().any(char::is_alphabetic) {
        return false;
    }
    if AGGREGATE_PHRASES.iter().any(|p| lower.contains(p)) {
        return false;
    }
    if AGGREGATE_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return false;
    }
    !(lower.starts_with("in the ") || lower.starts_with("parishes "))
}

pub struct ParishCanonicalizer<'a> {
    authority: &'a AuthorityMapping,
}

impl<'a> ParishCanonicalizer<'a> {
    pub fn new(authority: &'a AuthorityMapping) -> Self {
        Self { authority }
    }

    pub fn canonicalize(&self, raw: &str) -> ParishResolution {
        let cleaned_name = clean_name(raw);
        let is_valid = is_valid_parish_name(&cleaned_name);
        for (stage_name, stage) in RESOLUTION_STAGES.iter() {
            if let Some(entry) = stage(self.authority, &cleaned_name) {
                debug!("Parish '{}' resolved to '{}' by {} match", cleaned_name, entry.canonical_name, stage_name);
                return ParishResolution {
                    is_valid,
                    cleaned_name,
                    canonical_name: entry.canonical_name.clone(),
                    subunit: entry.subunit.clone(),
                    mapped: true,
                };
            }
        }
        ParishResolution {
            is_valid,
            canonical_name: standardize_case(&cleaned_name),
            cleaned_name,
            subunit: None,
            mapped: false,
        }
    }
}
