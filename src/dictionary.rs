use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use crate::models::{EntityRef, ObservationRecord};

/// Spelling variants in transcribed cause names, applied first match only.
const CAUSE_REPLACEMENTS: [(&str, &str); 6] = [
    ("flox and small pox", "smallpox"),
    ("st anthony s fire", "st. anthony's fire"),
    ("kings evil", "king's evil"),
    ("still born", "stillborn"),
    ("swine pox", "swine-pox"),
    ("french pox", "syphilis"),
];

pub fn normalize_cause_name(name: &str) -> String {
    let normalized = name.to_lowercase().replace('_', " ").split_whitespace().collect::<Vec<_>>().join(" ");
    match CAUSE_REPLACEMENTS.iter().find(|(from, _)| normalized.contains(from)) {
        Some((from, to)) => normalized.replacen(from, to, 1),
        None => normalized,
    }
}

#[derive(Deserialize, Debug)]
struct DictionaryRow {
    #[serde(alias = "Cause")]
    cause: Option<String>,
    #[serde(alias = "Definition")]
    definition: Option<String>,
    #[serde(alias = "Source")]
    source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CauseDefinition {
    pub definition: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CauseDictionary {
    entries: HashMap<String, CauseDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CauseRow {
    pub cause: String,
    pub definition: Option<String>,
    pub definition_source: Option<String>,
}

impl CauseDictionary {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open cause dictionary: {}", path.display()))?;
        let dictionary = Self::from_reader(file)
            .with_context(|| format!("Failed to parse cause dictionary: {}", path.display()))?;
        info!("Loaded {} cause definitions from {}", dictionary.len(), path.display());
        Ok(dictionary)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
        let mut entries = HashMap::new();
        for (line_num, row) in csv_reader.deserialize::<DictionaryRow>().enumerate() {
            let row = match row {
                Ok(r) => r,
                Err(e) => { warn!("Skipping dictionary row {}: {}", line_num + 2, e); continue; }
            };
            let Some(cause) = row.cause.filter(|c| !c.is_empty()) else { continue };
            let Some(definition) = row.definition.filter(|d| !d.is_empty()) else { continue };
            entries.entry(normalize_cause_name(&cause)).or_insert(CauseDefinition {
                definition,
                source: row.source.filter(|s| !s.is_empty()),
            });
        }
        Ok(Self { entries })
    }

    pub fn lookup(&self, cause: &str) -> Option<&CauseDefinition> {
        self.entries.get(&normalize_cause_name(cause))
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// One row per distinct cause among `records`, sorted by name.
    pub fn cause_rows(&self, records: &[ObservationRecord]) -> Vec<CauseRow> {
        let causes: BTreeSet<&str> = records.iter()
            .filter_map(|r| match &r.entity {
                EntityRef::Cause(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        causes.into_iter()
            .map(|cause| {
                let definition = self.lookup(cause);
                CauseRow {
                    cause: cause.to_string(),
                    definition: definition.map(|d| d.definition.clone()),
                    definition_source: definition.and_then(|d| d.source.clone()),
                }
            })
            .collect()
    }
}
