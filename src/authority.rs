use anyhow::{Context, Result};
use log::{info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
struct AuthorityRow {
    #[serde(alias = "Canonical DBN Name", alias = "canonical")]
    canonical_name: Option<String>,
    #[serde(alias = "Omeka Parish Name", alias = "parish_name")]
    primary_spelling: Option<String>,
    #[serde(alias = "Variant Names", alias = "variants")]
    variant_spellings: Option<String>,
    #[serde(alias = "Bills Subunit", alias = "bills_subunit")]
    subunit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityEntry {
    pub canonical_name: String,
    pub subunit: Option<String>,
}

/// Read-only spelling → canonical parish lookup.
///
/// Case-insensitive lookups resolve to the first spelling registered under that
/// lowercase form, so file order decides between conflicting variants.
#[derive(Debug, Clone, Default)]
pub struct AuthorityMapping {
    exact: HashMap<String, AuthorityEntry>,
    folded: HashMap<String, AuthorityEntry>,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl AuthorityMapping {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open parish authority file: {}", path.display()))?;
        let mapping = Self::from_reader(file)
            .with_context(|| format!("Failed to parse parish authority file: {}", path.display()))?;
        info!("Loaded {} parish name mappings from authority file {}", mapping.len(), path.display());
        Ok(mapping)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).trim(csv::Trim::All).from_reader(reader);
        let mut mapping = Self::default();
        for (line_num, row) in csv_reader.deserialize::<AuthorityRow>().enumerate() {
            let row = match row {
                Ok(r) => r,
                Err(e) => { warn!("Skipping authority row {}: {}", line_num + 2, e); continue; }
            };
            let Some(canonical) = non_empty(&row.canonical_name) else { continue };
            let entry = AuthorityEntry { canonical_name: canonical.clone(), subunit: non_empty(&row.subunit) };
            if let Some(primary) = non_empty(&row.primary_spelling) {
                mapping.insert(&primary, entry.clone());
            }
            if let Some(variants) = non_empty(&row.variant_spellings) {
                for variant in variants.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                    mapping.insert(variant, entry.clone());
                }
            }
            // canonical names resolve to themselves unless a row says otherwise
            if !mapping.exact.contains_key(&canonical) {
                mapping.insert(&canonical, entry);
            }
        }
        Ok(mapping)
    }

    pub fn insert(&mut self, spelling: &str, entry: AuthorityEntry) {
        self.folded.entry(spelling.to_lowercase()).or_insert_with(|| entry.clone());
        self.exact.insert(spelling.to_string(), entry);
    }

    pub fn lookup_exact(&self, spelling: &str) -> Option<&AuthorityEntry> {
        self.exact.get(spelling)
    }

    pub fn lookup_case_insensitive(&self, spelling: &str) -> Option<&AuthorityEntry> {
        self.folded.get(&spelling.to_lowercase())
    }

    pub fn len(&self) -> usize { self.exact.len() }
    pub fn is_empty(&self) -> bool { self.exact.is_empty() }
}
