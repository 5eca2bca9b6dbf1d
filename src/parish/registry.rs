use dashmap::DashSet;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

use crate::columns::{parish_name_candidates, plan_columns};
use crate::models::{Parish, ParishId};
use crate::parish::canonicalizer::{clean_name, is_valid_parish_name, ParishCanonicalizer};
use crate::table::SourceTable;

/// Which lookup stage attached an extracted name to a registered parish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStage {
    Exact,
    Canonical,
    Variation,
    Authority,
    Containment,
}

impl LookupStage {
    pub fn is_fuzzy(&self) -> bool {
        matches!(self, LookupStage::Containment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParishMatch {
    pub id: ParishId,
    pub stage: LookupStage,
}

/// Shorter names than this never take part in containment matching.
const MIN_CONTAINMENT_LEN: usize = 5;

/// An extracted name as cleaned, plus its lowercase form.
struct Candidate {
    cleaned: String,
    folded: String,
}

type LookupFn = fn(&ParishRegistry, &ParishCanonicalizer, &Candidate) -> Option<ParishId>;

fn by_raw_name(registry: &ParishRegistry, _: &ParishCanonicalizer, candidate: &Candidate) -> Option<ParishId> {
    registry.by_raw.get(&candidate.cleaned)
        .or_else(|| registry.by_raw_folded.get(&candidate.folded))
        .map(|&idx| registry.parishes[idx].id)
}

fn by_canonical_name(registry: &ParishRegistry, _: &ParishCanonicalizer, candidate: &Candidate) -> Option<ParishId> {
    registry.by_mapped.get(&candidate.folded).copied()
}

fn by_variation(registry: &ParishRegistry, _: &ParishCanonicalizer, candidate: &Candidate) -> Option<ParishId> {
    spelling_variations(&candidate.folded).iter().find_map(|variant| {
        registry.by_raw_folded.get(variant)
            .map(|&idx| registry.parishes[idx].id)
            .or_else(|| registry.by_mapped.get(variant).copied())
    })
}

fn by_authority(registry: &ParishRegistry, canonicalizer: &ParishCanonicalizer, candidate: &Candidate) -> Option<ParishId> {
    let resolution = canonicalizer.canonicalize(&candidate.cleaned);
    if !resolution.mapped {
        return None;
    }
    registry.by_mapped.get(&resolution.canonical_name.to_lowercase()).copied()
}

fn by_containment(registry: &ParishRegistry, _: &ParishCanonicalizer, candidate: &Candidate) -> Option<ParishId> {
    let name = candidate.folded.as_str();
    if name.len() < MIN_CONTAINMENT_LEN {
        return None;
    }
    registry.search_keys.iter()
        .filter(|(key, _)| key.len() >= MIN_CONTAINMENT_LEN)
        .find(|(key, _)| key.contains(name) || name.contains(key.as_str()))
        .map(|&(_, id)| id)
}

const LOOKUP_STAGES: [(LookupStage, LookupFn); 5] = [
    (LookupStage::Exact, by_raw_name),
    (LookupStage::Canonical, by_canonical_name),
    (LookupStage::Variation, by_variation),
    (LookupStage::Authority, by_authority),
    (LookupStage::Containment, by_containment),
];

/// Common respellings of a lowercase parish name.
pub fn spelling_variations(name: &str) -> Vec<String> {
    let mut variants = Vec::new();
    let mut push = |v: String| {
        if v != name && !variants.contains(&v) {
            variants.push(v);
        }
    };
    if let Some(rest) = name.strip_prefix("st ") {
        push(format!("saint {}", rest));
    }
    if let Some(rest) = name.strip_prefix("saint ") {
        push(format!("st {}", rest));
    }
    if let Some(rest) = name.strip_prefix("alhallows ") {
        push(format!("all hallows {}", rest));
        push(format!("allhallows {}", rest));
    }
    if let Some(rest) = name.strip_prefix("all hallows ") {
        push(format!("alhallows {}", rest));
        push(format!("allhallows {}", rest));
    }
    for suffix in [" church", " parish"] {
        if let Some(rest) = name.strip_suffix(suffix) {
            push(rest.to_string());
        }
    }
    variants
}

/// The deduplicated parish set with stable ids.
///
/// Ids are assigned in sorted raw-name order. Spellings the authority maps to
/// one canonical parish share an id; an unmapped spelling always gets its own,
/// even when it differs from another only in case.
#[derive(Debug, Default)]
pub struct ParishRegistry {
    parishes: Vec<Parish>,
    by_raw: HashMap<String, usize>,
    by_raw_folded: HashMap<String, usize>,
    by_mapped: HashMap<String, ParishId>,
    search_keys: Vec<(String, ParishId)>,
    unmapped: Vec<String>,
}

impl ParishRegistry {
    pub fn build<I>(raw_names: I, canonicalizer: &ParishCanonicalizer) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let names: BTreeSet<String> = raw_names.into_iter()
            .map(|n| clean_name(&n))
            .filter(|n| is_valid_parish_name(n))
            .collect();

        let mut registry = Self::default();
        let mut next_id: ParishId = 1;
        let mut fresh_id = || {
            let id = next_id;
            next_id += 1;
            id
        };
        for raw_name in names {
            let resolution = canonicalizer.canonicalize(&raw_name);
            let id = if resolution.mapped {
                *registry.by_mapped.entry(resolution.canonical_name.to_lowercase()).or_insert_with(&mut fresh_id)
            } else {
                warn!("Unmapped parish name '{}' kept as its own canonical name", raw_name);
                registry.unmapped.push(raw_name.clone());
                fresh_id()
            };
            let idx = registry.parishes.len();
            registry.by_raw.insert(raw_name.clone(), idx);
            registry.by_raw_folded.entry(raw_name.to_lowercase()).or_insert(idx);
            registry.parishes.push(Parish {
                id,
                raw_name,
                canonical_name: resolution.canonical_name,
                subunit: resolution.subunit,
            });
        }

        let mut search_keys: Vec<(String, ParishId)> = registry.by_raw_folded.iter()
            .map(|(key, &idx)| (key.clone(), registry.parishes[idx].id))
            .chain(registry.by_mapped.iter().map(|(key, &id)| (key.clone(), id)))
            .collect();
        search_keys.sort();
        search_keys.dedup();
        registry.search_keys = search_keys;

        info!(
            "Parish registry holds {} spellings of {} canonical parishes ({} unmapped)",
            registry.parishes.len(), registry.canonical_count(), registry.unmapped.len()
        );
        registry
    }

    /// Collects candidate names from every table in parallel, then builds the registry.
    pub fn prescan(tables: &[SourceTable], canonicalizer: &ParishCanonicalizer) -> Self {
        let seen: DashSet<String> = DashSet::new();
        tables.par_iter().for_each(|table| {
            let plan = plan_columns(table);
            let names = parish_name_candidates(table, &plan);
            debug!("Pre-scan found {} parish name candidates in '{}'", names.len(), table.source_name);
            for name in names {
                seen.insert(name);
            }
        });
        Self::build(seen.into_iter(), canonicalizer)
    }

    pub fn parishes(&self) -> &[Parish] { &self.parishes }
    pub fn len(&self) -> usize { self.parishes.len() }
    pub fn is_empty(&self) -> bool { self.parishes.is_empty() }
    pub fn canonical_count(&self) -> usize { self.by_mapped.len() + self.unmapped.len() }
    pub fn unmapped_names(&self) -> &[String] { &self.unmapped }

    pub fn lookup(&self, name: &str, canonicalizer: &ParishCanonicalizer) -> Option<ParishMatch> {
        let cleaned = clean_name(name);
        if cleaned.is_empty() {
            return None;
        }
        let candidate = Candidate { folded: cleaned.to_lowercase(), cleaned };
        LOOKUP_STAGES.iter().find_map(|(stage, lookup)| {
            lookup(self, canonicalizer, &candidate).map(|id| ParishMatch { id, stage: *stage })
        })
    }
}
