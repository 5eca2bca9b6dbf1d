//! Turns the cells of one source table into observation records.

use log::{debug, warn};
use std::collections::{HashMap, HashSet};

use crate::audit::AuditLog;
use crate::columns::{plan_columns, subtotal_category, ColumnRole, PARISH_NAME_COLUMN};
use crate::error::SourceError;
use crate::models::{EntityRef, MeasureKind, ObservationRecord, Provenance};
use crate::parish::canonicalizer::{clean_name, is_valid_parish_name};
use crate::parish::{ParishCanonicalizer, ParishRegistry};
use crate::period::{DateFragments, PeriodIndex, TemporalKeyResolver};
use crate::table::{parse_whole_number, SourceTable};
use crate::validation::Validator;

const YEAR_COLUMNS: [&str; 3] = ["year", "end_year", "start_year"];
const TRUTHY: [&str; 7] = ["true", "t", "yes", "y", "1", "1.0", "x"];
const ILLEGIBLE_MARKERS: [&str; 4] = ["illeg", "unclear", "torn", "?"];

pub fn is_truthy(text: &str) -> bool {
    TRUTHY.contains(&text.trim().to_lowercase().as_str())
}

/// A parsed count cell. Negative and non-numeric text yields no count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellValue {
    pub count: Option<i64>,
    pub marked_illegible: bool,
}

pub fn parse_count(raw: Option<&str>) -> CellValue {
    let Some(text) = raw else { return CellValue::default() };
    let lower = text.to_lowercase();
    CellValue {
        count: parse_whole_number(text).filter(|n| *n >= 0),
        marked_illegible: ILLEGIBLE_MARKERS.iter().any(|m| lower.contains(m)),
    }
}

/// Where a count column's entity comes from.
#[derive(Debug, Clone)]
enum EntitySource {
    Fixed(EntityRef),
    ParishNameCell,
}

#[derive(Debug, Clone)]
struct CountColumn {
    column: String,
    entity: EntitySource,
    measure: MeasureKind,
    missing_flag: Option<String>,
    illegible_flag: Option<String>,
}

pub struct Extractor<'a> {
    canonicalizer: &'a ParishCanonicalizer<'a>,
    registry: &'a ParishRegistry,
    resolver: TemporalKeyResolver,
    validator: Validator,
}

impl<'a> Extractor<'a> {
    pub fn new(canonicalizer: &'a ParishCanonicalizer<'a>, registry: &'a ParishRegistry, validator: Validator) -> Self {
        Self { canonicalizer, registry, resolver: TemporalKeyResolver::new(validator), validator }
    }

    fn parish_entity(&self, name: &str, audit: &mut AuditLog, warned: &mut HashSet<String>) -> Option<EntityRef> {
        match self.registry.lookup(name, self.canonicalizer) {
            Some(found) => {
                if found.stage.is_fuzzy() {
                    audit.fuzzy_parish_matches += 1;
                }
                Some(EntityRef::Parish(found.id))
            }
            None => {
                audit.parish_lookups_failed += 1;
                if warned.insert(name.to_string()) {
                    warn!("No registered parish for '{}'", name);
                }
                None
            }
        }
    }

    fn count_columns(&self, table: &SourceTable, audit: &mut AuditLog) -> Vec<CountColumn> {
        let plan = plan_columns(table);
        let mut missing_flags = HashMap::new();
        let mut illegible_flags = HashMap::new();
        for (column, role) in &plan.columns {
            match role {
                ColumnRole::MissingFlag { target } => { missing_flags.insert(target.clone(), column.clone()); }
                ColumnRole::IllegibleFlag { target } => { illegible_flags.insert(target.clone(), column.clone()); }
                _ => {}
            }
        }

        let mut warned = HashSet::new();
        let mut columns = Vec::new();
        for (column, role) in plan.observation_columns() {
            let (entity, measure) = match role {
                ColumnRole::Parish { name, measure } => match self.parish_entity(name, audit, &mut warned) {
                    Some(entity) => (EntitySource::Fixed(entity), *measure),
                    None => continue,
                },
                ColumnRole::Subtotal { category, measure } => (EntitySource::Fixed(EntityRef::Subtotal(category.clone())), *measure),
                ColumnRole::Cause { name } => (EntitySource::Fixed(EntityRef::Cause(name.clone())), MeasureKind::Buried),
                ColumnRole::LongCount { measure } => (EntitySource::ParishNameCell, *measure),
                _ => continue,
            };
            columns.push(CountColumn {
                column: column.to_string(),
                entity,
                measure,
                missing_flag: missing_flags.get(column).cloned(),
                illegible_flag: illegible_flags.get(column).cloned(),
            });
        }
        columns
    }

    fn row_entity(&self, table: &SourceTable, row: usize, audit: &mut AuditLog, warned: &mut HashSet<String>) -> Option<EntityRef> {
        let name = clean_name(table.cell(row, PARISH_NAME_COLUMN)?);
        if is_valid_parish_name(&name) {
            self.parish_entity(&name, audit, warned)
        } else {
            Some(EntityRef::Subtotal(subtotal_category(&name)))
        }
    }

    /// Extracts every observation of `table`, registering or linking periods in
    /// `index` row by row. Structural problems skip the whole table.
    pub fn extract(&self, table: &SourceTable, index: &mut PeriodIndex, audit: &mut AuditLog) -> Result<Vec<ObservationRecord>, SourceError> {
        let source_name = table.source_name.clone();
        if table.row_count() == 0 {
            return Err(SourceError::NoRows { source_name });
        }
        if !YEAR_COLUMNS.iter().any(|c| table.has_column(c)) {
            return Err(SourceError::MissingYearColumn { source_name });
        }
        let columns = self.count_columns(table, audit);
        if columns.is_empty() {
            return Err(SourceError::NoCandidateColumns { source_name });
        }

        let mut records = Vec::new();
        let mut warned = HashSet::new();
        for row in 0..table.row_count() {
            let fragments = match DateFragments::from_row(table, row).and_then(|f| f.validate(&self.validator).map(|_| f)) {
                Ok(f) => f,
                Err(failure) => {
                    debug!("{} row {} excluded: {}", source_name, row + 1, failure);
                    audit.record_validation_failure(&failure);
                    continue;
                }
            };
            audit.malformed_values += fragments.malformed_values as usize;

            let locator = fragments.identifier.clone().unwrap_or_else(|| format!("row-{}", row + 1));
            let derived = self.resolver.derive(&fragments, table.kind, &source_name);
            audit.unrecognized_months += derived.unrecognized_months as usize;
            let derived_kind = derived.period.kind;
            let outcome = self.resolver.resolve(index, derived, table.period_mode, &locator);
            audit.record_outcome(&outcome);
            let (Some(join_key), Some(period_match)) = (outcome.join_key(), outcome.confidence()) else {
                audit.records_dropped_unresolved += columns.len();
                continue;
            };
            let period_kind = index.get(join_key).map_or(derived_kind, |p| p.kind);

            let row_entity = if columns.iter().any(|c| matches!(c.entity, EntitySource::ParishNameCell)) {
                match self.row_entity(table, row, audit, &mut warned) {
                    Some(entity) => Some(entity),
                    None => continue,
                }
            } else {
                None
            };

            for column in &columns {
                let entity = match (&column.entity, &row_entity) {
                    (EntitySource::Fixed(entity), _) => entity.clone(),
                    (EntitySource::ParishNameCell, Some(entity)) => entity.clone(),
                    (EntitySource::ParishNameCell, None) => continue,
                };
                let value = parse_count(table.cell(row, &column.column));
                let flag = |name: &Option<String>| name.as_deref().and_then(|c| table.cell(row, c)).map_or(false, is_truthy);
                records.push(ObservationRecord {
                    entity,
                    measure: column.measure,
                    count: value.count,
                    join_key: join_key.to_string(),
                    year: fragments.year,
                    period_kind,
                    is_missing: flag(&column.missing_flag),
                    is_illegible: flag(&column.illegible_flag) || value.marked_illegible,
                    period_match,
                    provenance: Provenance { source_name: source_name.clone(), source_record_id: locator.clone() },
                    source_column: column.column.clone(),
                });
            }
        }
        audit.records_extracted += records.len();
        Ok(records)
    }
}
