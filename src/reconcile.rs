//! Same-source deduplication and cross-source retention of observations.

use log::{debug, info};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::models::{LogicalKey, ObservationRecord};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub input_records: usize,
    pub output_records: usize,
    pub same_source_duplicates_removed: usize,
    pub cross_source_groups: usize,
    pub cross_source_records_retained: usize,
    pub cross_source_disagreements: usize,
    pub missing_records: usize,
    pub illegible_records: usize,
}

/// Prefers a present count over an absent one, then the larger count.
fn supersedes(candidate: &ObservationRecord, current: &ObservationRecord) -> bool {
    match (candidate.count, current.count) {
        (Some(_), None) => true,
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}

/// Empty or unparseable counts become zero and are flagged missing.
pub fn normalize(mut record: ObservationRecord) -> ObservationRecord {
    if record.count.is_none() {
        record.count = Some(0);
        record.is_missing = true;
    }
    record
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RecordReconciler;

impl RecordReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Groups by logical identity, keeps one record per provenance within each
    /// group and never merges readings from different transcriptions.
    /// Output order follows first appearance.
    pub fn reconcile(&self, records: Vec<ObservationRecord>) -> (Vec<ObservationRecord>, ReconcileStats) {
        let mut stats = ReconcileStats { input_records: records.len(), ..Default::default() };
        let mut group_of: HashMap<LogicalKey, usize> = HashMap::new();
        let mut groups: Vec<Vec<ObservationRecord>> = Vec::new();

        for record in records {
            let next = groups.len();
            let group_idx = *group_of.entry(record.logical_key()).or_insert(next);
            if group_idx == groups.len() {
                groups.push(Vec::new());
            }
            let group = &mut groups[group_idx];
            match group.iter_mut().find(|kept| kept.provenance == record.provenance) {
                Some(kept) => {
                    stats.same_source_duplicates_removed += 1;
                    let illegible = kept.is_illegible || record.is_illegible;
                    if supersedes(&record, kept) {
                        debug!(
                            "Replacing duplicate {} {} from {} ({:?} -> {:?})",
                            record.entity, record.measure.as_str(), record.provenance.source_name, kept.count, record.count
                        );
                        *kept = record;
                    }
                    kept.is_illegible = illegible;
                }
                None => group.push(record),
            }
        }

        let mut output = Vec::with_capacity(groups.iter().map(Vec::len).sum());
        for group in groups {
            let group: Vec<ObservationRecord> = group.into_iter().map(normalize).collect();
            if group.len() > 1 {
                stats.cross_source_groups += 1;
                stats.cross_source_records_retained += group.len();
                let distinct: BTreeSet<Option<i64>> = group.iter().map(|r| r.count).collect();
                if distinct.len() > 1 {
                    stats.cross_source_disagreements += 1;
                }
            }
            output.extend(group);
        }

        stats.output_records = output.len();
        stats.missing_records = output.iter().filter(|r| r.is_missing).count();
        stats.illegible_records = output.iter().filter(|r| r.is_illegible).count();
        info!(
            "Reconciled {} records into {} ({} same-source duplicates removed, {} cross-source groups retained)",
            stats.input_records, stats.output_records, stats.same_source_duplicates_removed, stats.cross_source_groups
        );
        (output, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityRef, MatchConfidence, MeasureKind, PeriodKind, Provenance};

    fn record(source: &str, record_id: &str, count: Option<i64>) -> ObservationRecord {
        ObservationRecord {
            entity: EntityRef::Parish(7),
            measure: MeasureKind::Buried,
            count,
            join_key: "1665080816650815".to_string(),
            year: 1665,
            period_kind: PeriodKind::Weekly,
            is_missing: false,
            is_illegible: false,
            period_match: MatchConfidence::Exact,
            provenance: Provenance { source_name: source.to_string(), source_record_id: record_id.to_string() },
            source_column: "st_olave_buried".to_string(),
        }
    }

    #[test]
    fn same_source_keeps_the_higher_count() {
        let (out, stats) = RecordReconciler::new().reconcile(vec![
            record("laxton_parishes", "L-1", Some(3)),
            record("laxton_parishes", "L-1", Some(5)),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].count, Some(5));
        assert_eq!(stats.same_source_duplicates_removed, 1);
    }

    #[test]
    fn same_source_prefers_a_present_count() {
        let (out, _) = RecordReconciler::new().reconcile(vec![
            record("laxton_parishes", "L-1", None),
            record("laxton_parishes", "L-1", Some(0)),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].count, Some(0));
        assert!(!out[0].is_missing);
    }

    #[test]
    fn cross_source_readings_are_all_retained() {
        let (out, stats) = RecordReconciler::new().reconcile(vec![
            record("laxton_parishes", "L-1", Some(5)),
            record("wellcome_parishes", "W-9", Some(7)),
        ]);
        let counts: Vec<(String, Option<i64>)> = out.iter().map(|r| (r.provenance.source_name.clone(), r.count)).collect();
        assert_eq!(counts, vec![("laxton_parishes".to_string(), Some(5)), ("wellcome_parishes".to_string(), Some(7))]);
        assert_eq!(stats.cross_source_groups, 1);
        assert_eq!(stats.cross_source_records_retained, 2);
        assert_eq!(stats.cross_source_disagreements, 1);
        assert_eq!(stats.same_source_duplicates_removed, 0);
    }

    #[test]
    fn absent_counts_become_missing_zeroes() {
        let mut illegible = record("laxton_parishes", "L-2", None);
        illegible.is_illegible = true;
        let (out, stats) = RecordReconciler::new().reconcile(vec![illegible]);
        assert_eq!(out[0].count, Some(0));
        assert!(out[0].is_missing);
        assert!(out[0].is_illegible);
        assert_eq!(out[0].annotation(), "illegible");
        assert_eq!((stats.missing_records, stats.illegible_records), (1, 1));
    }

    #[test]
    fn output_never_grows() {
        let mut other_week = record("laxton_parishes", "L-1", Some(2));
        other_week.join_key = "1665081516650822".to_string();
        let inputs = vec![
            record("laxton_parishes", "L-1", Some(3)),
            record("laxton_parishes", "L-1", Some(3)),
            record("wellcome_parishes", "W-1", Some(3)),
            other_week,
        ];
        let input_len = inputs.len();
        let (out, stats) = RecordReconciler::new().reconcile(inputs);
        assert!(out.len() <= input_len);
        assert_eq!(out.len(), 3);
        assert_eq!(stats.cross_source_disagreements, 0);

        let distinct = vec![record("laxton_parishes", "L-1", Some(3)), record("laxton_parishes", "L-2", Some(3))];
        let (out, _) = RecordReconciler::new().reconcile(distinct);
        assert_eq!(out.len(), 2);
    }
}
