use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use uuid::Uuid;

use crate::models::MatchConfidence;
use crate::period::ResolutionOutcome;
use crate::reconcile::ReconcileStats;
use crate::validation::ValidationFailure;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackCounts {
    pub end_day_shift: usize,
    pub start_day_shift: usize,
    pub start_month: usize,
    pub best_effort: usize,
}

impl FallbackCounts {
    pub fn record(&mut self, tier: MatchConfidence) {
        match tier {
            MatchConfidence::EndDayShift => self.end_day_shift += 1,
            MatchConfidence::StartDayShift => self.start_day_shift += 1,
            MatchConfidence::StartMonth => self.start_month += 1,
            MatchConfidence::BestEffort => self.best_effort += 1,
            MatchConfidence::Exact => {}
        }
    }

    pub fn total(&self) -> usize {
        self.end_day_shift + self.start_day_shift + self.start_month + self.best_effort
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub source_name: String,
    pub path: String,
    pub reason: String,
}

/// Counters for every non-fatal condition met during a run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct AuditLog {
    pub sources_processed: usize,
    pub sources_skipped: Vec<SkippedSource>,
    pub unmapped_parishes: Vec<String>,
    pub parish_lookups_failed: usize,
    pub fuzzy_parish_matches: usize,
    pub periods_registered: usize,
    pub exact_links: usize,
    pub fallback: FallbackCounts,
    pub unresolved_periods: usize,
    pub records_dropped_unresolved: usize,
    pub unrecognized_months: usize,
    pub malformed_values: usize,
    pub validation_failures: BTreeMap<String, usize>,
    pub records_extracted: usize,
    pub reconciliation: ReconcileStats,
}

impl AuditLog {
    pub fn record_outcome(&mut self, outcome: &ResolutionOutcome) {
        match outcome {
            ResolutionOutcome::Exact(_) => self.exact_links += 1,
            ResolutionOutcome::Registered(_) => self.periods_registered += 1,
            ResolutionOutcome::Fallback { tier, .. } => self.fallback.record(*tier),
            ResolutionOutcome::Unresolved => self.unresolved_periods += 1,
        }
    }

    pub fn record_validation_failure(&mut self, failure: &ValidationFailure) {
        *self.validation_failures.entry(failure.kind_str().to_string()).or_insert(0) += 1;
    }

    pub fn validation_failure_total(&self) -> usize {
        self.validation_failures.values().sum()
    }

    pub fn record_skip(&mut self, source_name: &str, path: &Path, reason: impl ToString) {
        let reason = reason.to_string();
        warn!("Skipping source '{}' ({}): {}", source_name, path.display(), reason);
        self.sources_skipped.push(SkippedSource {
            source_name: source_name.to_string(),
            path: path.display().to_string(),
            reason,
        });
    }

    pub fn log_summary(&self) {
        info!("Sources processed: {}", self.sources_processed);
        if !self.sources_skipped.is_empty() {
            warn!("Sources skipped: {}", self.sources_skipped.len());
            for skipped in self.sources_skipped.iter().take(10) {
                warn!("  - {} ({}): {}", skipped.source_name, skipped.path, skipped.reason);
            }
            if self.sources_skipped.len() > 10 {
                warn!("  ... (and {} more)", self.sources_skipped.len() - 10);
            }
        }
        info!("Unmapped parishes: {}", self.unmapped_parishes.len());
        info!("Parish lookups failed: {} (fuzzy matches: {})", self.parish_lookups_failed, self.fuzzy_parish_matches);
        info!("Periods registered: {}, exact links: {}", self.periods_registered, self.exact_links);
        info!(
            "Fallback period links: {} (end day {}, start day {}, start month {}, best effort {})",
            self.fallback.total(), self.fallback.end_day_shift, self.fallback.start_day_shift,
            self.fallback.start_month, self.fallback.best_effort
        );
        if self.unresolved_periods > 0 {
            warn!("Rows without a period: {} ({} records dropped)", self.unresolved_periods, self.records_dropped_unresolved);
        }
        info!("Unrecognized month names: {}, malformed date values: {}", self.unrecognized_months, self.malformed_values);
        if !self.validation_failures.is_empty() {
            warn!("Rows failing validation: {} {:?}", self.validation_failure_total(), self.validation_failures);
        }
        let r = &self.reconciliation;
        info!("Records extracted: {}, after reconciliation: {}", self.records_extracted, r.output_records);
        info!("Same-source duplicates removed: {}", r.same_source_duplicates_removed);
        info!(
            "Cross-source groups: {} ({} records retained, {} disagreeing)",
            r.cross_source_groups, r.cross_source_records_retained, r.cross_source_disagreements
        );
        info!("Missing values: {}, illegible values: {}", r.missing_records, r.illegible_records);
    }
}

/// The `audit.json` document.
#[derive(Debug, Serialize)]
pub struct AuditReport<'a> {
    pub run_id: String,
    pub generated_at: String,
    pub description: Option<&'a str>,
    pub rows_written: BTreeMap<String, usize>,
    #[serde(flatten)]
    pub audit: &'a AuditLog,
}

impl<'a> AuditReport<'a> {
    pub fn new(description: Option<&'a str>, audit: &'a AuditLog, rows_written: BTreeMap<String, usize>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            description,
            rows_written,
            audit,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Failed to create audit file: {}", path.display()))?;
        serde_json::to_writer_pretty(file, self)
            .with_context(|| format!("Failed to write audit file: {}", path.display()))?;
        info!("Audit written to {} (run {})", path.display(), self.run_id);
        Ok(())
    }
}
