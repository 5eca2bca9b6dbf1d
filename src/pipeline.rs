//! The batch run: load, pre-scan parishes, extract source by source,
//! reconcile, write.

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::audit::{AuditLog, AuditReport};
use crate::authority::AuthorityMapping;
use crate::config::{detect_source_name, PeriodMode, RunConfig, SourceKind};
use crate::dictionary::CauseDictionary;
use crate::error::SourceError;
use crate::extract::Extractor;
use crate::output::{spawn_csv_writer, OutputBatch};
use crate::parish::{ParishCanonicalizer, ParishRegistry};
use crate::period::PeriodIndex;
use crate::reconcile::RecordReconciler;
use crate::table::{find_source_files, load_table, SourceTable};
use crate::validation::Validator;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    pub batch_size: usize,
    pub channel_capacity: usize,
    pub show_progress: bool,
}

impl PipelineOptions {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir, batch_size: 10_000, channel_capacity: 16, show_progress: false }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub files_found: usize,
    pub tables_loaded: usize,
    pub parishes: usize,
    pub periods: usize,
    pub years: usize,
    pub observations: usize,
    pub rows_written: BTreeMap<String, usize>,
    pub audit: AuditLog,
}

#[derive(Debug, Clone)]
struct LoadJob {
    path: PathBuf,
    source_name: String,
    kind: SourceKind,
    period_mode: PeriodMode,
}

fn load_jobs(config: &RunConfig) -> Result<Vec<LoadJob>> {
    let mut jobs = Vec::new();
    for (i, source) in config.sources.iter().enumerate() {
        info!("Source {} ({}): {}", i + 1, source.description.as_deref().unwrap_or("No description"), source.path);
        for path in find_source_files(&source.path)? {
            let source_name = source.source_name.clone().unwrap_or_else(|| detect_source_name(&path));
            let kind = source.kind.unwrap_or_else(|| SourceKind::infer(&source_name));
            jobs.push(LoadJob { path, source_name, kind, period_mode: source.period_mode });
        }
    }
    Ok(jobs)
}

/// Loads every file in parallel; results keep configuration order.
fn load_tables(jobs: &[LoadJob], audit: &mut AuditLog) -> Vec<SourceTable> {
    let results: Vec<Result<SourceTable, (LoadJob, anyhow::Error)>> = jobs.par_iter()
        .map(|job| load_table(&job.path, &job.source_name, job.kind, job.period_mode).map_err(|e| (job.clone(), e)))
        .collect();
    let mut tables = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(table) => tables.push(table),
            Err((job, e)) => {
                error!("Error loading file {}: {:#}", job.path.display(), e);
                let reason = SourceError::Load { path: job.path.clone(), reason: format!("{:#}", e) };
                audit.record_skip(&job.source_name, &job.path, reason);
            }
        }
    }
    tables
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec}) {msg}")
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, elapsed.subsec_millis())
    }
}

pub fn run(config: &RunConfig, options: &PipelineOptions) -> Result<RunSummary> {
    let authority = AuthorityMapping::load(&config.authority).unwrap_or_else(|e| {
        warn!("Continuing without a parish authority, every parish is unmapped: {:#}", e);
        AuthorityMapping::default()
    });
    let dictionary = match &config.dictionary {
        Some(path) => CauseDictionary::load(path).unwrap_or_else(|e| {
            warn!("Continuing without cause definitions: {:#}", e);
            CauseDictionary::default()
        }),
        None => CauseDictionary::default(),
    };

    let mut audit = AuditLog::default();
    let jobs = load_jobs(config)?;
    info!("Total files to load across all sources: {}", jobs.len());
    let tables = load_tables(&jobs, &mut audit);
    if tables.is_empty() {
        bail!("No usable input: none of the {} configured sources produced a table", config.sources.len());
    }

    let canonicalizer = ParishCanonicalizer::new(&authority);
    let registry = ParishRegistry::prescan(&tables, &canonicalizer);
    audit.unmapped_parishes = registry.unmapped_names().to_vec();

    let validator = Validator::new(config.validation);
    let extractor = Extractor::new(&canonicalizer, &registry, validator);
    let mut index = PeriodIndex::new();
    let mut extracted = Vec::new();

    let bar = progress_bar(tables.len(), options.show_progress);
    bar.set_message("Extracting...");
    for table in &tables {
        let started = Instant::now();
        match extractor.extract(table, &mut index, &mut audit) {
            Ok(records) => {
                audit.sources_processed += 1;
                bar.set_message(format!("OK: {} ({} records, {})", table.source_name, records.len(), format_elapsed(started.elapsed())));
                extracted.extend(records);
            }
            Err(e) => {
                bar.set_message(format!("SKIP: {}", table.source_name));
                audit.record_skip(&table.source_name, &table.path, e);
            }
        }
        bar.inc(1);
    }
    bar.finish_with_message(format!("Extraction finished. {} sources OK, {} skipped.", audit.sources_processed, audit.sources_skipped.len()));
    if audit.sources_processed == 0 {
        bail!("No usable input: all {} loaded sources were skipped during extraction", tables.len());
    }

    let (observations, stats) = RecordReconciler::new().reconcile(extracted);
    audit.reconciliation = stats;

    let years: BTreeSet<i32> = index.periods().iter().map(|p| p.year).collect();
    let causes = dictionary.cause_rows(&observations);
    let summary_counts = (registry.len(), index.len(), years.len(), observations.len());

    let (sender, writer_thread) = spawn_csv_writer(options.output_dir.clone(), options.channel_capacity.max(1));
    let batches = [
        OutputBatch::Parishes(registry.parishes().to_vec()),
        OutputBatch::Periods(index.periods().to_vec()),
        OutputBatch::Years(years.into_iter().collect()),
    ]
    .into_iter()
    .chain(observations.chunks(options.batch_size.max(1)).map(|chunk| OutputBatch::Observations(chunk.to_vec())))
    .chain(std::iter::once(OutputBatch::Causes(causes)));
    for batch in batches {
        if let Err(e) = sender.send(batch) {
            error!("Failed to send {} batch to writer thread: {}", e.0.table_name(), e);
            break;
        }
    }
    drop(sender);

    let rows_written = match writer_thread.join() {
        Ok(Ok(counts)) => counts.into_iter().collect::<BTreeMap<_, _>>(),
        Ok(Err(e)) => return Err(e.context(format!("Output tables in {} are incomplete", options.output_dir.display()))),
        Err(e) => bail!("Writer thread panicked; output tables in {} are incomplete: {:?}", options.output_dir.display(), e),
    };

    AuditReport::new(config.description.as_deref(), &audit, rows_written.clone())
        .write(&options.output_dir.join("audit.json"))?;

    let (parishes, periods, years, observations) = summary_counts;
    Ok(RunSummary {
        files_found: jobs.len(),
        tables_loaded: tables.len(),
        parishes,
        periods,
        years,
        observations,
        rows_written,
        audit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::from_millis(1_250)), "1.250s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(3_725)), "1h 2m 5s");
    }
}
