use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use csv::Writer;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crate::dictionary::CauseRow;
use crate::models::{EntityRef, ObservationRecord, Parish, Period};

pub fn generate_deterministic_id(prefix: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    format!("{}-sha256-{}", prefix, hex::encode(result))
}

/// Stable across runs for the same reading of the same cell.
pub fn observation_id(record: &ObservationRecord) -> String {
    let content = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        record.entity,
        record.measure.as_str(),
        record.year,
        record.join_key,
        record.provenance.source_name,
        record.provenance.source_record_id,
        record.source_column,
    );
    generate_deterministic_id("obs", &content)
}

#[derive(Debug, Clone)]
pub enum OutputBatch {
    Parishes(Vec<Parish>),
    Periods(Vec<Period>),
    Years(Vec<i32>),
    Observations(Vec<ObservationRecord>),
    Causes(Vec<CauseRow>),
}

impl OutputBatch {
    pub fn table_name(&self) -> &'static str {
        match self {
            OutputBatch::Parishes(_) => "parishes",
            OutputBatch::Periods(_) => "periods",
            OutputBatch::Years(_) => "years",
            OutputBatch::Observations(_) => "observations",
            OutputBatch::Causes(_) => "causes",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OutputBatch::Parishes(rows) => rows.len(),
            OutputBatch::Periods(rows) => rows.len(),
            OutputBatch::Years(rows) => rows.len(),
            OutputBatch::Observations(rows) => rows.len(),
            OutputBatch::Causes(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

pub trait OutputWriter: Send {
    fn write_batch(&mut self, batch: OutputBatch) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn report_files_created(&self) -> usize;
    fn report_rows_written(&self) -> HashMap<String, usize>;
}

pub const TABLE_HEADERS: [(&str, &[&str]); 5] = [
    ("parishes", &["id", "parish_name", "canonical_name", "bills_subunit"]),
    ("periods", &[
        "join_key", "start_day", "start_month", "end_day", "end_month", "year", "period_number",
        "year_label", "week_id", "year_range", "period_kind", "unique_identifier", "source_name",
    ]),
    ("years", &["year"]),
    ("observations", &[
        "observation_id", "entity_kind", "parish_id", "subtotal_category", "cause", "measure_kind",
        "count", "year", "join_key", "period_kind", "is_missing", "is_illegible", "annotation",
        "period_match", "source_name", "source_record_id", "source_column",
    ]),
    ("causes", &["cause", "definition", "definition_source"]),
];

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(String::new, |v| v.to_string())
}

fn period_row(p: &Period) -> Vec<String> {
    vec![
        p.join_key.clone(),
        opt(&p.start_day),
        opt(&p.start_month),
        opt(&p.end_day),
        opt(&p.end_month),
        p.year.to_string(),
        p.period_number.to_string(),
        p.year_label.clone(),
        p.week_id.clone(),
        p.year_range.clone(),
        p.kind.as_str().to_string(),
        opt(&p.unique_identifier),
        p.source_name.clone(),
    ]
}

fn observation_row(r: &ObservationRecord) -> Vec<String> {
    let (parish_id, subtotal, cause) = match &r.entity {
        EntityRef::Parish(id) => (id.to_string(), String::new(), String::new()),
        EntityRef::Subtotal(category) => (String::new(), category.clone(), String::new()),
        EntityRef::Cause(name) => (String::new(), String::new(), name.clone()),
    };
    vec![
        observation_id(r),
        r.entity.kind_str().to_string(),
        parish_id,
        subtotal,
        cause,
        r.measure.as_str().to_string(),
        opt(&r.count),
        r.year.to_string(),
        r.join_key.clone(),
        r.period_kind.as_str().to_string(),
        r.is_missing.to_string(),
        r.is_illegible.to_string(),
        r.annotation().to_string(),
        r.period_match.as_str().to_string(),
        r.provenance.source_name.clone(),
        r.provenance.source_record_id.clone(),
        r.source_column.clone(),
    ]
}

/// One CSV file per output table, headers written on creation.
pub struct MultiTableCsvOutput {
    writers: HashMap<String, Writer<File>>,
    output_dir: PathBuf,
    rows_written: DashMap<String, AtomicUsize>,
    files_created: usize,
}

impl MultiTableCsvOutput {
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
        let mut writers = HashMap::new();
        let rows_written = DashMap::new();
        let mut files_created = 0;
        for (table_name, headers) in TABLE_HEADERS.iter() {
            let file_path = output_dir.join(format!("{}.csv", table_name));
            let file = File::create(&file_path)
                .with_context(|| format!("Failed to create output file: {}", file_path.display()))?;
            files_created += 1;
            let mut writer = Writer::from_writer(file);
            writer.write_record(*headers)?;
            writer.flush()?;
            writers.insert(table_name.to_string(), writer);
            rows_written.insert(table_name.to_string(), AtomicUsize::new(0));
        }
        Ok(Self { writers, output_dir, rows_written, files_created })
    }

    fn get_writer(&mut self, table_name: &str) -> Result<&mut Writer<File>> {
        self.writers.get_mut(table_name)
            .ok_or_else(|| anyhow!("Writer for table '{}' not found", table_name))
    }

    fn increment_row_count(&self, table_name: &str, count: usize) {
        match self.rows_written.get(table_name) {
            Some(counter) => { counter.fetch_add(count, Ordering::Relaxed); }
            None => warn!("Attempted to increment row count for unknown table: {}", table_name),
        }
    }
}

impl OutputWriter for MultiTableCsvOutput {
    fn write_batch(&mut self, batch: OutputBatch) -> Result<()> {
        let table_name = batch.table_name();
        let count = batch.len();
        let writer = self.get_writer(table_name)?;
        match batch {
            OutputBatch::Parishes(rows) => {
                for p in rows {
                    writer.write_record(&[p.id.to_string(), p.raw_name, p.canonical_name, p.subunit.unwrap_or_default()])?;
                }
            }
            OutputBatch::Periods(rows) => {
                for p in &rows {
                    writer.write_record(period_row(p))?;
                }
            }
            OutputBatch::Years(rows) => {
                for year in rows {
                    writer.write_record(&[year.to_string()])?;
                }
            }
            OutputBatch::Observations(rows) => {
                for r in &rows {
                    writer.write_record(observation_row(r))?;
                }
            }
            OutputBatch::Causes(rows) => {
                for c in rows {
                    writer.write_record(&[c.cause, c.definition.unwrap_or_default(), c.definition_source.unwrap_or_default()])?;
                }
            }
        }
        self.increment_row_count(table_name, count);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        debug!("Flushing {} CSV files in directory {}...", self.writers.len(), self.output_dir.display());
        let mut flush_errors = Vec::new();
        for (name, writer) in self.writers.iter_mut() {
            if let Err(e) = writer.flush() {
                flush_errors.push(format!("Failed to flush file {}.csv: {}", name, e));
            }
        }
        if flush_errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("Errors occurred during flush:\n - {}", flush_errors.join("\n - ")))
        }
    }

    fn report_files_created(&self) -> usize { self.files_created }

    fn report_rows_written(&self) -> HashMap<String, usize> {
        self.rows_written.iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}

pub struct CsvWriterManager {
    writer_impl: Box<dyn OutputWriter>,
}

impl CsvWriterManager {
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        Ok(Self::from_writer(Box::new(MultiTableCsvOutput::new(output_dir)?)))
    }
    pub fn from_writer(writer_impl: Box<dyn OutputWriter>) -> Self {
        Self { writer_impl }
    }
    pub fn write_batch(&mut self, batch: OutputBatch) -> Result<()> { self.writer_impl.write_batch(batch).context("Error writing batch via CsvWriterManager") }
    pub fn flush_all(&mut self) -> Result<()> { self.writer_impl.flush().context("Error flushing all files via CsvWriterManager") }
    pub fn report_files_created(&self) -> usize { self.writer_impl.report_files_created() }
    pub fn report_rows_written(&self) -> HashMap<String, usize> { self.writer_impl.report_rows_written() }
}

impl Drop for CsvWriterManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            error!("Error flushing CSV writers during cleanup: {}", e);
        }
    }
}

type WriterHandle = JoinHandle<Result<HashMap<String, usize>>>;

/// Starts the CSV writer thread. Dropping every sender ends it; joining yields
/// the per-table row counts.
pub fn spawn_csv_writer(output_dir: PathBuf, capacity: usize) -> (Sender<OutputBatch>, WriterHandle) {
    spawn_batch_writer(capacity, move || CsvWriterManager::new(output_dir))
}

/// Drains the channel into the manager `open` builds. A failed batch does not
/// stop the drain, but the first failure is what joining the thread returns.
pub fn spawn_batch_writer<F>(capacity: usize, open: F) -> (Sender<OutputBatch>, WriterHandle)
where
    F: FnOnce() -> Result<CsvWriterManager> + Send + 'static,
{
    let (batch_sender, batch_receiver): (Sender<OutputBatch>, Receiver<OutputBatch>) = bounded(capacity);
    let handle = thread::spawn(move || -> Result<HashMap<String, usize>> {
        info!("Writer thread started.");
        let mut manager = open()?;
        let mut total_batches_processed = 0;
        let mut first_error: Option<anyhow::Error> = None;
        for batch in batch_receiver {
            if batch.is_empty() {
                continue;
            }
            let table_name = batch.table_name();
            let num_rows = batch.len();
            match manager.write_batch(batch) {
                Ok(()) => {
                    total_batches_processed += 1;
                    debug!("Writer thread processed batch {}, {} {} rows", total_batches_processed, num_rows, table_name);
                }
                Err(e) => {
                    error!("Writer thread error writing {} batch: {:#}", table_name, e);
                    if first_error.is_none() {
                        first_error = Some(e.context(format!("Failed to write {} rows to {}", num_rows, table_name)));
                    }
                }
            }
        }
        info!("Writer thread finished receiving. Processed {} batches.", total_batches_processed);
        manager.flush_all()?;
        if let Some(e) = first_error {
            return Err(e);
        }
        info!("Created {} output files.", manager.report_files_created());
        Ok(manager.report_rows_written())
    });
    (batch_sender, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchConfidence, MeasureKind, PeriodKind, Provenance};

    fn record(source_column: &str) -> ObservationRecord {
        ObservationRecord {
            entity: EntityRef::Subtotal("Within the walls".into()),
            measure: MeasureKind::Buried,
            count: Some(140),
            join_key: "1665080816650815".into(),
            year: 1665,
            period_kind: PeriodKind::Weekly,
            is_missing: false,
            is_illegible: false,
            period_match: MatchConfidence::StartMonth,
            provenance: Provenance { source_name: "laxton_parishes".into(), source_record_id: "L-33".into() },
            source_column: source_column.into(),
        }
    }

    #[test]
    fn observation_ids_are_deterministic() {
        let id = observation_id(&record("parishes_within_the_walls_buried"));
        assert!(id.starts_with("obs-sha256-"));
        assert_eq!(id.len(), "obs-sha256-".len() + 64);
        assert_eq!(id, observation_id(&record("parishes_within_the_walls_buried")));
        assert_ne!(id, observation_id(&record("within_the_walls_buried")));
    }

    #[test]
    fn observation_rows_split_entity_columns() {
        let row = observation_row(&record("parishes_within_the_walls_buried"));
        assert_eq!(row.len(), TABLE_HEADERS[3].1.len());
        assert_eq!(&row[1..7], &["subtotal", "", "Within the walls", "", "buried", "140"]);
        assert_eq!(row[13], "start_month");
    }

    #[test]
    fn writer_thread_writes_every_table() {
        let dir = tempfile::tempdir().unwrap();
        let (sender, handle) = spawn_csv_writer(dir.path().to_path_buf(), 4);
        sender.send(OutputBatch::Years(vec![1665, 1666])).unwrap();
        sender.send(OutputBatch::Observations(vec![record("a"), record("b")])).unwrap();
        drop(sender);
        let counts = handle.join().unwrap().unwrap();
        assert_eq!(counts["years"], 2);
        assert_eq!(counts["observations"], 2);
        assert_eq!(counts["parishes"], 0);
        let years = fs::read_to_string(dir.path().join("years.csv")).unwrap();
        assert_eq!(years, "year\n1665\n1666\n");
    }

    struct RejectingWriter {
        rows_written: HashMap<String, usize>,
    }

    impl OutputWriter for RejectingWriter {
        fn write_batch(&mut self, batch: OutputBatch) -> Result<()> {
            if let OutputBatch::Observations(_) = batch {
                return Err(anyhow!("disk full"));
            }
            *self.rows_written.entry(batch.table_name().to_string()).or_insert(0) += batch.len();
            Ok(())
        }
        fn flush(&mut self) -> Result<()> { Ok(()) }
        fn report_files_created(&self) -> usize { 0 }
        fn report_rows_written(&self) -> HashMap<String, usize> { self.rows_written.clone() }
    }

    #[test]
    fn failed_batches_fail_the_writer_thread() {
        let (sender, handle) = spawn_batch_writer(4, || {
            Ok(CsvWriterManager::from_writer(Box::new(RejectingWriter { rows_written: HashMap::new() })))
        });
        sender.send(OutputBatch::Observations(vec![record("a")])).unwrap();
        sender.send(OutputBatch::Years(vec![1665])).unwrap();
        drop(sender);
        let err = handle.join().unwrap().unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("observations"), "{}", message);
        assert!(message.contains("disk full"), "{}", message);
    }
}
