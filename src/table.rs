//! In-memory source tables and the thin CSV loading layer in front of them.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use glob::glob;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::config::{PeriodMode, SourceKind};

/// A column-normalised table from one transcription source.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub source_name: String,
    pub kind: SourceKind,
    pub period_mode: PeriodMode,
    pub path: PathBuf,
    headers: Vec<String>,
    column_index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl SourceTable {
    pub fn new(source_name: &str, kind: SourceKind, period_mode: PeriodMode, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let column_index = headers.iter().enumerate().map(|(i, h)| (h.clone(), i)).collect();
        Self {
            source_name: source_name.to_string(),
            kind,
            period_mode,
            path: PathBuf::new(),
            headers,
            column_index,
            rows,
        }
    }

    pub fn headers(&self) -> &[String] { &self.headers }
    pub fn row_count(&self) -> usize { self.rows.len() }
    pub fn has_column(&self, column: &str) -> bool { self.column_index.contains_key(column) }

    /// Trimmed cell text; empty cells read as `None`.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = *self.column_index.get(column)?;
        self.rows.get(row)
            .and_then(|r| r.get(idx))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First non-empty cell among `columns`, in the given order.
    pub fn first_cell(&self, row: usize, columns: &[&str]) -> Option<&str> {
        columns.iter().find_map(|c| self.cell(row, c))
    }
}

/// Parses `"12"` and integral floats such as `"12.0"`; anything else is `None`.
pub fn parse_whole_number(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Some(n);
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
        _ => None,
    }
}

const COLUMN_NORMALIZATION: [(&str, &str); 16] = [
    ("Unique ID", "unique_identifier"),
    ("Unique_ID", "unique_identifier"),
    ("unique_id", "unique_identifier"),
    ("UniqueID", "unique_identifier"),
    ("Unique Identifier", "unique_identifier"),
    ("Start Day", "start_day"),
    ("End Day", "end_day"),
    ("Start Month", "start_month"),
    ("End Month", "end_month"),
    ("Start Year", "start_year"),
    ("End Year", "end_year"),
    ("Week Number", "week_number"),
    ("Week", "week"),
    ("Year", "year"),
    ("Parish Name", "parish_name"),
    ("Count", "count"),
];

pub fn normalize_column_name(column_name: &str) -> String {
    let clean = column_name.trim_matches(|c: char| c == '"' || c == '\'');
    if let Some((_, mapped)) = COLUMN_NORMALIZATION.iter().find(|(raw, _)| *raw == clean) {
        return mapped.to_string();
    }
    let mut normalized = String::with_capacity(clean.len());
    for c in clean.to_lowercase().chars() {
        if c.is_alphanumeric() || c == '_' {
            normalized.push(c);
        } else if !normalized.ends_with('_') {
            normalized.push('_');
        }
    }
    let mut collapsed = String::with_capacity(normalized.len());
    for c in normalized.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches('_').to_string()
}

/// Normalises every header; later duplicates get `_1`, `_2`, ... suffixes.
pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_column_name(h)).collect();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    let result: Vec<String> = normalized.into_iter().map(|name| {
        let count = seen.entry(name.clone()).or_insert(0);
        let out = if *count == 0 { name.clone() } else { duplicates.push(name.clone()); format!("{}_{}", name, count) };
        *count += 1;
        out
    }).collect();
    if !duplicates.is_empty() {
        warn!("Duplicate columns after normalization: {:?}", duplicates);
    }
    result
}

fn is_skipped_column(normalized: &str) -> bool {
    (normalized.starts_with("omeka") && normalized.contains("item"))
        || (normalized.starts_with("datascribe") && ["item", "record", "position"].iter().any(|p| normalized.contains(p)))
        || (normalized.starts_with("image") && normalized.contains("filename"))
}

fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    if path.extension().map_or(false, |e| e.eq_ignore_ascii_case("gz")) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn load_table(path: &Path, source_name: &str, kind: SourceKind, period_mode: PeriodMode) -> Result<SourceTable> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(open_reader(path)?);
    let raw_headers: Vec<String> = reader.headers()
        .with_context(|| format!("Failed to read CSV header from {}", path.display()))?
        .iter().map(|h| h.to_string()).collect();
    let normalized = normalize_headers(&raw_headers);
    let kept: Vec<usize> = normalized.iter().enumerate()
        .filter(|(_, name)| !is_skipped_column(name))
        .map(|(i, _)| i)
        .collect();
    if kept.len() != normalized.len() {
        debug!("Skipping {} metadata columns in {}", normalized.len() - kept.len(), path.display());
    }
    let headers: Vec<String> = kept.iter().map(|&i| normalized[i].clone()).collect();

    let mut rows = Vec::new();
    for (line_num, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => { warn!("Error reading row {} from {}: {}", line_num + 2, path.display(), e); continue; }
        };
        rows.push(kept.iter().map(|&i| record.get(i).unwrap_or("").to_string()).collect());
    }
    info!("Loaded {} rows, {} columns from {} as '{}'", rows.len(), headers.len(), path.display(), source_name);

    let mut table = SourceTable::new(source_name, kind, period_mode, headers, rows);
    table.path = path.to_path_buf();
    Ok(table)
}

pub fn find_source_files(pattern: &str) -> Result<Vec<PathBuf>> {
    info!("Searching for files matching pattern: {}", pattern);
    let mut paths: Vec<PathBuf> = glob(pattern)
        .with_context(|| format!("Invalid source path pattern: {}", pattern))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    if paths.is_empty() {
        warn!("No files found matching the pattern: {}", pattern);
    }
    Ok(paths)
}
