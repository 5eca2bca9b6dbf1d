use std::path::PathBuf;

use thiserror::Error;

/// Why a whole source was left out of the run. Never fatal on its own.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source '{source_name}' has no year column (looked for year, end_year, start_year)")]
    MissingYearColumn { source_name: String },
    #[error("source '{source_name}' contains no data rows")]
    NoRows { source_name: String },
    #[error("source '{source_name}' has no parish, subtotal or cause columns")]
    NoCandidateColumns { source_name: String },
    #[error("failed to load {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },
}
