//! Fixed-shape value types shared by every stage of the linkage pipeline.

use serde::Serialize;
use std::fmt;

pub type ParishId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parish {
    pub id: ParishId,
    pub raw_name: String,
    pub canonical_name: String,
    pub subunit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Weekly,
    Annual,
}

impl PeriodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodKind::Weekly => "weekly",
            PeriodKind::Annual => "annual",
        }
    }
}

/// A reporting period. Weekly bills use their printed week number, annual
/// ("general") bills the sentinel [`ANNUAL_PERIOD_NUMBER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub join_key: String,
    pub start_day: Option<u32>,
    pub start_month: Option<String>,
    pub end_day: Option<u32>,
    pub end_month: Option<String>,
    pub year: i32,
    pub period_number: u32,
    pub year_label: String,
    pub week_id: String,
    pub year_range: String,
    pub kind: PeriodKind,
    pub unique_identifier: Option<String>,
    pub source_name: String,
}

pub const ANNUAL_PERIOD_NUMBER: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    Buried,
    Plague,
    Christened,
    Other,
}

impl MeasureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasureKind::Buried => "buried",
            MeasureKind::Plague => "plague",
            MeasureKind::Christened => "christened",
            MeasureKind::Other => "other",
        }
    }

    /// Maps a single measure word (as found in column headers) to its kind.
    pub fn from_word(word: &str) -> Option<Self> {
        match word.to_lowercase().as_str() {
            "buried" | "burials" => Some(MeasureKind::Buried),
            "plague" => Some(MeasureKind::Plague),
            "christened" | "christenings" | "baptized" | "baptised" => Some(MeasureKind::Christened),
            "other" => Some(MeasureKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EntityRef {
    Parish(ParishId),
    Subtotal(String),
    Cause(String),
}

impl EntityRef {
    pub fn kind_str(&self) -> &'static str {
        match self {
            EntityRef::Parish(_) => "parish",
            EntityRef::Subtotal(_) => "subtotal",
            EntityRef::Cause(_) => "cause",
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Parish(id) => write!(f, "parish:{}", id),
            EntityRef::Subtotal(category) => write!(f, "subtotal:{}", category),
            EntityRef::Cause(name) => write!(f, "cause:{}", name),
        }
    }
}

/// How an observation was attached to its period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
    EndDayShift,
    StartDayShift,
    StartMonth,
    BestEffort,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchConfidence::Exact => "exact",
            MatchConfidence::EndDayShift => "end_day_shift",
            MatchConfidence::StartDayShift => "start_day_shift",
            MatchConfidence::StartMonth => "start_month",
            MatchConfidence::BestEffort => "best_effort",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Provenance {
    pub source_name: String,
    pub source_record_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservationRecord {
    pub entity: EntityRef,
    pub measure: MeasureKind,
    pub count: Option<i64>,
    pub join_key: String,
    pub year: i32,
    pub period_kind: PeriodKind,
    pub is_missing: bool,
    pub is_illegible: bool,
    pub period_match: MatchConfidence,
    pub provenance: Provenance,
    /// Column the value was read from; informational, not part of provenance identity.
    pub source_column: String,
}

pub type LogicalKey = (EntityRef, MeasureKind, i32, String);

impl ObservationRecord {
    pub fn logical_key(&self) -> LogicalKey {
        (self.entity.clone(), self.measure, self.year, self.join_key.clone())
    }

    /// `illegible` wins over `missing` when both flags are set.
    pub fn annotation(&self) -> &'static str {
        if self.is_illegible {
            "illegible"
        } else if self.is_missing {
            "missing"
        } else {
            ""
        }
    }
}
