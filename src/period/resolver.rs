use log::debug;

use crate::config::{PeriodMode, SourceKind};
use crate::models::{MatchConfidence, Period, PeriodKind, ANNUAL_PERIOD_NUMBER};
use crate::period::calendar::{
    self, is_annual, month_code, normalize_month, KeyParts, ANNUAL_END_DAY, ANNUAL_MONTH, ANNUAL_START_DAY,
    DEFAULT_END_DAY, DEFAULT_START_DAY,
};
use crate::period::index::PeriodIndex;
use crate::table::{parse_whole_number, SourceTable};
use crate::validation::{ValidationFailure, Validator};

/// Raw date fields of one row, parsed but not yet interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateFragments {
    pub year: i32,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub start_day: Option<u32>,
    pub start_month: Option<String>,
    pub end_day: Option<u32>,
    pub end_month: Option<String>,
    pub period_number: Option<u32>,
    pub identifier: Option<String>,
    /// Date cells that held text but no usable number.
    pub malformed_values: u32,
}

impl DateFragments {
    /// Reads the date columns of `row`. The year comes from `year`, then
    /// `end_year`, then `start_year`.
    pub fn from_row(table: &SourceTable, row: usize) -> Result<Self, ValidationFailure> {
        let mut malformed_values = 0;
        let mut number = |column: &str| -> Option<i64> {
            let text = table.cell(row, column)?;
            let parsed = parse_whole_number(text);
            if parsed.is_none() {
                malformed_values += 1;
            }
            parsed
        };

        let year_cell = number("year");
        let start_year = number("start_year").and_then(|y| i32::try_from(y).ok());
        let end_year = number("end_year").and_then(|y| i32::try_from(y).ok());
        let start_day = number("start_day").and_then(|d| u32::try_from(d).ok());
        let end_day = number("end_day").and_then(|d| u32::try_from(d).ok());
        let period_number = number("week_number")
            .or_else(|| number("week"))
            .and_then(|w| u32::try_from(w).ok());

        let year = year_cell
            .and_then(|y| i32::try_from(y).ok())
            .or(end_year)
            .or(start_year)
            .ok_or(ValidationFailure::MissingYear)?;

        Ok(Self {
            year,
            start_year,
            end_year,
            start_day,
            start_month: table.cell(row, "start_month").map(str::to_string),
            end_day,
            end_month: table.cell(row, "end_month").map(str::to_string),
            period_number,
            identifier: table.cell(row, "unique_identifier").map(str::to_string),
            malformed_values,
        })
    }

    pub fn validate(&self, validator: &Validator) -> Result<(), ValidationFailure> {
        validator.check_year(self.year)?;
        if let Some(number) = self.period_number {
            validator.check_period_number(number)?;
        }
        for day in [self.start_day, self.end_day].into_iter().flatten() {
            validator.check_day(day)?;
        }
        Ok(())
    }
}

/// A period derived from one row, before it is looked up in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedPeriod {
    pub period: Period,
    pub start_year: i32,
    pub end_year: i32,
    /// Recognised months and both days present; only these may be registered.
    pub well_formed: bool,
    pub unrecognized_months: u32,
}

impl DerivedPeriod {
    fn key_parts(&self) -> KeyParts<'_> {
        KeyParts {
            start_year: self.start_year,
            start_month: self.period.start_month.as_deref(),
            start_day: self.period.start_day,
            end_year: self.end_year,
            end_month: self.period.end_month.as_deref(),
            end_day: self.period.end_day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Exact(String),
    Registered(String),
    Fallback { join_key: String, tier: MatchConfidence },
    Unresolved,
}

impl ResolutionOutcome {
    pub fn join_key(&self) -> Option<&str> {
        match self {
            ResolutionOutcome::Exact(key) | ResolutionOutcome::Registered(key) => Some(key),
            ResolutionOutcome::Fallback { join_key, .. } => Some(join_key),
            ResolutionOutcome::Unresolved => None,
        }
    }

    pub fn confidence(&self) -> Option<MatchConfidence> {
        match self {
            ResolutionOutcome::Exact(_) | ResolutionOutcome::Registered(_) => Some(MatchConfidence::Exact),
            ResolutionOutcome::Fallback { tier, .. } => Some(*tier),
            ResolutionOutcome::Unresolved => None,
        }
    }
}

/// Smallest shift first; at equal magnitude the earlier day is tried before the later one.
const END_DAY_OFFSETS: [i64; 7] = [0, -1, 1, -2, 2, -3, 3];
const START_DAY_OFFSETS: [i64; 5] = [0, -1, 1, -2, 2];

type FallbackTier = fn(&PeriodIndex, &DerivedPeriod) -> Option<String>;

fn shifted_day(base: u32, offset: i64) -> Option<u32> {
    let day = i64::from(base) + offset;
    (1..=31).contains(&day).then_some(day as u32)
}

fn end_day_shift(index: &PeriodIndex, derived: &DerivedPeriod) -> Option<String> {
    let base = derived.period.end_day.unwrap_or(DEFAULT_END_DAY);
    END_DAY_OFFSETS.iter().filter_map(|&offset| shifted_day(base, offset)).find_map(|day| {
        let mut parts = derived.key_parts();
        parts.end_day = Some(day);
        let key = parts.join_key().key;
        index.contains(&key).then_some(key)
    })
}

fn start_day_shift(index: &PeriodIndex, derived: &DerivedPeriod) -> Option<String> {
    let base = derived.period.start_day.unwrap_or(DEFAULT_START_DAY);
    START_DAY_OFFSETS.iter().filter_map(|&offset| shifted_day(base, offset)).find_map(|day| {
        let mut parts = derived.key_parts();
        parts.start_day = Some(day);
        let key = parts.join_key().key;
        index.contains(&key).then_some(key)
    })
}

fn start_month_match(index: &PeriodIndex, derived: &DerivedPeriod) -> Option<String> {
    let wanted = normalize_month(derived.period.start_month.as_deref()?);
    if wanted.is_empty() {
        return None;
    }
    index.for_year(derived.period.year)
        .find(|p| p.start_month.as_deref().map_or(false, |m| normalize_month(m).contains(&wanted)))
        .map(|p| p.join_key.clone())
}

fn earliest_in_year(index: &PeriodIndex, derived: &DerivedPeriod) -> Option<String> {
    index.earliest_for_year(derived.period.year).map(|p| p.join_key.clone())
}

const FALLBACK_TIERS: [(MatchConfidence, FallbackTier); 4] = [
    (MatchConfidence::EndDayShift, end_day_shift),
    (MatchConfidence::StartDayShift, start_day_shift),
    (MatchConfidence::StartMonth, start_month_match),
    (MatchConfidence::BestEffort, earliest_in_year),
];

/// Derives join keys and attaches rows to periods in a caller-owned [`PeriodIndex`].
#[derive(Debug, Clone, Copy)]
pub struct TemporalKeyResolver {
    validator: Validator,
}

impl TemporalKeyResolver {
    pub fn new(validator: Validator) -> Self {
        Self { validator }
    }

    pub fn derive(&self, fragments: &DateFragments, source_kind: SourceKind, source_name: &str) -> DerivedPeriod {
        let annual = source_kind == SourceKind::General
            || is_annual(fragments.identifier.as_deref(), fragments.start_month.as_deref(), fragments.end_month.as_deref());

        let (start_day, start_month, end_day, end_month, default_start_year) = if annual {
            (
                fragments.start_day.or(Some(ANNUAL_START_DAY)),
                fragments.start_month.clone().or_else(|| Some(ANNUAL_MONTH.to_string())),
                fragments.end_day.or(Some(ANNUAL_END_DAY)),
                fragments.end_month.clone().or_else(|| Some(ANNUAL_MONTH.to_string())),
                fragments.year - 1,
            )
        } else {
            (fragments.start_day, fragments.start_month.clone(), fragments.end_day, fragments.end_month.clone(), fragments.year)
        };

        let kind = if annual { PeriodKind::Annual } else { PeriodKind::Weekly };
        let period_number = if annual { ANNUAL_PERIOD_NUMBER } else { fragments.period_number.unwrap_or(1) };
        let start_year = fragments.start_year.unwrap_or(default_start_year);
        let end_year = fragments.end_year.unwrap_or(fragments.year);

        let join = KeyParts {
            start_year,
            start_month: start_month.as_deref(),
            start_day,
            end_year,
            end_month: end_month.as_deref(),
            end_day,
        }
        .join_key();

        let months_known = start_month.as_deref().and_then(month_code).is_some()
            && end_month.as_deref().and_then(month_code).is_some();
        let days_valid = match (start_day, end_day) {
            (Some(s), Some(e)) => self.validator.check_day(s).is_ok() && self.validator.check_day(e).is_ok(),
            _ => false,
        };
        let well_formed = months_known
            && days_valid
            && self.validator.check_year(fragments.year).is_ok()
            && self.validator.check_period_number(period_number).is_ok();

        let week_id = calendar::week_id(fragments.year, period_number, kind);
        DerivedPeriod {
            period: Period {
                join_key: join.key,
                start_day,
                start_month,
                end_day,
                end_month,
                year: fragments.year,
                period_number,
                year_label: calendar::year_label(fragments.year, period_number, kind),
                year_range: calendar::year_range(&week_id),
                week_id,
                kind,
                unique_identifier: fragments.identifier.clone(),
                source_name: source_name.to_string(),
            },
            start_year,
            end_year,
            well_formed,
            unrecognized_months: join.unrecognized_months,
        }
    }

    /// Attaches a derived period to the index. Register-mode sources add
    /// well-formed periods that are missing; everything else that misses goes
    /// through the fallback tiers in order.
    pub fn resolve(&self, index: &mut PeriodIndex, derived: DerivedPeriod, mode: PeriodMode, locator: &str) -> ResolutionOutcome {
        let candidate = derived.period.join_key.clone();
        if index.contains(&candidate) {
            return ResolutionOutcome::Exact(candidate);
        }
        if mode == PeriodMode::Register && derived.well_formed {
            index.insert_if_absent(derived.period);
            return ResolutionOutcome::Registered(candidate);
        }
        for (tier, fallback) in FALLBACK_TIERS.iter() {
            if let Some(join_key) = fallback(index, &derived) {
                debug!(
                    "Period fallback for {} record {}: candidate {} -> {} via {}",
                    derived.period.source_name, locator, candidate, join_key, tier.as_str()
                );
                return ResolutionOutcome::Fallback { join_key, tier: *tier };
            }
        }
        debug!(
            "No period found for {} record {} (candidate {}, year {})",
            derived.period.source_name, locator, candidate, derived.period.year
        );
        ResolutionOutcome::Unresolved
    }
}
