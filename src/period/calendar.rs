//! Pure calendar helpers: month codes, join keys, annual detection and the
//! bill-year labels.

use crate::models::{PeriodKind, ANNUAL_PERIOD_NUMBER};

const MONTHS: [(&str, &str); 24] = [
    ("january", "01"), ("jan", "01"),
    ("february", "02"), ("feb", "02"),
    ("march", "03"), ("mar", "03"),
    ("april", "04"), ("apr", "04"),
    ("may", "05"), ("june", "06"),
    ("jun", "06"), ("july", "07"),
    ("jul", "07"), ("august", "08"),
    ("aug", "08"), ("september", "09"),
    ("sept", "09"), ("sep", "09"),
    ("october", "10"), ("oct", "10"),
    ("november", "11"), ("nov", "11"),
    ("december", "12"), ("dec", "12"),
];

/// Fallback code for month text that is absent or unrecognised.
pub const DEFAULT_MONTH_CODE: &str = "01";
pub const DEFAULT_START_DAY: u32 = 1;
pub const DEFAULT_END_DAY: u32 = 7;

/// General bills run from 17 December of the previous year to 16 December.
pub const ANNUAL_START_DAY: u32 = 17;
pub const ANNUAL_END_DAY: u32 = 16;
pub const ANNUAL_MONTH: &str = "December";

const GENERAL_BILL_MARKERS: [&str; 4] = ["generalbill", "general-bill", "general_bill", "general bill"];

/// Lowercases and strips the stray brackets and full stops transcribers leave behind.
pub fn normalize_month(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .trim_end_matches(|c: char| c == ')' || c == '.' || c == ',')
        .trim_start_matches('(')
        .trim()
        .to_string()
}

pub fn month_code(name: &str) -> Option<&'static str> {
    let normalized = normalize_month(name);
    MONTHS.iter().find(|(month, _)| *month == normalized).map(|(_, code)| *code)
}

fn month_number(name: Option<&str>) -> Option<u32> {
    name.and_then(month_code).and_then(|code| code.parse().ok())
}

/// A join key plus how many month fields had to fall back to [`DEFAULT_MONTH_CODE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinKey {
    pub key: String,
    pub unrecognized_months: u32,
}

/// The six fields a join key is built from. Absent days take the week defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParts<'a> {
    pub start_year: i32,
    pub start_month: Option<&'a str>,
    pub start_day: Option<u32>,
    pub end_year: i32,
    pub end_month: Option<&'a str>,
    pub end_day: Option<u32>,
}

impl KeyParts<'_> {
    pub fn join_key(&self) -> JoinKey {
        let mut unrecognized_months = 0;
        let mut code = |month: Option<&str>| match month {
            Some(text) => month_code(text).unwrap_or_else(|| {
                unrecognized_months += 1;
                DEFAULT_MONTH_CODE
            }),
            None => DEFAULT_MONTH_CODE,
        };
        let start_code = code(self.start_month);
        let end_code = code(self.end_month);
        let key = format!(
            "{}{}{:02}{}{}{:02}",
            self.start_year,
            start_code,
            self.start_day.unwrap_or(DEFAULT_START_DAY),
            self.end_year,
            end_code,
            self.end_day.unwrap_or(DEFAULT_END_DAY),
        );
        JoinKey { key, unrecognized_months }
    }
}

/// A period is annual when its identifier names a general bill, when it runs
/// December to December, or when it wraps the year boundary across ten or more months.
pub fn is_annual(identifier: Option<&str>, start_month: Option<&str>, end_month: Option<&str>) -> bool {
    if let Some(id) = identifier {
        let lower = id.to_lowercase();
        if GENERAL_BILL_MARKERS.iter().any(|m| lower.contains(m)) {
            return true;
        }
    }
    match (month_number(start_month), month_number(end_month)) {
        (Some(12), Some(12)) => true,
        (Some(start), Some(end)) if start > end => (12 - start) + end >= 10,
        _ => false,
    }
}

pub fn year_label(year: i32, period_number: u32, kind: PeriodKind) -> String {
    match kind {
        PeriodKind::Weekly if period_number > 15 => format!("{}/{}", year - 1, year),
        _ => year.to_string(),
    }
}

pub fn week_id(year: i32, period_number: u32, kind: PeriodKind) -> String {
    match kind {
        PeriodKind::Annual => format!("{}-{}-{}", year, year, ANNUAL_PERIOD_NUMBER),
        PeriodKind::Weekly if period_number > 15 => format!("{}-{}-{:02}", year - 1, year, period_number),
        PeriodKind::Weekly => format!("{}-{}-{:02}", year, year + 1, period_number),
    }
}

/// First two dash-separated components of a week id.
pub fn year_range(week_id: &str) -> String {
    week_id.splitn(3, '-').take(2).collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts<'a>(start_month: Option<&'a str>, start_day: Option<u32>, end_month: Option<&'a str>, end_day: Option<u32>) -> KeyParts<'a> {
        KeyParts { start_year: 1665, start_month, start_day, end_year: 1665, end_month, end_day }
    }

    #[test]
    fn month_names_tolerate_transcription_noise() {
        assert_eq!(month_code("January)"), Some("01"));
        assert_eq!(month_code(" Sept. "), Some("09"));
        assert_eq!(month_code("DECEMBER"), Some("12"));
        assert_eq!(month_code("Decembre"), None);
    }

    #[test]
    fn join_key_pads_days_and_defaults() {
        let key = parts(Some("August"), Some(8), Some("August"), Some(15)).join_key();
        assert_eq!(key.key, "1665080816650815");
        assert_eq!(key.unrecognized_months, 0);
        let defaults = parts(None, None, None, None).join_key();
        assert_eq!(defaults.key, "1665010116650107");
        assert_eq!(defaults.unrecognized_months, 0);
    }

    #[test]
    fn unrecognized_months_fall_back_and_are_counted() {
        let key = parts(Some("Agust"), Some(8), Some("August"), Some(15)).join_key();
        assert_eq!(key.key, "1665010816650815");
        assert_eq!(key.unrecognized_months, 1);
    }

    #[test]
    fn join_key_is_deterministic() {
        let a = parts(Some("march"), Some(3), Some("March"), Some(10)).join_key();
        let b = parts(Some("march"), Some(3), Some("March"), Some(10)).join_key();
        assert_eq!(a, b);
    }

    #[test]
    fn annual_detection() {
        assert!(is_annual(None, Some("December"), Some("December")));
        assert!(is_annual(Some("GeneralBill-1665"), Some("August"), Some("August")));
        assert!(is_annual(None, Some("December"), Some("November")));
        assert!(!is_annual(None, Some("December"), Some("January")));
        assert!(!is_annual(None, Some("August"), Some("September")));
        assert!(!is_annual(None, None, Some("December")));
    }

    #[test]
    fn late_weeks_split_across_calendar_years() {
        assert_eq!(year_label(1666, 20, PeriodKind::Weekly), "1665/1666");
        assert_eq!(year_label(1666, 5, PeriodKind::Weekly), "1666");
        assert_eq!(year_label(1666, ANNUAL_PERIOD_NUMBER, PeriodKind::Annual), "1666");
    }

    #[test]
    fn week_ids_follow_the_year_pair() {
        assert_eq!(week_id(1666, 20, PeriodKind::Weekly), "1665-1666-20");
        assert_eq!(week_id(1666, 5, PeriodKind::Weekly), "1666-1667-05");
        assert_eq!(week_id(1666, ANNUAL_PERIOD_NUMBER, PeriodKind::Annual), "1666-1666-90");
        assert_eq!(year_range("1665-1666-20"), "1665-1666");
    }
}
