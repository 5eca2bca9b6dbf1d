//! Decides what each normalised column of a source table holds.

use crate::config::SourceKind;
use crate::models::MeasureKind;
use crate::parish::canonicalizer::{clean_name, is_valid_parish_name, standardize_case};
use crate::table::SourceTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    Metadata,
    MissingFlag { target: String },
    IllegibleFlag { target: String },
    Parish { name: String, measure: MeasureKind },
    Subtotal { category: String, measure: MeasureKind },
    Cause { name: String },
    /// Count column of a long-format table; the entity comes from `parish_name`.
    LongCount { measure: MeasureKind },
    Ignored,
}

impl ColumnRole {
    pub fn is_observation(&self) -> bool {
        matches!(self, ColumnRole::Parish { .. } | ColumnRole::Subtotal { .. } | ColumnRole::Cause { .. } | ColumnRole::LongCount { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub columns: Vec<(String, ColumnRole)>,
    pub long_format: bool,
}

impl ColumnPlan {
    pub fn observation_columns(&self) -> impl Iterator<Item = (&str, &ColumnRole)> {
        self.columns.iter().filter(|(_, role)| role.is_observation()).map(|(c, r)| (c.as_str(), r))
    }

    pub fn has_observations(&self) -> bool {
        self.observation_columns().next().is_some()
    }
}

pub const PARISH_NAME_COLUMN: &str = "parish_name";

const METADATA_COLUMNS: [&str; 16] = [
    "year", "week", "week_number", "start_day", "start_month", "end_day", "end_month",
    "start_year", "end_year", "unique_identifier", "joinid", "week_id", "year_range",
    "split_year", "bill_type", PARISH_NAME_COLUMN,
];

/// Weekly-bill summary columns that are neither parishes nor causes.
const CAUSES_EXCLUDED: [&str; 12] = [
    "christened_male", "christened_female", "christened_in_all", "buried_male",
    "buried_female", "buried_all", "plague_deaths", "increase_decrease_in_burials",
    "increase_decrease_in_plague_deaths", "parishes_clear_of_the_plague",
    "parishes_infected_with_plague", "ounces_in_penny_wheaten_loaf",
];

const GENERAL_PARISH_PREFIXES: [&str; 8] = ["st", "s", "saint", "christ", "trinity", "alhallows", "allhallows", "all"];
const GENERAL_PARISH_SUFFIXES: [&str; 3] = ["parish", "church", "precinct"];

/// Splits a trailing measure word off a header: `st_olave_buried` → (`st_olave`, Buried).
pub fn split_measure_suffix(header: &str) -> Option<(String, MeasureKind)> {
    let tokens: Vec<&str> = header.split(|c: char| c == '_' || c.is_whitespace()).filter(|t| !t.is_empty()).collect();
    let (last, rest) = tokens.split_last()?;
    let measure = MeasureKind::from_word(last)?;
    if rest.is_empty() {
        return None;
    }
    Some((rest.join("_"), measure))
}

/// Measure named anywhere in an aggregate label; defaults to burials.
pub fn measure_in_phrase(phrase: &str) -> MeasureKind {
    let lower = phrase.to_lowercase();
    if lower.contains("christen") || lower.contains("baptiz") {
        MeasureKind::Christened
    } else if lower.contains("plague") {
        MeasureKind::Plague
    } else {
        MeasureKind::Buried
    }
}

/// Normalises an aggregate label to its geographic subtotal category.
pub fn subtotal_category(label: &str) -> String {
    let lower = clean_name(label).to_lowercase();
    if lower.contains("within the walls") {
        "Within the walls".to_string()
    } else if lower.contains("without the walls") {
        "Without the walls".to_string()
    } else if lower.contains("middlesex") || lower.contains("surrey") || lower.contains("out parishes") || lower.contains("out-parishes") {
        "Middlesex and Surrey".to_string()
    } else if lower.contains("westminster") {
        "Westminster".to_string()
    } else if lower.contains("clear of") {
        "Parishes clear of the plague".to_string()
    } else if lower.contains("infected") {
        "Parishes infected".to_string()
    } else if lower.contains("total") || lower.contains("sum") {
        "Total".to_string()
    } else {
        standardize_case(&lower)
    }
}

fn is_general_aggregate(lower_phrase: &str) -> bool {
    let in_the_parishes = ["christened in the", "buried in the", "plague in the"]
        .iter()
        .any(|p| lower_phrase.contains(p)) && lower_phrase.contains("parishes");
    in_the_parishes
        || lower_phrase.contains("parishes clear of")
        || lower_phrase.contains("parishes infected")
        || lower_phrase.contains("total")
}

fn looks_like_general_parish(lower_phrase: &str) -> bool {
    let mut words = lower_phrase.split(' ');
    let first = words.next().unwrap_or("");
    let last = lower_phrase.rsplit(' ').next().unwrap_or("");
    let has_more_words = lower_phrase.contains(' ');
    (has_more_words && GENERAL_PARISH_PREFIXES.contains(&first) && (first != "all" || lower_phrase.starts_with("all hallows")) && (first != "christ" || lower_phrase.starts_with("christ church")))
        || lower_phrase.starts_with("trinity")
        || (has_more_words && GENERAL_PARISH_SUFFIXES.contains(&last))
}

fn classify_measured(header: &str, name: String, measure: MeasureKind) -> ColumnRole {
    if is_valid_parish_name(&name) {
        ColumnRole::Parish { name: standardize_case(&name), measure }
    } else {
        ColumnRole::Subtotal { category: subtotal_category(&name), measure: measure_in_phrase(header) }
    }
}

pub fn classify_column(header: &str, kind: SourceKind, long_format: bool) -> ColumnRole {
    let lower = header.to_lowercase();
    if METADATA_COLUMNS.contains(&lower.as_str()) {
        return ColumnRole::Metadata;
    }
    if let Some(target) = lower.strip_prefix("is_missing_") {
        return ColumnRole::MissingFlag { target: target.to_string() };
    }
    if let Some(target) = lower.strip_prefix("is_illegible_") {
        return ColumnRole::IllegibleFlag { target: target.to_string() };
    }
    if lower.starts_with("is_missing") || lower.starts_with("is_illegible") || lower.ends_with("_descriptive_text") {
        return ColumnRole::Ignored;
    }
    if long_format {
        if lower == "count" {
            return ColumnRole::LongCount { measure: MeasureKind::Buried };
        }
        return match MeasureKind::from_word(&lower) {
            Some(measure) => ColumnRole::LongCount { measure },
            None => ColumnRole::Ignored,
        };
    }

    let phrase = clean_name(&lower);
    match kind {
        SourceKind::Causes => {
            if CAUSES_EXCLUDED.contains(&lower.as_str()) {
                ColumnRole::Ignored
            } else {
                ColumnRole::Cause { name: clean_name(header) }
            }
        }
        SourceKind::Weekly => match split_measure_suffix(&lower) {
            Some((name, measure)) => classify_measured(&lower, name, measure),
            None if !is_valid_parish_name(&phrase) && (phrase.contains(" in the ") || phrase.starts_with("total")) => {
                ColumnRole::Subtotal { category: subtotal_category(&phrase), measure: measure_in_phrase(&phrase) }
            }
            None => ColumnRole::Ignored,
        },
        SourceKind::General => {
            if is_general_aggregate(&phrase) {
                return ColumnRole::Subtotal { category: subtotal_category(&phrase), measure: measure_in_phrase(&phrase) };
            }
            if let Some((name, measure)) = split_measure_suffix(&lower) {
                return classify_measured(&lower, name, measure);
            }
            if looks_like_general_parish(&phrase) && is_valid_parish_name(&phrase) {
                ColumnRole::Parish { name: standardize_case(&phrase), measure: MeasureKind::Buried }
            } else {
                ColumnRole::Ignored
            }
        }
    }
}

pub fn plan_columns(table: &SourceTable) -> ColumnPlan {
    let long_format = table.has_column(PARISH_NAME_COLUMN);
    let columns = table.headers().iter()
        .map(|h| (h.clone(), classify_column(h, table.kind, long_format)))
        .collect();
    ColumnPlan { columns, long_format }
}

/// Every raw parish spelling a table can contribute, from headers and from
/// `parish_name` cells. Aggregate labels are filtered out.
pub fn parish_name_candidates(table: &SourceTable, plan: &ColumnPlan) -> Vec<String> {
    let mut names: Vec<String> = plan.columns.iter()
        .filter_map(|(_, role)| match role {
            ColumnRole::Parish { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect();
    if plan.long_format {
        for row in 0..table.row_count() {
            if let Some(name) = table.cell(row, PARISH_NAME_COLUMN) {
                let cleaned = clean_name(name);
                if is_valid_parish_name(&cleaned) {
                    names.push(cleaned);
                }
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeriodMode;

    #[test]
    fn weekly_columns_split_measure_suffixes() {
        assert_eq!(
            classify_column("st_alban_woodstreet_buried", SourceKind::Weekly, false),
            ColumnRole::Parish { name: "St Alban Woodstreet".into(), measure: MeasureKind::Buried }
        );
        assert_eq!(
            classify_column("alhallows_barking_baptized", SourceKind::Weekly, false),
            ColumnRole::Parish { name: "Alhallows Barking".into(), measure: MeasureKind::Christened }
        );
        assert_eq!(
            classify_column("st_olave_plague", SourceKind::Weekly, false),
            ColumnRole::Parish { name: "St Olave".into(), measure: MeasureKind::Plague }
        );
    }

    #[test]
    fn aggregate_labels_become_subtotals() {
        assert_eq!(
            classify_column("parishes_within_the_walls_buried", SourceKind::Weekly, false),
            ColumnRole::Subtotal { category: "Within the walls".into(), measure: MeasureKind::Buried }
        );
        assert_eq!(
            classify_column("christened_in_the_97_parishes_within_the_walls", SourceKind::General, false),
            ColumnRole::Subtotal { category: "Within the walls".into(), measure: MeasureKind::Christened }
        );
        assert_eq!(
            classify_column("plague_in_the_16_parishes_without_the_walls", SourceKind::General, false),
            ColumnRole::Subtotal { category: "Without the walls".into(), measure: MeasureKind::Plague }
        );
        assert_eq!(
            classify_column("subtotal_buried", SourceKind::Weekly, false),
            ColumnRole::Subtotal { category: "Total".into(), measure: MeasureKind::Buried }
        );
        assert_eq!(
            classify_column("total_buried", SourceKind::Weekly, false),
            ColumnRole::Subtotal { category: "Total".into(), measure: MeasureKind::Buried }
        );
    }

    #[test]
    fn general_bill_parish_columns_default_to_burials() {
        assert_eq!(
            classify_column("st_alban_woodstreet", SourceKind::General, false),
            ColumnRole::Parish { name: "St Alban Woodstreet".into(), measure: MeasureKind::Buried }
        );
        assert_eq!(
            classify_column("s_sepulchres_parish", SourceKind::General, false),
            ColumnRole::Parish { name: "S Sepulchres Parish".into(), measure: MeasureKind::Buried }
        );
        assert_eq!(classify_column("notes", SourceKind::General, false), ColumnRole::Ignored);
    }

    #[test]
    fn flags_and_metadata_are_not_observations() {
        assert_eq!(classify_column("year", SourceKind::Weekly, false), ColumnRole::Metadata);
        assert_eq!(
            classify_column("is_illegible_st_olave_buried", SourceKind::Weekly, false),
            ColumnRole::IllegibleFlag { target: "st_olave_buried".into() }
        );
        assert_eq!(
            classify_column("is_missing_st_olave_buried", SourceKind::Weekly, false),
            ColumnRole::MissingFlag { target: "st_olave_buried".into() }
        );
        assert_eq!(classify_column("drowned_descriptive_text", SourceKind::Causes, false), ColumnRole::Ignored);
    }

    #[test]
    fn causes_columns_keep_their_readable_name() {
        assert_eq!(classify_column("griping_in_the_guts", SourceKind::Causes, false), ColumnRole::Cause { name: "griping in the guts".into() });
        assert_eq!(classify_column("buried_male", SourceKind::Causes, false), ColumnRole::Ignored);
    }

    #[test]
    fn long_format_tables_read_counts_from_measure_columns() {
        let table = SourceTable::new(
            "millar_parishes", SourceKind::Weekly, PeriodMode::Register,
            vec!["year".into(), "parish_name".into(), "buried".into(), "plague".into(), "notes".into()],
            vec![
                vec!["1665".into(), "St Olave  Hart street".into(), "3".into(), "1".into(), "".into()],
                vec!["1665".into(), "Total of all Burials".into(), "300".into(), "".into(), "".into()],
            ],
        );
        let plan = plan_columns(&table);
        assert!(plan.long_format);
        let roles: Vec<_> = plan.observation_columns().map(|(c, _)| c.to_string()).collect();
        assert_eq!(roles, vec!["buried", "plague"]);
        assert_eq!(parish_name_candidates(&table, &plan), vec!["St Olave Hart street".to_string()]);
    }

    #[test]
    fn subtotal_categories_are_normalized() {
        assert_eq!(subtotal_category("buried in the 16 parishes without the walls"), "Without the walls");
        assert_eq!(subtotal_category("Christened in the 12 out-parishes in Middlesex and Surrey"), "Middlesex and Surrey");
        assert_eq!(subtotal_category("buried in the 5 parishes in the city and liberties of westminster"), "Westminster");
        assert_eq!(subtotal_category("total of all burials"), "Total");
        assert_eq!(subtotal_category("Totall of burials"), "Total");
    }
}
