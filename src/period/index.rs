use std::collections::HashMap;

use crate::models::Period;

/// Append-only store of every period registered during a run.
///
/// Periods keep their registration order; lookups by year return them in that
/// order so "earliest registered" is well defined.
#[derive(Debug, Default)]
pub struct PeriodIndex {
    periods: Vec<Period>,
    by_key: HashMap<String, usize>,
    by_year: HashMap<i32, Vec<usize>>,
}

impl PeriodIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `period` unless its join key is already known. Returns true on insert.
    pub fn insert_if_absent(&mut self, period: Period) -> bool {
        if self.by_key.contains_key(&period.join_key) {
            return false;
        }
        let idx = self.periods.len();
        self.by_key.insert(period.join_key.clone(), idx);
        self.by_year.entry(period.year).or_default().push(idx);
        self.periods.push(period);
        true
    }

    pub fn get(&self, join_key: &str) -> Option<&Period> {
        self.by_key.get(join_key).map(|&idx| &self.periods[idx])
    }

    pub fn contains(&self, join_key: &str) -> bool {
        self.by_key.contains_key(join_key)
    }

    pub fn for_year(&self, year: i32) -> impl Iterator<Item = &Period> + '_ {
        self.by_year.get(&year).into_iter().flatten().map(move |&idx| &self.periods[idx])
    }

    pub fn earliest_for_year(&self, year: i32) -> Option<&Period> {
        self.for_year(year).next()
    }

    pub fn periods(&self) -> &[Period] { &self.periods }
    pub fn len(&self) -> usize { self.periods.len() }
    pub fn is_empty(&self) -> bool { self.periods.is_empty() }
}
