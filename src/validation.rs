use thiserror::Error;

use crate::config::ValidationConfig;
use crate::models::ANNUAL_PERIOD_NUMBER;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("row has no parseable year")]
    MissingYear,
    #[error("year {year} outside ({min}, {max})")]
    YearOutOfRange { year: i32, min: i32, max: i32 },
    #[error("period number {0} outside 1-90")]
    PeriodNumberOutOfRange(u32),
    #[error("day {0} outside 1-31")]
    DayOutOfRange(u32),
}

impl ValidationFailure {
    pub fn kind_str(&self) -> &'static str {
        match self {
            ValidationFailure::MissingYear => "missing_year",
            ValidationFailure::YearOutOfRange { .. } => "year",
            ValidationFailure::PeriodNumberOutOfRange(_) => "period_number",
            ValidationFailure::DayOutOfRange(_) => "day",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Year bounds are exclusive.
    pub fn check_year(&self, year: i32) -> Result<(), ValidationFailure> {
        if year > self.config.min_year && year < self.config.max_year {
            Ok(())
        } else {
            Err(ValidationFailure::YearOutOfRange { year, min: self.config.min_year, max: self.config.max_year })
        }
    }

    pub fn check_period_number(&self, number: u32) -> Result<(), ValidationFailure> {
        if (1..=ANNUAL_PERIOD_NUMBER).contains(&number) {
            Ok(())
        } else {
            Err(ValidationFailure::PeriodNumberOutOfRange(number))
        }
    }

    pub fn check_day(&self, day: u32) -> Result<(), ValidationFailure> {
        if (1..=31).contains(&day) {
            Ok(())
        } else {
            Err(ValidationFailure::DayOutOfRange(day))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_bounds_are_exclusive() {
        let validator = Validator::new(ValidationConfig::default());
        assert!(validator.check_year(1665).is_ok());
        assert!(validator.check_year(1400).is_err());
        assert!(validator.check_year(1800).is_err());
        assert_eq!(
            validator.check_year(1066),
            Err(ValidationFailure::YearOutOfRange { year: 1066, min: 1400, max: 1800 })
        );
    }

    #[test]
    fn period_numbers_and_days() {
        let validator = Validator::new(ValidationConfig::default());
        assert!(validator.check_period_number(90).is_ok());
        assert!(validator.check_period_number(0).is_err());
        assert!(validator.check_period_number(91).is_err());
        assert!(validator.check_day(31).is_ok());
        assert_eq!(validator.check_day(32), Err(ValidationFailure::DayOutOfRange(32)));
    }
}
