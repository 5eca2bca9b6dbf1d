pub mod calendar;
pub mod index;
pub mod resolver;

pub use index::PeriodIndex;
pub use resolver::{DateFragments, DerivedPeriod, ResolutionOutcome, TemporalKeyResolver};
