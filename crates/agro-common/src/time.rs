//! Calendar helpers for daily series.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> GridResult<Self> {
        if from > to {
            return Err(GridError::InvalidDateRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// Number of days in the range, both ends included.
    pub fn len(&self) -> usize {
        ((self.to - self.from).num_days() + 1).max(0) as usize
    }

    /// A range built by [`DateRange::new`] holds at least one day; only one
    /// assembled from reversed public fields is empty.
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// Every day in the range, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let from = self.from;
        (0..self.len() as i64).map(move |i| from + Duration::days(i))
    }
}

/// Day of year scaled to a fraction of a 365-day year.
pub fn year_fraction(date: NaiveDate) -> f64 {
    date.ordinal() as f64 / 365.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_days_are_inclusive() {
        let range = DateRange::new(d(2023, 1, 30), d(2023, 2, 2)).unwrap();
        let days: Vec<_> = range.days().collect();
        assert_eq!(days, vec![d(2023, 1, 30), d(2023, 1, 31), d(2023, 2, 1), d(2023, 2, 2)]);
        assert_eq!(range.len(), 4);
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        assert!(DateRange::new(d(2023, 2, 1), d(2023, 1, 1)).is_err());
    }

    #[test]
    fn test_emptiness() {
        let single = DateRange::new(d(2023, 1, 1), d(2023, 1, 1)).unwrap();
        assert!(!single.is_empty());
        assert_eq!(single.len(), 1);

        let reversed = DateRange {
            from: d(2023, 2, 1),
            to: d(2023, 1, 1),
        };
        assert!(reversed.is_empty());
        assert_eq!(reversed.len(), 0);
        assert_eq!(reversed.days().count(), 0);
    }

    #[test]
    fn test_year_fraction() {
        assert!((year_fraction(d(2023, 1, 1)) - 1.0 / 365.0).abs() < 1e-12);
        assert!((year_fraction(d(2023, 12, 31)) - 1.0).abs() < 1e-12);
    }
}
