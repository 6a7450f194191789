//! Date-aligned multi-variable daily series.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::time::DateRange;
use crate::variable::Variable;

/// One row per date, one column per variable, no missing cells.
///
/// Dates are strictly ascending and every column has one value per date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignedSeries {
    dates: Vec<NaiveDate>,
    columns: BTreeMap<Variable, Vec<f64>>,
}

impl AlignedSeries {
    /// Empty series over the given dates; they are sorted and deduplicated.
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        let dates: Vec<NaiveDate> = dates.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        Self {
            dates,
            columns: BTreeMap::new(),
        }
    }

    /// Build from rows; every row must carry the same variables.
    pub fn from_rows(rows: BTreeMap<NaiveDate, BTreeMap<Variable, f64>>) -> GridResult<Self> {
        let mut series = Self::new(rows.keys().copied().collect());
        let Some(first) = rows.values().next() else {
            return Ok(series);
        };
        for var in first.keys() {
            let values = rows
                .iter()
                .map(|(date, row)| {
                    row.get(var).copied().ok_or_else(|| {
                        GridError::SeriesMismatch(format!("{} missing on {}", var, date))
                    })
                })
                .collect::<GridResult<Vec<f64>>>()?;
            series.columns.insert(*var, values);
        }
        if rows.values().any(|row| row.len() != series.columns.len()) {
            return Err(GridError::SeriesMismatch("rows carry different variables".into()));
        }
        Ok(series)
    }

    pub fn insert_column(&mut self, variable: Variable, values: Vec<f64>) -> GridResult<()> {
        if values.len() != self.dates.len() {
            return Err(GridError::SeriesMismatch(format!(
                "{} has {} values for {} dates",
                variable,
                values.len(),
                self.dates.len()
            )));
        }
        self.columns.insert(variable, values);
        Ok(())
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column(&self, variable: Variable) -> Option<&[f64]> {
        self.columns.get(&variable).map(|v| v.as_slice())
    }

    pub fn column_mut(&mut self, variable: Variable) -> Option<&mut Vec<f64>> {
        self.columns.get_mut(&variable)
    }

    pub fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.columns.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.dates.binary_search(&date).is_ok()
    }

    /// All variables on one date.
    pub fn row(&self, date: NaiveDate) -> Option<BTreeMap<Variable, f64>> {
        let i = self.dates.binary_search(&date).ok()?;
        Some(self.columns.iter().map(|(v, col)| (*v, col[i])).collect())
    }

    /// Rows as a date-keyed map.
    pub fn to_rows(&self) -> BTreeMap<NaiveDate, BTreeMap<Variable, f64>> {
        self.dates
            .iter()
            .enumerate()
            .map(|(i, d)| (*d, self.columns.iter().map(|(v, col)| (*v, col[i])).collect()))
            .collect()
    }

    /// Rows whose date falls in `range`.
    pub fn trim(&self, range: DateRange) -> AlignedSeries {
        let keep: Vec<usize> = (0..self.dates.len())
            .filter(|i| range.contains(self.dates[*i]))
            .collect();
        AlignedSeries {
            dates: keep.iter().map(|i| self.dates[*i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(v, col)| (*v, keep.iter().map(|i| col[*i]).collect()))
                .collect(),
        }
    }

    /// Union of both series by date; rows of `self` win where dates overlap.
    pub fn merge_preferring(&self, other: &AlignedSeries) -> GridResult<AlignedSeries> {
        let mut rows = other.to_rows();
        rows.extend(self.to_rows());
        AlignedSeries::from_rows(rows)
    }
}
