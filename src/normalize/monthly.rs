//! Monthly compliance series
//!
//! The sheet stores each month as a fraction of one with a decimal comma
//! ("0,75"). Parsed values are kept on the 0-100 percentage scale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::parse_decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    /// Zero-based slot in a [`MonthlySeries`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Calendar month number (1-12).
    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown month: {0}")]
pub struct UnknownMonth(pub String);

impl FromStr for Month {
    type Err = UnknownMonth;

    /// Accepts English month names (any case) or the month number 1-12.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<usize>() {
            return number
                .checked_sub(1)
                .and_then(|idx| Month::ALL.get(idx).copied())
                .ok_or_else(|| UnknownMonth(s.to_string()));
        }
        Month::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownMonth(s.to_string()))
    }
}

/// Twelve monthly percentages, January first. A slot is `None` when the
/// month has no usable value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MonthlySeries([Option<f64>; 12]);

impl MonthlySeries {
    pub fn new(values: [Option<f64>; 12]) -> Self {
        Self(values)
    }

    /// Normalize the twelve raw month cells of a sheet row.
    pub fn from_cells<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut values = [None; 12];
        for (slot, cell) in values.iter_mut().zip(cells) {
            *slot = parse_monthly_cell(cell);
        }
        Self(values)
    }

    pub fn get(&self, month: Month) -> Option<f64> {
        self.0[month.index()]
    }

    pub fn set(&mut self, month: Month, value: Option<f64>) {
        self.0[month.index()] = value;
    }

    pub fn values(&self) -> &[Option<f64>; 12] {
        &self.0
    }

    /// Present values in month order.
    pub fn present(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().flatten().copied()
    }

    pub fn present_count(&self) -> usize {
        self.present().count()
    }

    /// Unrounded mean of the present values, `None` when every month is empty.
    pub fn mean(&self) -> Option<f64> {
        let count = self.present_count();
        if count == 0 {
            return None;
        }
        Some(self.present().sum::<f64>() / count as f64)
    }
}

/// Convert one raw month cell (a fraction of one) to a percentage.
///
/// Missing, blank or non-numeric cells are absent rather than errors.
pub fn parse_monthly_cell(raw: Option<&str>) -> Option<f64> {
    raw.and_then(parse_decimal)
        .map(|fraction| fraction * 100.0)
        .filter(|percentage| percentage.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_monthly_cell() {
        let value = parse_monthly_cell(Some("0,75")).unwrap();
        assert!((value - 75.0).abs() < 1e-9);
        assert_eq!(parse_monthly_cell(Some("")), None);
        assert_eq!(parse_monthly_cell(Some("abc")), None);
        assert_eq!(parse_monthly_cell(None), None);
    }

    #[test]
    fn test_parse_monthly_cell_overflow_is_absent() {
        assert_eq!(parse_monthly_cell(Some("1e307")), None);
        assert_eq!(parse_monthly_cell(Some("-1e307")), None);
    }

    #[test]
    fn test_parse_monthly_cell_accepts_point() {
        let value = parse_monthly_cell(Some("0.8")).unwrap();
        assert!((value - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_cells_keeps_month_order() {
        let mut cells = vec![None; 12];
        cells[0] = Some("0,5");
        cells[11] = Some("1");
        cells[5] = Some("n/a");

        let series = MonthlySeries::from_cells(cells);
        assert_eq!(series.values().len(), 12);
        assert_eq!(series.get(Month::January), Some(50.0));
        assert_eq!(series.get(Month::December), Some(100.0));
        assert_eq!(series.get(Month::June), None);
        assert_eq!(series.present_count(), 2);
    }

    #[test]
    fn test_from_cells_short_input_leaves_remaining_absent() {
        let series = MonthlySeries::from_cells([Some("0,1"), Some("0,2")]);
        assert_eq!(series.present_count(), 2);
        assert_eq!(series.get(Month::March), None);
    }

    #[test]
    fn test_mean() {
        let mut series = MonthlySeries::default();
        assert_eq!(series.mean(), None);

        series.set(Month::January, Some(80.0));
        series.set(Month::March, Some(90.0));
        assert_eq!(series.mean(), Some(85.0));
    }

    #[test]
    fn test_month_from_str() {
        assert_eq!("january".parse::<Month>().unwrap(), Month::January);
        assert_eq!("March".parse::<Month>().unwrap(), Month::March);
        assert_eq!("12".parse::<Month>().unwrap(), Month::December);
        assert!("0".parse::<Month>().is_err());
        assert!("13".parse::<Month>().is_err());
        assert!("Enero".parse::<Month>().is_err());
    }

    #[test]
    fn test_month_numbering() {
        assert_eq!(Month::January.index(), 0);
        assert_eq!(Month::December.number(), 12);
        assert_eq!(Month::ALL.len(), 12);
        assert_eq!(Month::September.to_string(), "September");
    }
}
