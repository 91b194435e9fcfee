//! Cell normalization for the published goals spreadsheet
//!
//! Every column of the sheet goes through one of these modules before it
//! becomes part of an IndicatorRecord:
//! - text: mis-encoded accents and comparison symbols
//! - goal: the annual goal cell ("≥85%", "0,85", glossary notes)
//! - monthly: twelve month cells as fractions of one
//! - weighting: the weighting fraction

pub mod goal;
pub mod monthly;
pub mod text;
pub mod weighting;

pub use goal::AnnualGoal;
pub use monthly::{Month, MonthlySeries};
pub use text::fix_encoding;
pub use weighting::Weighting;

/// Parse a locale-formatted decimal ("0,75" or "0.75") into a finite number.
///
/// Blank cells and anything that is not a finite number yield `None`.
pub(crate) fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Format a percentage with one decimal, the way every view displays it.
pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_accepts_comma_and_point() {
        assert_eq!(parse_decimal("0,75"), Some(0.75));
        assert_eq!(parse_decimal("0.75"), Some(0.75));
        assert_eq!(parse_decimal("  12 "), Some(12.0));
    }

    #[test]
    fn test_parse_decimal_rejects_blank_text_and_non_finite() {
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("   "), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("NaN"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(75.0), "75.0%");
        assert_eq!(format_percent(84.46), "84.5%");
    }
}
