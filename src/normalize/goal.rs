//! Annual goal ("Meta Anual") parsing
//!
//! The goal column mixes several conventions:
//! - plain decimal fractions: "0,85" or "0.85" (85%)
//! - plain percentages: "85"
//! - percentage strings, optionally bounded: "85%", "≥85%", "≥ 85,5 %"
//! - glossary notes with no number at all: "Cumplimiento según normativa"
//!
//! An explicit "%" always means the number is already a percentage. Bare
//! numbers in (0, 1] are fractions and get scaled by 100; any other bare
//! number is taken as a percentage.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

use super::format_percent;
use super::text::fix_encoding;

const AT_LEAST: char = '≥';

/// Number immediately followed by a percent sign (whitespace allowed).
fn percent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d*)?)\s*%").expect("percent pattern is a valid regex")
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualGoal {
    display: String,
    value: Option<f64>,
    comparable: bool,
}

impl AnnualGoal {
    /// Parse a raw goal cell. Never fails: anything without a usable number
    /// becomes a non-comparable glossary goal.
    pub fn parse(raw: Option<&str>) -> Self {
        let cleaned = fix_encoding(raw.unwrap_or_default().trim());

        let at_least = cleaned.contains(AT_LEAST);
        let numeric = cleaned.replace(',', ".").replace(AT_LEAST, "");
        let numeric = numeric.trim();

        let value = if numeric.contains('%') {
            percent_pattern()
                .captures(numeric)
                .and_then(|caps| caps[1].parse::<f64>().ok())
                .filter(|v| v.is_finite())
        } else {
            numeric
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| if v > 0.0 && v <= 1.0 { v * 100.0 } else { v })
        };

        match value {
            Some(percentage) => {
                debug!("Parsed annual goal '{}' as {:.1}%", cleaned, percentage);
                Self::comparable(percentage, at_least)
            }
            None => {
                debug!("Annual goal '{}' has no numeric target", cleaned);
                Self::glossary(cleaned)
            }
        }
    }

    fn comparable(percentage: f64, at_least: bool) -> Self {
        let display = if at_least {
            format!("{AT_LEAST}{}", format_percent(percentage))
        } else {
            format_percent(percentage)
        };
        Self {
            display,
            value: Some(percentage),
            comparable: true,
        }
    }

    fn glossary(text: String) -> Self {
        Self {
            display: text,
            value: None,
            comparable: false,
        }
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    /// Target percentage on the 0-100 scale; only present for comparable goals.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_comparable(&self) -> bool {
        self.comparable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_goal(raw: &str, display: &str, value: f64) {
        let goal = AnnualGoal::parse(Some(raw));
        assert_eq!(goal.display(), display, "display for {raw:?}");
        assert!(goal.is_comparable(), "{raw:?} should be comparable");
        let parsed = goal.value().expect("comparable goal has a value");
        assert!((parsed - value).abs() < 1e-9, "{raw:?} parsed as {parsed}");
    }

    #[test]
    fn test_at_least_percentage() {
        assert_goal("≥85%", "≥85.0%", 85.0);
        assert_goal("≥ 90 %", "≥90.0%", 90.0);
        assert_goal("  ≥70,5%  ", "≥70.5%", 70.5);
    }

    #[test]
    fn test_mis_encoded_at_least_symbol() {
        assert_goal("â‰¥85%", "≥85.0%", 85.0);
    }

    #[test]
    fn test_bare_integer_is_percentage() {
        assert_goal("85", "85.0%", 85.0);
        assert_goal("100", "100.0%", 100.0);
    }

    #[test]
    fn test_bare_fraction_is_scaled() {
        assert_goal("0.85", "85.0%", 85.0);
        assert_goal("0,85", "85.0%", 85.0);
        assert_goal("1", "100.0%", 100.0);
        assert_goal("≥0,9", "≥90.0%", 90.0);
    }

    #[test]
    fn test_explicit_percent_is_never_scaled() {
        assert_goal("0.5%", "0.5%", 0.5);
        assert_goal("1%", "1.0%", 1.0);
    }

    #[test]
    fn test_percentage_inside_text() {
        assert_goal("Al menos 80% de cobertura", "80.0%", 80.0);
    }

    #[test]
    fn test_zero_is_a_percentage() {
        assert_goal("0", "0.0%", 0.0);
    }

    #[test]
    fn test_glossary_text() {
        let goal = AnnualGoal::parse(Some("  Cumplimiento según normativa "));
        assert_eq!(goal.display(), "Cumplimiento según normativa");
        assert_eq!(goal.value(), None);
        assert!(!goal.is_comparable());
    }

    #[test]
    fn test_glossary_text_is_encoding_fixed() {
        let goal = AnnualGoal::parse(Some("SegÃºn glosa"));
        assert_eq!(goal.display(), "Según glosa");
        assert!(!goal.is_comparable());
    }

    #[test]
    fn test_percent_sign_without_number_is_glossary() {
        let goal = AnnualGoal::parse(Some("% de pacientes"));
        assert_eq!(goal.display(), "% de pacientes");
        assert_eq!(goal.value(), None);
        assert!(!goal.is_comparable());
    }

    #[test]
    fn test_empty_and_missing() {
        for raw in [None, Some(""), Some("   ")] {
            let goal = AnnualGoal::parse(raw);
            assert_eq!(goal.display(), "");
            assert_eq!(goal.value(), None);
            assert!(!goal.is_comparable());
        }
    }

    #[test]
    fn test_overflowing_percentage_is_glossary() {
        let raw = format!("{}%", "9".repeat(400));
        let goal = AnnualGoal::parse(Some(&raw));
        assert_eq!(goal.value(), None);
        assert!(!goal.is_comparable());
    }

    #[test]
    fn test_non_finite_is_glossary() {
        let goal = AnnualGoal::parse(Some("nan"));
        assert!(!goal.is_comparable());
        assert_eq!(goal.display(), "nan");
    }
}
