use serde::Serialize;

use super::{format_percent, parse_decimal};

const NOT_AVAILABLE: &str = "N/A";

/// Weighting ("Ponderación") of an indicator within its unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weighting {
    /// Raw fraction as published (0.25 = 25%).
    numeric: Option<f64>,
    display: String,
}

impl Weighting {
    pub fn parse(raw: Option<&str>) -> Self {
        let numeric = raw.and_then(parse_decimal);
        let display = numeric
            .map(|fraction| format_percent(fraction * 100.0))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string());
        Self { numeric, display }
    }

    pub fn numeric(&self) -> Option<f64> {
        self.numeric
    }

    pub fn display(&self) -> &str {
        &self.display
    }
}
