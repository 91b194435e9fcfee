use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::fetcher::SheetRow;
use crate::normalize::{fix_encoding, AnnualGoal, MonthlySeries, Weighting};

const MISSING_DESCRIPTION: &str = "Sin descripción";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowRejected {
    #[error("row has no performance unit")]
    MissingUnit,
    #[error("indicator id {0:?} is not numeric")]
    NonNumericIndicator(Option<String>),
}

/// One normalized row of the goals sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRecord {
    pub unit: String,
    pub indicator_id: f64,
    pub description: String,
    pub formula: String,
    pub indicator_type: String,
    pub periodicity: String,
    pub annual_goal: AnnualGoal,
    pub weighting: Weighting,
    pub monthly_values: MonthlySeries,
}

impl IndicatorRecord {
    pub fn from_row(row: &SheetRow) -> Result<Self, RowRejected> {
        let unit = row
            .unit
            .as_deref()
            .map(|u| fix_encoding(u.trim()))
            .filter(|u| !u.is_empty())
            .ok_or(RowRejected::MissingUnit)?;

        let indicator_id = row
            .indicator
            .as_deref()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|id| id.is_finite())
            .ok_or_else(|| RowRejected::NonNumericIndicator(row.indicator.clone()))?;

        let description = row
            .description
            .as_deref()
            .map(text_cell)
            .unwrap_or_else(|| MISSING_DESCRIPTION.to_string());

        Ok(Self {
            unit,
            indicator_id,
            description,
            formula: row.formula.as_deref().map(text_cell).unwrap_or_default(),
            indicator_type: row
                .indicator_type
                .as_deref()
                .map(text_cell)
                .unwrap_or_default(),
            periodicity: row.periodicity.as_deref().map(text_cell).unwrap_or_default(),
            annual_goal: AnnualGoal::parse(row.annual_goal.as_deref()),
            weighting: Weighting::parse(row.weighting.as_deref()),
            monthly_values: MonthlySeries::from_cells(row.months.iter().map(Option::as_deref)),
        })
    }

    /// Short label used by charts and rankings: "Ind. 3".
    pub fn label(&self) -> String {
        indicator_label(self.indicator_id)
    }
}

pub fn indicator_label(indicator_id: f64) -> String {
    if indicator_id.fract() == 0.0 {
        format!("Ind. {}", indicator_id as i64)
    } else {
        format!("Ind. {indicator_id}")
    }
}

fn text_cell(raw: &str) -> String {
    fix_encoding(raw.trim())
}

/// The normalized sheet as loaded from the source. Never mutated after
/// construction; a refresh builds a new table.
#[derive(Debug, Clone, Serialize)]
pub struct BaseTable {
    records: Vec<IndicatorRecord>,
    fetched_at: DateTime<Utc>,
    rejected_rows: usize,
}

impl BaseTable {
    #[instrument(skip(rows), fields(row_count = rows.len()))]
    pub fn from_rows(rows: Vec<SheetRow>) -> Result<Self, FetchError> {
        let mut records = Vec::with_capacity(rows.len());
        let mut rejected_rows = 0;

        for row in &rows {
            match IndicatorRecord::from_row(row) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    debug!("Dropping sheet row at line {}: {}", row.line, reason);
                    rejected_rows += 1;
                }
            }
        }

        if records.is_empty() {
            warn!("No usable rows in sheet ({} rejected)", rejected_rows);
            return Err(FetchError::NoRecords {
                rejected: rejected_rows,
            });
        }

        Ok(Self {
            records,
            fetched_at: Utc::now(),
            rejected_rows,
        })
    }

    pub fn records(&self) -> &[IndicatorRecord] {
        &self.records
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn rejected_rows(&self) -> usize {
        self.rejected_rows
    }

    /// Distinct units in order of first appearance.
    pub fn units(&self) -> Vec<&str> {
        let mut units: Vec<&str> = Vec::new();
        for record in &self.records {
            if !units.contains(&record.unit.as_str()) {
                units.push(&record.unit);
            }
        }
        units
    }

    pub fn contains_unit(&self, unit: &str) -> bool {
        self.records.iter().any(|r| r.unit == unit)
    }

    /// Records of one unit, in sheet order.
    pub fn records_for_unit<'a>(
        &'a self,
        unit: &'a str,
    ) -> impl Iterator<Item = &'a IndicatorRecord> + 'a {
        self.records.iter().filter(move |r| r.unit == unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Month;

    fn row(unit: Option<&str>, indicator: Option<&str>) -> SheetRow {
        SheetRow {
            line: 2,
            unit: unit.map(str::to_string),
            indicator: indicator.map(str::to_string),
            description: Some("DiagnÃ³stico oportuno".to_string()),
            formula: Some("N° casos / total".to_string()),
            indicator_type: Some("Resultado".to_string()),
            periodicity: Some("Mensual".to_string()),
            annual_goal: Some("â‰¥90%".to_string()),
            weighting: Some("0,2".to_string()),
            months: std::array::from_fn(|m| (m < 3).then(|| "0,9".to_string())),
        }
    }

    #[test]
    fn test_from_row_normalizes_every_column() {
        let record = IndicatorRecord::from_row(&row(Some(" GestiÃ³n ClÃ­nica "), Some("3"))).unwrap();

        assert_eq!(record.unit, "Gestión Clínica");
        assert_eq!(record.indicator_id, 3.0);
        assert_eq!(record.description, "Diagnóstico oportuno");
        assert_eq!(record.annual_goal.display(), "≥90.0%");
        assert_eq!(record.annual_goal.value(), Some(90.0));
        assert_eq!(record.weighting.display(), "20.0%");
        assert!((record.monthly_values.get(Month::March).unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(record.monthly_values.get(Month::April), None);
    }

    #[test]
    fn test_from_row_rejects_missing_unit() {
        assert_eq!(
            IndicatorRecord::from_row(&row(None, Some("1"))),
            Err(RowRejected::MissingUnit)
        );
        assert_eq!(
            IndicatorRecord::from_row(&row(Some("   "), Some("1"))),
            Err(RowRejected::MissingUnit)
        );
    }

    #[test]
    fn test_from_row_rejects_non_numeric_indicator() {
        assert_eq!(
            IndicatorRecord::from_row(&row(Some("APS"), Some("Total"))),
            Err(RowRejected::NonNumericIndicator(Some("Total".to_string())))
        );
        assert_eq!(
            IndicatorRecord::from_row(&row(Some("APS"), None)),
            Err(RowRejected::NonNumericIndicator(None))
        );
        assert!(IndicatorRecord::from_row(&row(Some("APS"), Some("NaN"))).is_err());
    }

    #[test]
    fn test_missing_description_gets_placeholder() {
        let mut sheet_row = row(Some("APS"), Some("1"));
        sheet_row.description = None;
        sheet_row.formula = None;
        let record = IndicatorRecord::from_row(&sheet_row).unwrap();
        assert_eq!(record.description, "Sin descripción");
        assert_eq!(record.formula, "");
    }

    #[test]
    fn test_indicator_label() {
        assert_eq!(indicator_label(3.0), "Ind. 3");
        assert_eq!(indicator_label(2.5), "Ind. 2.5");
    }

    #[test]
    fn test_base_table_drops_rejected_rows_and_keeps_unit_order() {
        let rows = vec![
            row(Some("Hospital"), Some("1")),
            row(None, Some("2")),
            row(Some("APS"), Some("3")),
            row(Some("Hospital"), Some("x")),
            row(Some("Hospital"), Some("4")),
        ];

        let table = BaseTable::from_rows(rows).unwrap();
        assert_eq!(table.records().len(), 3);
        assert_eq!(table.rejected_rows(), 2);
        assert_eq!(table.units(), vec!["Hospital", "APS"]);
        assert!(table.contains_unit("APS"));
        assert!(!table.contains_unit("Urgencia"));

        let hospital: Vec<f64> = table
            .records_for_unit("Hospital")
            .map(|r| r.indicator_id)
            .collect();
        assert_eq!(hospital, vec![1.0, 4.0]);
    }

    #[test]
    fn test_base_table_with_no_usable_rows() {
        let result = BaseTable::from_rows(vec![row(None, Some("1"))]);
        assert!(matches!(result, Err(FetchError::NoRecords { rejected: 1 })));
    }
}
