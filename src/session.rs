//! Per-session editing state
//!
//! A session works on its own copy of each unit's rows. The copy is created
//! the first time the unit is selected, edited one cell at a time, and
//! rebuilt from the base table on reset. Nothing here is ever persisted.

use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::metrics::{self, AggregateMetrics, GoalTracked, IndicatorStatistics, ProjectedMetric};
use crate::models::{BaseTable, IndicatorRecord};
use crate::normalize::{AnnualGoal, Month, MonthlySeries};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown performance unit: {0}")]
    UnknownUnit(String),
    #[error("No performance unit selected")]
    NoUnitSelected,
    #[error("Row {row} out of range ({rows} rows in unit)")]
    RowOutOfRange { row: usize, rows: usize },
    #[error("Invalid monthly value {0}: must be a percentage between 0 and 100")]
    InvalidValue(f64),
}

/// Editable copy of one indicator row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverrideRow {
    pub indicator_id: f64,
    pub description: String,
    pub annual_goal: AnnualGoal,
    pub weighting_display: String,
    pub monthly_values: MonthlySeries,
}

impl From<&IndicatorRecord> for OverrideRow {
    fn from(record: &IndicatorRecord) -> Self {
        Self {
            indicator_id: record.indicator_id,
            description: record.description.clone(),
            annual_goal: record.annual_goal.clone(),
            weighting_display: record.weighting.display().to_string(),
            monthly_values: record.monthly_values,
        }
    }
}

impl GoalTracked for OverrideRow {
    fn indicator_id(&self) -> f64 {
        self.indicator_id
    }

    fn annual_goal(&self) -> &AnnualGoal {
        &self.annual_goal
    }

    fn monthly_values(&self) -> &MonthlySeries {
        &self.monthly_values
    }
}

/// The editable rows of one unit, in sheet order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOverride {
    unit: String,
    rows: Vec<OverrideRow>,
}

impl SessionOverride {
    pub fn from_base(base: &BaseTable, unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            rows: base.records_for_unit(unit).map(OverrideRow::from).collect(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn rows(&self) -> &[OverrideRow] {
        &self.rows
    }

    /// Set one month of one row. `None` clears the cell.
    pub fn set_cell(
        &mut self,
        row: usize,
        month: Month,
        value: Option<f64>,
    ) -> Result<&OverrideRow, SessionError> {
        if let Some(v) = value {
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(SessionError::InvalidValue(v));
            }
        }

        let rows = self.rows.len();
        let target = self
            .rows
            .get_mut(row)
            .ok_or(SessionError::RowOutOfRange { row, rows })?;
        target.monthly_values.set(month, value);
        Ok(target)
    }

    pub fn projections(&self) -> Vec<ProjectedMetric> {
        self.rows.iter().map(GoalTracked::project).collect()
    }

    pub fn statistics(&self) -> Vec<IndicatorStatistics> {
        self.rows
            .iter()
            .map(|row| metrics::statistics(&row.monthly_values))
            .collect()
    }

    pub fn aggregate(&self) -> AggregateMetrics {
        metrics::aggregate(&self.rows)
    }
}

/// Editing state of one client session: which unit is selected and the
/// overrides created so far, keyed by unit name.
#[derive(Debug, Clone)]
pub struct DashboardSession {
    base: Arc<BaseTable>,
    selected_unit: Option<String>,
    overrides: HashMap<String, SessionOverride>,
}

impl DashboardSession {
    pub fn new(base: Arc<BaseTable>) -> Self {
        Self {
            base,
            selected_unit: None,
            overrides: HashMap::new(),
        }
    }

    pub fn base(&self) -> &BaseTable {
        &self.base
    }

    pub fn selected_unit(&self) -> Option<&str> {
        self.selected_unit.as_deref()
    }

    /// Select a unit, creating its override from the base table on first
    /// access. Earlier edits to the unit are kept.
    pub fn select_unit(&mut self, unit: &str) -> Result<&SessionOverride, SessionError> {
        if !self.base.contains_unit(unit) {
            return Err(SessionError::UnknownUnit(unit.to_string()));
        }

        let base = &self.base;
        let session_override = self.overrides.entry(unit.to_string()).or_insert_with(|| {
            debug!("Creating override for unit {}", unit);
            SessionOverride::from_base(base, unit)
        });
        self.selected_unit = Some(unit.to_string());
        Ok(session_override)
    }

    /// Override of the selected unit.
    pub fn current(&self) -> Result<&SessionOverride, SessionError> {
        let unit = self.selected_unit.as_ref().ok_or(SessionError::NoUnitSelected)?;
        self.overrides.get(unit).ok_or(SessionError::NoUnitSelected)
    }

    pub fn override_for(&self, unit: &str) -> Option<&SessionOverride> {
        self.overrides.get(unit)
    }

    pub fn edit_cell(
        &mut self,
        row: usize,
        month: Month,
        value: Option<f64>,
    ) -> Result<&OverrideRow, SessionError> {
        let unit = self.selected_unit.as_ref().ok_or(SessionError::NoUnitSelected)?;
        let session_override = self
            .overrides
            .get_mut(unit)
            .ok_or(SessionError::NoUnitSelected)?;
        debug!("Editing {} row {} {}: {:?}", unit, row, month, value);
        session_override.set_cell(row, month, value)
    }

    /// Discard the selected unit's edits and rebuild it from the base table.
    pub fn reset(&mut self) -> Result<&SessionOverride, SessionError> {
        let unit = self
            .selected_unit
            .clone()
            .ok_or(SessionError::NoUnitSelected)?;
        info!("Resetting override for unit {}", unit);
        let fresh = SessionOverride::from_base(&self.base, &unit);
        let session_override = match self.overrides.entry(unit) {
            Entry::Occupied(mut entry) => {
                entry.insert(fresh);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(fresh),
        };
        Ok(session_override)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::SheetRow;
    use crate::metrics::Verdict;

    fn sheet_row(unit: &str, indicator: &str, goal: &str, months: &[&str]) -> SheetRow {
        SheetRow {
            line: 0,
            unit: Some(unit.to_string()),
            indicator: Some(indicator.to_string()),
            annual_goal: Some(goal.to_string()),
            weighting: Some("0,5".to_string()),
            months: std::array::from_fn(|m| months.get(m).map(|v| v.to_string())),
            ..Default::default()
        }
    }

    fn base() -> Arc<BaseTable> {
        let rows = vec![
            sheet_row("Hospital", "1", "0,85", &["0,8", "0,86"]),
            sheet_row("APS", "2", "Según glosa", &["0,5"]),
            sheet_row("Hospital", "3", "≥70%", &[]),
        ];
        Arc::new(BaseTable::from_rows(rows).unwrap())
    }

    #[test]
    fn test_select_unit_creates_override_lazily() {
        let mut session = DashboardSession::new(base());
        assert!(session.override_for("Hospital").is_none());

        let created = session.select_unit("Hospital").unwrap();
        assert_eq!(created.unit(), "Hospital");
        assert_eq!(created.rows().len(), 2);
        assert_eq!(created.rows()[0].weighting_display, "50.0%");
        assert_eq!(session.selected_unit(), Some("Hospital"));
        assert!(session.override_for("Hospital").is_some());
        assert!(session.override_for("APS").is_none());
    }

    #[test]
    fn test_select_unknown_unit() {
        let mut session = DashboardSession::new(base());
        assert_eq!(
            session.select_unit("Urgencia").unwrap_err(),
            SessionError::UnknownUnit("Urgencia".to_string())
        );
        assert_eq!(session.selected_unit(), None);
    }

    #[test]
    fn test_edits_survive_switching_units() {
        let mut session = DashboardSession::new(base());
        session.select_unit("Hospital").unwrap();
        session.edit_cell(0, Month::March, Some(100.0)).unwrap();

        session.select_unit("APS").unwrap();
        let hospital = session.select_unit("Hospital").unwrap();
        assert_eq!(hospital.rows()[0].monthly_values.get(Month::March), Some(100.0));
    }

    #[test]
    fn test_edit_cell_changes_projection() {
        let mut session = DashboardSession::new(base());
        session.select_unit("Hospital").unwrap();

        let before = session.current().unwrap().projections();
        assert_eq!(before[0].verdict, Verdict::Fails);
        assert_eq!(before[1].verdict, Verdict::NotApplicable);

        session.edit_cell(0, Month::March, Some(100.0)).unwrap();
        let edited = session.edit_cell(1, Month::January, Some(75.0)).unwrap();
        assert_eq!(edited.monthly_values.get(Month::January), Some(75.0));

        let after = session.current().unwrap().projections();
        assert_eq!(after[0].verdict, Verdict::Meets);
        assert_eq!(after[1].projected, Some(75.0));
        assert_eq!(after[1].verdict, Verdict::Meets);
    }

    #[test]
    fn test_edit_cell_clears_value() {
        let mut session = DashboardSession::new(base());
        session.select_unit("APS").unwrap();
        session.edit_cell(0, Month::January, None).unwrap();

        let projection = session.current().unwrap().projections()[0];
        assert_eq!(projection.projected, None);
        assert_eq!(projection.verdict, Verdict::NotApplicable);
    }

    #[test]
    fn test_edit_cell_errors() {
        let mut session = DashboardSession::new(base());
        assert_eq!(
            session.edit_cell(0, Month::May, Some(50.0)).unwrap_err(),
            SessionError::NoUnitSelected
        );

        session.select_unit("Hospital").unwrap();
        assert_eq!(
            session.edit_cell(5, Month::May, Some(50.0)).unwrap_err(),
            SessionError::RowOutOfRange { row: 5, rows: 2 }
        );
        assert_eq!(
            session.edit_cell(0, Month::May, Some(120.0)).unwrap_err(),
            SessionError::InvalidValue(120.0)
        );
        assert!(matches!(
            session.edit_cell(0, Month::May, Some(f64::NAN)),
            Err(SessionError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_reset_restores_base_rows() {
        let table = base();
        let mut session = DashboardSession::new(table.clone());
        session.select_unit("Hospital").unwrap();
        let original = session.current().unwrap().clone();

        session.edit_cell(0, Month::January, Some(10.0)).unwrap();
        session.edit_cell(1, Month::December, Some(99.0)).unwrap();
        assert_ne!(session.current().unwrap(), &original);

        let restored = session.reset().unwrap();
        assert_eq!(restored, &original);

        let expected: Vec<OverrideRow> = table
            .records_for_unit("Hospital")
            .map(OverrideRow::from)
            .collect();
        assert_eq!(restored.rows(), expected.as_slice());
    }

    #[test]
    fn test_reset_without_selection() {
        let mut session = DashboardSession::new(base());
        assert_eq!(session.reset().unwrap_err(), SessionError::NoUnitSelected);
    }

    #[test]
    fn test_statistics_and_aggregate() {
        let mut session = DashboardSession::new(base());
        let hospital = session.select_unit("Hospital").unwrap();

        let stats = hospital.statistics();
        assert_eq!(stats[0].months_recorded, 2);
        assert_eq!(stats[1].months_recorded, 0);

        let aggregate = hospital.aggregate();
        let best = aggregate.best.unwrap();
        assert_eq!(best.indicator_id, 1.0);
        assert!((aggregate.global_mean.unwrap() - 83.0).abs() < 1e-9);
    }
}
