//! JSON views returned by the API. Domain types stay free of presentation
//! concerns; everything the dashboard needs to render (labels, display
//! strings, verdicts) is assembled here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::metrics::{
    display_or_na, AggregateMetrics, GoalTracked, IndicatorStatistics, ProjectedMetric,
    RankedIndicator, UnitSummary, Verdict,
};
use crate::models::{indicator_label, BaseTable, IndicatorRecord};
use crate::normalize::{AnnualGoal, MonthlySeries, Weighting};
use crate::services::UnitOverview;
use crate::session::{OverrideRow, SessionOverride};

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub records: usize,
    pub units: usize,
    pub active_sessions: usize,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnitView {
    pub unit: String,
    pub indicator_count: usize,
}

impl From<UnitOverview> for UnitView {
    fn from(overview: UnitOverview) -> Self {
        Self {
            unit: overview.unit,
            indicator_count: overview.indicator_count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GoalView {
    pub display: String,
    pub value: Option<f64>,
    pub comparable: bool,
}

impl From<&AnnualGoal> for GoalView {
    fn from(goal: &AnnualGoal) -> Self {
        Self {
            display: goal.display().to_string(),
            value: goal.value(),
            comparable: goal.is_comparable(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WeightingView {
    /// Raw fraction (0.25 = 25%)
    pub numeric: Option<f64>,
    pub display: String,
}

impl From<&Weighting> for WeightingView {
    fn from(weighting: &Weighting) -> Self {
        Self {
            numeric: weighting.numeric(),
            display: weighting.display().to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectionView {
    pub projected: Option<f64>,
    pub projected_display: String,
    pub verdict: Verdict,
}

impl From<ProjectedMetric> for ProjectionView {
    fn from(metric: ProjectedMetric) -> Self {
        Self {
            projected: metric.projected,
            projected_display: metric.display(),
            verdict: metric.verdict,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordView {
    pub unit: String,
    pub indicator_id: f64,
    pub label: String,
    pub description: String,
    pub formula: String,
    pub indicator_type: String,
    pub periodicity: String,
    pub annual_goal: GoalView,
    pub weighting: WeightingView,
    /// Percentages January through December; null for months without data
    pub monthly_values: Vec<Option<f64>>,
    pub projection: ProjectionView,
}

impl From<&IndicatorRecord> for RecordView {
    fn from(record: &IndicatorRecord) -> Self {
        Self {
            unit: record.unit.clone(),
            indicator_id: record.indicator_id,
            label: record.label(),
            description: record.description.clone(),
            formula: record.formula.clone(),
            indicator_type: record.indicator_type.clone(),
            periodicity: record.periodicity.clone(),
            annual_goal: GoalView::from(&record.annual_goal),
            weighting: WeightingView::from(&record.weighting),
            monthly_values: monthly_vec(&record.monthly_values),
            projection: record.project().into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OverrideRowView {
    pub row: usize,
    pub indicator_id: f64,
    pub label: String,
    pub description: String,
    pub annual_goal: GoalView,
    pub weighting_display: String,
    pub monthly_values: Vec<Option<f64>>,
    pub projection: ProjectionView,
}

impl OverrideRowView {
    pub fn new(row: usize, data: &OverrideRow) -> Self {
        Self {
            row,
            indicator_id: data.indicator_id,
            label: indicator_label(data.indicator_id),
            description: data.description.clone(),
            annual_goal: GoalView::from(&data.annual_goal),
            weighting_display: data.weighting_display.clone(),
            monthly_values: monthly_vec(&data.monthly_values),
            projection: data.project().into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OverrideView {
    pub unit: String,
    pub rows: Vec<OverrideRowView>,
}

impl From<&SessionOverride> for OverrideView {
    fn from(session_override: &SessionOverride) -> Self {
        Self {
            unit: session_override.unit().to_string(),
            rows: session_override
                .rows()
                .iter()
                .enumerate()
                .map(|(row, data)| OverrideRowView::new(row, data))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RankedView {
    pub row: usize,
    pub indicator_id: f64,
    pub label: String,
    pub mean: f64,
    pub display: String,
}

impl From<RankedIndicator> for RankedView {
    fn from(ranked: RankedIndicator) -> Self {
        Self {
            row: ranked.position,
            indicator_id: ranked.indicator_id,
            label: indicator_label(ranked.indicator_id),
            mean: ranked.mean,
            display: display_or_na(Some(ranked.mean)),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AggregateView {
    pub global_mean: Option<f64>,
    pub global_mean_display: String,
    pub best: Option<RankedView>,
    pub worst: Option<RankedView>,
}

impl From<AggregateMetrics> for AggregateView {
    fn from(metrics: AggregateMetrics) -> Self {
        Self {
            global_mean: metrics.global_mean,
            global_mean_display: display_or_na(metrics.global_mean),
            best: metrics.best.map(RankedView::from),
            worst: metrics.worst.map(RankedView::from),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RowProjectionView {
    pub row: usize,
    pub indicator_id: f64,
    pub label: String,
    pub description: String,
    pub annual_goal_display: String,
    pub projection: ProjectionView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectionsResponse {
    pub unit: String,
    pub rows: Vec<RowProjectionView>,
    pub aggregate: AggregateView,
}

impl From<&SessionOverride> for ProjectionsResponse {
    fn from(session_override: &SessionOverride) -> Self {
        let rows = session_override
            .rows()
            .iter()
            .zip(session_override.projections())
            .enumerate()
            .map(|(row, (data, projection))| RowProjectionView {
                row,
                indicator_id: data.indicator_id,
                label: indicator_label(data.indicator_id),
                description: data.description.clone(),
                annual_goal_display: data.annual_goal.display().to_string(),
                projection: projection.into(),
            })
            .collect();

        Self {
            unit: session_override.unit().to_string(),
            rows,
            aggregate: session_override.aggregate().into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatisticsView {
    pub row: usize,
    pub indicator_id: f64,
    pub label: String,
    pub description: String,
    pub annual_goal_display: String,
    pub weighting_display: String,
    pub projected: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub std_dev: Option<f64>,
    pub months_recorded: usize,
}

impl StatisticsView {
    fn new(row: usize, data: &OverrideRow, stats: IndicatorStatistics) -> Self {
        Self {
            row,
            indicator_id: data.indicator_id,
            label: indicator_label(data.indicator_id),
            description: data.description.clone(),
            annual_goal_display: data.annual_goal.display().to_string(),
            weighting_display: data.weighting_display.clone(),
            projected: stats.projected,
            minimum: stats.minimum,
            maximum: stats.maximum,
            std_dev: stats.std_dev,
            months_recorded: stats.months_recorded,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatisticsResponse {
    pub unit: String,
    pub rows: Vec<StatisticsView>,
}

impl From<&SessionOverride> for StatisticsResponse {
    fn from(session_override: &SessionOverride) -> Self {
        let rows = session_override
            .rows()
            .iter()
            .zip(session_override.statistics())
            .enumerate()
            .map(|(row, (data, stats))| StatisticsView::new(row, data, stats))
            .collect();

        Self {
            unit: session_override.unit().to_string(),
            rows,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnitSummaryView {
    pub unit: String,
    pub indicator_count: usize,
    pub monthly_record_count: usize,
    pub average_compliance: Option<f64>,
    pub average_compliance_display: String,
}

impl UnitSummaryView {
    pub fn new(unit: &str, summary: UnitSummary) -> Self {
        Self {
            unit: unit.to_string(),
            indicator_count: summary.indicator_count,
            monthly_record_count: summary.monthly_record_count,
            average_compliance: summary.average_compliance,
            average_compliance_display: display_or_na(summary.average_compliance),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionCreated {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectUnitRequest {
    pub unit: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditCellRequest {
    /// New percentage (0-100); null clears the month
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RatioQuery {
    pub numerator: u64,
    pub denominator: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RatioResponse {
    pub numerator: u64,
    pub denominator: u64,
    pub percentage: f64,
    pub display: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub records: usize,
    pub units: usize,
    pub rejected_rows: usize,
    pub fetched_at: DateTime<Utc>,
}

impl From<&BaseTable> for RefreshResponse {
    fn from(table: &BaseTable) -> Self {
        Self {
            records: table.records().len(),
            units: table.units().len(),
            rejected_rows: table.rejected_rows(),
            fetched_at: table.fetched_at(),
        }
    }
}

fn monthly_vec(series: &MonthlySeries) -> Vec<Option<f64>> {
    series.values().to_vec()
}
