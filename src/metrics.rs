//! Derived metrics over indicator records and session overrides
//!
//! Everything here is a pure function of its inputs. The projected value of an
//! indicator is the mean of the months that have data, standing in for
//! year-end performance, and is compared against the annual goal when the
//! goal has a numeric target.

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::IndicatorRecord;
use crate::normalize::{format_percent, AnnualGoal, Month, MonthlySeries};

/// Anything that carries an annual goal and a monthly series: base records
/// and the editable rows of a session override.
pub trait GoalTracked {
    fn indicator_id(&self) -> f64;
    fn annual_goal(&self) -> &AnnualGoal;
    fn monthly_values(&self) -> &MonthlySeries;

    fn project(&self) -> ProjectedMetric {
        project(self.annual_goal(), self.monthly_values())
    }
}

impl GoalTracked for IndicatorRecord {
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

/// Outcome of comparing the projection against the annual goal. The
/// dashboard maps it to row colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Meets,
    Fails,
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedMetric {
    /// Mean of the present monthly values, rounded to one decimal.
    pub projected: Option<f64>,
    pub verdict: Verdict,
}

impl ProjectedMetric {
    pub fn display(&self) -> String {
        display_or_na(self.projected)
    }
}

pub fn project(goal: &AnnualGoal, monthly: &MonthlySeries) -> ProjectedMetric {
    let projected = monthly.mean().map(round1);

    let verdict = match (goal.is_comparable(), projected, goal.value()) {
        (true, Some(projected), Some(target)) if projected >= target => Verdict::Meets,
        (true, Some(projected), Some(target)) if projected < target => Verdict::Fails,
        _ => Verdict::NotApplicable,
    };

    ProjectedMetric { projected, verdict }
}

/// An indicator singled out by an aggregate (best or worst performer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedIndicator {
    /// Position of the indicator in the input set.
    pub position: usize,
    pub indicator_id: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AggregateMetrics {
    /// Mean of the per-indicator means, over indicators that have data.
    pub global_mean: Option<f64>,
    pub best: Option<RankedIndicator>,
    pub worst: Option<RankedIndicator>,
}

/// Aggregate over a set of indicators using their unrounded monthly means.
/// Ties go to the first indicator in input order.
pub fn aggregate<'a, T, I>(items: I) -> AggregateMetrics
where
    T: GoalTracked + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let ranked: Vec<RankedIndicator> = items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| {
            item.monthly_values().mean().map(|mean| RankedIndicator {
                position,
                indicator_id: item.indicator_id(),
                mean,
            })
        })
        .collect();

    if ranked.is_empty() {
        return AggregateMetrics {
            global_mean: None,
            best: None,
            worst: None,
        };
    }

    let global_mean = ranked.iter().map(|r| r.mean).sum::<f64>() / ranked.len() as f64;

    let mut best = ranked[0];
    let mut worst = ranked[0];
    for candidate in &ranked[1..] {
        if candidate.mean > best.mean {
            best = *candidate;
        }
        if candidate.mean < worst.mean {
            worst = *candidate;
        }
    }

    AggregateMetrics {
        global_mean: Some(global_mean),
        best: Some(best),
        worst: Some(worst),
    }
}

/// Descriptive statistics of one indicator's monthly series, each rounded
/// to one decimal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorStatistics {
    pub projected: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// Sample standard deviation; needs at least two months of data.
    pub std_dev: Option<f64>,
    pub months_recorded: usize,
}

pub fn statistics(monthly: &MonthlySeries) -> IndicatorStatistics {
    let values: Vec<f64> = monthly.present().collect();
    let count = values.len();

    let minimum = values.iter().copied().reduce(f64::min);
    let maximum = values.iter().copied().reduce(f64::max);
    let mean = monthly.mean();

    let std_dev = match mean {
        Some(mean) if count > 1 => {
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            Some(variance.sqrt())
        }
        _ => None,
    };

    IndicatorStatistics {
        projected: mean.map(round1),
        minimum: minimum.map(round1),
        maximum: maximum.map(round1),
        std_dev: std_dev.map(round1),
        months_recorded: count,
    }
}

/// Headline numbers for one unit's records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitSummary {
    pub indicator_count: usize,
    /// Number of monthly cells with data across all indicators.
    pub monthly_record_count: usize,
    /// Mean over months of each month's mean across indicators; months with
    /// no data at all are skipped.
    pub average_compliance: Option<f64>,
}

pub fn unit_summary<'a, T, I>(items: I) -> UnitSummary
where
    T: GoalTracked + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut indicator_count = 0;
    let mut sums = [0.0_f64; 12];
    let mut counts = [0_usize; 12];

    for item in items {
        indicator_count += 1;
        for month in Month::ALL {
            if let Some(value) = item.monthly_values().get(month) {
                sums[month.index()] += value;
                counts[month.index()] += 1;
            }
        }
    }

    let month_means: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .filter(|(_, count)| **count > 0)
        .map(|(sum, &count)| sum / count as f64)
        .collect();

    let average_compliance = if month_means.is_empty() {
        None
    } else {
        Some(month_means.iter().sum::<f64>() / month_means.len() as f64)
    };

    UnitSummary {
        indicator_count,
        monthly_record_count: counts.iter().sum(),
        average_compliance,
    }
}

/// Stand-alone percentage calculator: `numerator / denominator × 100`.
/// Returns `None` for a zero denominator.
pub fn ratio_percentage(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(numerator as f64 / denominator as f64 * 100.0)
}

/// One-decimal percentage, or "N/A" when there is no value.
pub fn display_or_na(value: Option<f64>) -> String {
    value.map(|v| format_percent(round1(v))).unwrap_or_else(|| "N/A".to_string())
}

/// One decimal, ties to even (84.25 -> 84.2).
fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}
