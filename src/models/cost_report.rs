use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated costs for one project and billing period.
///
/// `previous_month_total_cost` and `previous_same_period_cost` are carried
/// from the adjacent period's summary at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostSummary {
    pub project_id: String,
    /// `YYYY-MM`
    pub billing_period: String,
    pub currency: String,
    pub total_cost: f64,
    pub forecast_cost: f64,
    pub previous_same_period_cost: f64,
    pub previous_month_total_cost: f64,
    pub last_updated_at: DateTime<Utc>,
}

/// Cost attributed to one cloud service for one project and billing period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMonthlyCost {
    pub project_id: String,
    pub billing_period: String,
    pub service_name: String,
    pub currency: String,
    pub cost: f64,
    pub last_updated_at: DateTime<Utc>,
}

/// One version-group's aggregation result, ready to be persisted.
///
/// `today` anchors the forecast: when the billing period is the calendar
/// month containing `today`, the forecast is extrapolated from the daily
/// costs; otherwise the previously stored forecast is kept.
#[derive(Debug, Clone)]
pub struct SaveGroupCosts {
    pub project_id: String,
    /// `YYYY-MM`
    pub billing_period: String,
    pub billing_year: i32,
    pub billing_month: u32,
    /// Currency captured from the group's files. Groups whose admitted rows
    /// never carried a currency value default to `"USD"`.
    pub currency: String,
    pub service_costs: BTreeMap<String, f64>,
    pub daily_costs: BTreeMap<NaiveDate, f64>,
    /// Recomputed "adjacent month, days 1..=today" cost; None carries the
    /// adjacent summary's stored value forward instead.
    pub previous_same_period_override: Option<f64>,
    pub today: NaiveDate,
}
