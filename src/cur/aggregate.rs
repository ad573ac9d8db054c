//! In-memory aggregation of report content for one project and period.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use super::parser::{ColumnLayout, ParseError, parse_row};
use super::period::BillingPeriod;

/// Running totals for one (project, billing period) group.
///
/// Several report files can feed the same group; `fold_report` is called
/// once per file and accumulates into the same maps. Rows whose usage date
/// falls outside the group's period are ignored, which keeps spillover
/// lines at month boundaries out of the totals.
#[derive(Debug, Clone)]
pub struct GroupAggregation {
    pub project_id: String,
    pub period: BillingPeriod,
    pub service_costs: BTreeMap<String, f64>,
    pub daily_costs: BTreeMap<NaiveDate, f64>,
    pub currency: Option<String>,
}

impl GroupAggregation {
    pub fn new(project_id: impl Into<String>, period: BillingPeriod) -> Self {
        Self {
            project_id: project_id.into(),
            period,
            service_costs: BTreeMap::new(),
            daily_costs: BTreeMap::new(),
            currency: None,
        }
    }

    /// Fold one report file's content into the running totals.
    pub fn fold_report(&mut self, content: &str) -> Result<(), ParseError> {
        let mut lines = content
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty());

        let header = lines.next().ok_or(ParseError::EmptyFile)?;
        let layout = ColumnLayout::from_header(header)?;

        for line in lines {
            let Some(row) = parse_row(line, &layout) else {
                continue;
            };

            // The file's currency is taken from the first row carrying one.
            if self.currency.is_none() {
                self.currency = row.currency;
            }

            let Some(record) = row.record else { continue };
            if !self.period.contains(record.usage_date) {
                continue;
            }

            *self.service_costs.entry(record.service_name).or_insert(0.0) += record.cost;
            *self.daily_costs.entry(record.usage_date).or_insert(0.0) += record.cost;
        }

        Ok(())
    }

    /// Merge another accumulator for the same group into this one.
    pub fn merge_from(&mut self, other: GroupAggregation) {
        for (service, cost) in other.service_costs {
            *self.service_costs.entry(service).or_insert(0.0) += cost;
        }
        for (date, cost) in other.daily_costs {
            *self.daily_costs.entry(date).or_insert(0.0) += cost;
        }
        if self.currency.is_none() {
            self.currency = other.currency;
        }
    }

    /// Sum over all services.
    pub fn total_cost(&self) -> f64 {
        self.service_costs.values().sum()
    }

    /// Sum over the days of the month up to and including `day_limit`.
    pub fn cost_through_day(&self, day_limit: u32) -> f64 {
        self.daily_costs
            .iter()
            .filter(|(date, _)| date.day() <= day_limit)
            .map(|(_, cost)| cost)
            .sum()
    }
}
