use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{
    db::{error::DbResult, repos::CostReportRepo},
    models::{CostSummary, SaveGroupCosts, ServiceMonthlyCost},
};

pub struct SqliteCostReportRepo {
    pool: SqlitePool,
}

impl SqliteCostReportRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_summary(row: &SqliteRow) -> CostSummary {
    CostSummary {
        project_id: row.get("project_id"),
        billing_period: row.get("billing_period"),
        currency: row.get("currency"),
        total_cost: row.get("total_cost"),
        forecast_cost: row.get("forecast_cost"),
        previous_same_period_cost: row.get("previous_same_period_cost"),
        previous_month_total_cost: row.get("previous_month_total_cost"),
        last_updated_at: row.get("last_updated_at"),
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1);
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    match (first, first_of_next) {
        (Some(a), Some(b)) => (b - a).num_days() as u32,
        _ => 30,
    }
}

fn previous_period(year: i32, month: u32) -> String {
    let (prev_year, prev_month) = if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    };
    format!("{:04}-{:02}", prev_year, prev_month)
}

const SUMMARY_COLUMNS: &str = "project_id, billing_period, currency, total_cost, forecast_cost, \
     previous_same_period_cost, previous_month_total_cost, last_updated_at";

#[async_trait]
impl CostReportRepo for SqliteCostReportRepo {
    async fn get_summary(
        &self,
        project_id: &str,
        billing_period: &str,
    ) -> DbResult<Option<CostSummary>> {
        let query = format!(
            "SELECT {} FROM cost_summaries WHERE project_id = ? AND billing_period = ?",
            SUMMARY_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(project_id)
            .bind(billing_period)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_summary))
    }

    async fn list_service_costs(
        &self,
        project_id: &str,
        billing_period: &str,
    ) -> DbResult<Vec<ServiceMonthlyCost>> {
        let rows = sqlx::query(
            r#"
            SELECT project_id, billing_period, service_name, currency, cost, last_updated_at
            FROM service_monthly_costs
            WHERE project_id = ? AND billing_period = ?
            ORDER BY service_name ASC
            "#,
        )
        .bind(project_id)
        .bind(billing_period)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ServiceMonthlyCost {
                project_id: row.get("project_id"),
                billing_period: row.get("billing_period"),
                service_name: row.get("service_name"),
                currency: row.get("currency"),
                cost: row.get("cost"),
                last_updated_at: row.get("last_updated_at"),
            })
            .collect())
    }

    async fn save_group_costs(&self, input: SaveGroupCosts) -> DbResult<CostSummary> {
        let total_cost: f64 = input.service_costs.values().sum();
        let now = chrono::Utc::now();

        let mut tx = self.pool.begin().await?;

        // The period's service rows are fully replaced so a service absent
        // from the latest files leaves no stale row behind.
        sqlx::query(
            "DELETE FROM service_monthly_costs WHERE project_id = ? AND billing_period = ?",
        )
        .bind(&input.project_id)
        .bind(&input.billing_period)
        .execute(&mut *tx)
        .await?;

        for (service_name, cost) in &input.service_costs {
            sqlx::query(
                r#"
                INSERT INTO service_monthly_costs (
                    project_id, billing_period, service_name, currency, cost, last_updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&input.project_id)
            .bind(&input.billing_period)
            .bind(service_name)
            .bind(&input.currency)
            .bind(cost)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let existing_query = format!(
            "SELECT {} FROM cost_summaries WHERE project_id = ? AND billing_period = ?",
            SUMMARY_COLUMNS
        );
        let existing = sqlx::query(&existing_query)
            .bind(&input.project_id)
            .bind(&input.billing_period)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(row_to_summary);

        // Forecast: for the current calendar month, extrapolate the average
        // daily cost over the full month; for past months, keep the stored
        // forecast.
        let is_current_month = input.billing_year == chrono::Datelike::year(&input.today)
            && input.billing_month == chrono::Datelike::month(&input.today);

        let stored_forecast = existing
            .as_ref()
            .map(|s| s.forecast_cost)
            .filter(|f| *f != 0.0);

        let forecast_cost = if is_current_month {
            let days_so_far = input.daily_costs.len() as u32;
            if days_so_far > 0 {
                let avg_daily = total_cost / f64::from(days_so_far);
                avg_daily * f64::from(days_in_month(input.billing_year, input.billing_month))
            } else {
                stored_forecast.unwrap_or(total_cost)
            }
        } else {
            stored_forecast.unwrap_or(total_cost)
        };

        let prev_period = previous_period(input.billing_year, input.billing_month);
        let prev_summary = sqlx::query(&existing_query)
            .bind(&input.project_id)
            .bind(&prev_period)
            .fetch_optional(&mut *tx)
            .await?
            .as_ref()
            .map(row_to_summary);

        let previous_month_total_cost = prev_summary.as_ref().map(|s| s.total_cost).unwrap_or(0.0);
        let previous_same_period_cost = input.previous_same_period_override.unwrap_or_else(|| {
            prev_summary
                .as_ref()
                .map(|s| s.previous_same_period_cost)
                .unwrap_or(0.0)
        });

        sqlx::query(
            r#"
            INSERT INTO cost_summaries (
                project_id, billing_period, currency, total_cost, forecast_cost,
                previous_same_period_cost, previous_month_total_cost, last_updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (project_id, billing_period) DO UPDATE SET
                currency = excluded.currency,
                total_cost = excluded.total_cost,
                forecast_cost = excluded.forecast_cost,
                previous_same_period_cost = excluded.previous_same_period_cost,
                previous_month_total_cost = excluded.previous_month_total_cost,
                last_updated_at = excluded.last_updated_at
            "#,
        )
        .bind(&input.project_id)
        .bind(&input.billing_period)
        .bind(&input.currency)
        .bind(total_cost)
        .bind(forecast_cost)
        .bind(previous_same_period_cost)
        .bind(previous_month_total_cost)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CostSummary {
            project_id: input.project_id,
            billing_period: input.billing_period,
            currency: input.currency,
            total_cost,
            forecast_cost,
            previous_same_period_cost,
            previous_month_total_cost,
            last_updated_at: now,
        })
    }
}
