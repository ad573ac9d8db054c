//! Cost aggregation over pending export files.
//!
//! Consumes a batch of PENDING billing files, folds each file's rows into a
//! per-(project, period) aggregation, and persists every touched group.
//! Files belonging to a superseded export version are closed without
//! processing. Each file is claimed with a conditional status update before
//! it is touched, so a file is only ever consumed once even if two runs
//! overlap.
//!
//! A file-level failure marks that file ERROR and moves on; a failure while
//! persisting a group fails the run (already-saved groups stay saved).

use std::{collections::HashMap, sync::Arc};

use chrono::{Datelike, NaiveDate, Utc};
use tracing::{error, info, instrument};

use super::{BatchContext, BatchError, BatchResult};
use crate::{
    cur::{
        BillingPeriod, GroupAggregation, extract_billing_period, extract_version_token,
        is_eligible, latest_version_per_group,
    },
    models::{BillingFile, ProjectConnection, SaveGroupCosts},
    storage::{ReportStore, StoreCredentials},
};

/// Counters for one aggregation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregationOutcome {
    /// Files folded into a group.
    pub processed: usize,
    /// Files closed because a newer export version supersedes them.
    pub superseded: usize,
    /// Files another run claimed first.
    pub contended: usize,
    /// Files marked ERROR.
    pub failed: usize,
    /// Version groups persisted.
    pub groups_saved: usize,
}

/// Per-project connection and store, resolved once per run.
struct ProjectAccess {
    connection: ProjectConnection,
    store: Arc<dyn ReportStore>,
}

/// Aggregate pending files for all (or one) projects.
pub async fn run_aggregation(
    ctx: &BatchContext,
    project_filter: Option<&str>,
) -> BatchResult<AggregationOutcome> {
    run_aggregation_at(ctx, project_filter, Utc::now().date_naive()).await
}

/// `today` anchors current-month detection and the forecast window.
#[instrument(skip(ctx))]
pub async fn run_aggregation_at(
    ctx: &BatchContext,
    project_filter: Option<&str>,
    today: NaiveDate,
) -> BatchResult<AggregationOutcome> {
    let repo = ctx.db.billing_files();
    let files = repo.list_pending(project_filter, ctx.pending_limit).await?;
    let mut outcome = AggregationOutcome::default();

    if files.is_empty() {
        return Ok(outcome);
    }

    let latest = latest_version_per_group(&files, file_group_key, |f| {
        file_period_string(f).and_then(|_| extract_version_token(&f.object_key))
    });

    let mut access: HashMap<String, ProjectAccess> = HashMap::new();
    let mut groups: HashMap<String, GroupAggregation> = HashMap::new();

    for file in &files {
        let group = file_group_key(file);
        let token = file_period_string(file).and_then(|_| extract_version_token(&file.object_key));

        if !is_eligible(latest.get(&group).map(String::as_str), token.as_deref()) {
            info!(
                project_id = %file.project_id,
                object_key = %file.object_key,
                "Closing file superseded by a newer export version"
            );
            repo.mark_done(file.id).await?;
            outcome.superseded += 1;
            continue;
        }

        if !repo.claim_pending(file.id).await? {
            info!(
                project_id = %file.project_id,
                object_key = %file.object_key,
                "File already claimed by another run"
            );
            outcome.contended += 1;
            continue;
        }

        match fold_file(ctx, &mut access, &mut groups, file, &group).await {
            Ok(()) => {
                repo.mark_done(file.id).await?;
                outcome.processed += 1;
            }
            Err(e) => {
                error!(
                    project_id = %file.project_id,
                    object_key = %file.object_key,
                    error = %e,
                    "File aggregation failed"
                );
                repo.mark_error(file.id, &e.to_string()).await?;
                outcome.failed += 1;
            }
        }
    }

    // Persist groups oldest period first, so a mid-run failure leaves the
    // most recent months unwritten rather than the historical ones.
    let mut groups: Vec<GroupAggregation> = groups.into_values().collect();
    groups.sort_by_key(|g| (g.period, g.project_id.clone()));

    let current_period = BillingPeriod::from_date(today);
    for aggregation in groups {
        let previous_same_period_override = if aggregation.period == current_period {
            Some(
                previous_same_period_cost(
                    ctx,
                    &mut access,
                    &aggregation.project_id,
                    aggregation.period,
                    today.day(),
                )
                .await?,
            )
        } else {
            None
        };

        let summary = ctx
            .db
            .cost_reports()
            .save_group_costs(SaveGroupCosts {
                project_id: aggregation.project_id.clone(),
                billing_period: aggregation.period.to_string(),
                billing_year: aggregation.period.year(),
                billing_month: aggregation.period.month(),
                currency: aggregation.currency.clone().unwrap_or_else(|| "USD".to_string()),
                service_costs: aggregation.service_costs,
                daily_costs: aggregation.daily_costs,
                previous_same_period_override,
                today,
            })
            .await?;

        info!(
            project_id = %summary.project_id,
            billing_period = %summary.billing_period,
            total_cost = summary.total_cost,
            "Saved group costs"
        );
        outcome.groups_saved += 1;
    }

    info!(
        processed = outcome.processed,
        superseded = outcome.superseded,
        contended = outcome.contended,
        failed = outcome.failed,
        groups_saved = outcome.groups_saved,
        "Aggregation run finished"
    );
    Ok(outcome)
}

/// `YYYY-MM` for a ledger row: the stored period, falling back to the key.
fn file_period_string(file: &BillingFile) -> Option<String> {
    file.billing_period
        .clone()
        .or_else(|| extract_billing_period(&file.object_key).map(|p| p.to_string()))
}

fn file_group_key(file: &BillingFile) -> String {
    format!(
        "{}::{}",
        file.project_id,
        file_period_string(file).unwrap_or_default()
    )
}

/// Download one file and fold it into its group's aggregation.
async fn fold_file(
    ctx: &BatchContext,
    access: &mut HashMap<String, ProjectAccess>,
    groups: &mut HashMap<String, GroupAggregation>,
    file: &BillingFile,
    group: &str,
) -> BatchResult<()> {
    let period = file_period_string(file)
        .and_then(|p| BillingPeriod::parse(&p))
        .ok_or_else(|| BatchError::MissingPeriod(file.object_key.clone()))?;

    let project = project_access(ctx, access, &file.project_id).await?;
    let content = project
        .store
        .fetch_text(&file.bucket_name, &file.object_key)
        .await?;

    // Parse into a scratch accumulator first: a file that fails mid-parse
    // must not leave a group entry behind, or an otherwise-empty group
    // would be persisted and zero out the period's stored summary.
    let mut scratch = GroupAggregation::new(file.project_id.clone(), period);
    scratch.fold_report(&content)?;

    groups
        .entry(group.to_string())
        .or_insert_with(|| GroupAggregation::new(file.project_id.clone(), period))
        .merge_from(scratch);
    Ok(())
}

/// Resolve (and cache) the connection and report store for a project.
async fn project_access<'a>(
    ctx: &BatchContext,
    access: &'a mut HashMap<String, ProjectAccess>,
    project_id: &str,
) -> BatchResult<&'a ProjectAccess> {
    if !access.contains_key(project_id) {
        let connection = ctx
            .db
            .project_connections()
            .get(project_id)
            .await?
            .ok_or_else(|| BatchError::MissingConnection(project_id.to_string()))?;

        let access_key_id = ctx.secrets.get(&connection.access_key_param_path).await?;
        let secret_access_key = ctx.secrets.get(&connection.secret_key_param_path).await?;
        let (Some(access_key_id), Some(secret_access_key)) = (access_key_id, secret_access_key)
        else {
            return Err(BatchError::MissingCredentials(project_id.to_string()));
        };

        let store = ctx
            .stores
            .store_for(StoreCredentials {
                access_key_id,
                secret_access_key,
            })
            .await?;

        access.insert(project_id.to_string(), ProjectAccess { connection, store });
    }

    // Inserted above when absent.
    access
        .get(project_id)
        .ok_or_else(|| BatchError::MissingConnection(project_id.to_string()))
}

/// Recompute the previous month's cost over days `1..=days_limit` from that
/// month's latest-version files. Used for the same-period comparison while
/// a month is still in progress.
async fn previous_same_period_cost(
    ctx: &BatchContext,
    access: &mut HashMap<String, ProjectAccess>,
    project_id: &str,
    period: BillingPeriod,
    days_limit: u32,
) -> BatchResult<f64> {
    if days_limit == 0 {
        return Ok(0.0);
    }

    let previous = period.previous();
    let files = ctx
        .db
        .billing_files()
        .list_by_project_and_period(project_id, &previous.to_string())
        .await?;
    if files.is_empty() {
        return Ok(0.0);
    }

    let latest = latest_version_per_group(&files, file_group_key, |f| {
        extract_version_token(&f.object_key)
    });

    let mut aggregation = GroupAggregation::new(project_id, previous);
    for file in &files {
        let group = file_group_key(file);
        let token = extract_version_token(&file.object_key);
        if !is_eligible(latest.get(&group).map(String::as_str), token.as_deref()) {
            continue;
        }

        let project = project_access(ctx, access, project_id).await?;
        let content = project
            .store
            .fetch_text(&file.bucket_name, &file.object_key)
            .await?;
        aggregation.fold_report(&content)?;
    }

    Ok(aggregation.cost_through_day(days_limit))
}
