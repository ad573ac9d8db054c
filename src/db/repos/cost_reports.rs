use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{CostSummary, SaveGroupCosts, ServiceMonthlyCost},
};

#[async_trait]
pub trait CostReportRepo: Send + Sync {
    async fn get_summary(
        &self,
        project_id: &str,
        billing_period: &str,
    ) -> DbResult<Option<CostSummary>>;

    async fn list_service_costs(
        &self,
        project_id: &str,
        billing_period: &str,
    ) -> DbResult<Vec<ServiceMonthlyCost>>;

    /// Persist one version-group's aggregation result in a single
    /// transaction: the period's service rows are deleted and re-inserted,
    /// then the summary is upserted with recomputed total/forecast and the
    /// adjacent period's comparison figures.
    async fn save_group_costs(&self, input: SaveGroupCosts) -> DbResult<CostSummary>;
}
