use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{ProjectConnection, UpsertProjectConnection},
};

#[async_trait]
pub trait ProjectConnectionRepo: Send + Sync {
    /// List connections, optionally narrowed to one project.
    async fn list(&self, project_id: Option<&str>) -> DbResult<Vec<ProjectConnection>>;

    async fn get(&self, project_id: &str) -> DbResult<Option<ProjectConnection>>;

    /// Insert or replace the connection settings for a project.
    async fn upsert(&self, input: UpsertProjectConnection) -> DbResult<ProjectConnection>;

    async fn delete(&self, project_id: &str) -> DbResult<()>;
}
