use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{
    db::{error::DbResult, repos::ProjectConnectionRepo},
    models::{ProjectConnection, UpsertProjectConnection},
};

pub struct SqliteProjectConnectionRepo {
    pool: SqlitePool,
}

impl SqliteProjectConnectionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_connection(row: &SqliteRow) -> ProjectConnection {
    ProjectConnection {
        project_id: row.get("project_id"),
        aws_account_id: row.get("aws_account_id"),
        bucket_name: row.get("bucket_name"),
        report_prefix: row.get("report_prefix"),
        access_key_param_path: row.get("access_key_param_path"),
        secret_key_param_path: row.get("secret_key_param_path"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const CONNECTION_COLUMNS: &str = "project_id, aws_account_id, bucket_name, report_prefix, \
     access_key_param_path, secret_key_param_path, created_at, updated_at";

#[async_trait]
impl ProjectConnectionRepo for SqliteProjectConnectionRepo {
    async fn list(&self, project_id: Option<&str>) -> DbResult<Vec<ProjectConnection>> {
        let project_filter = if project_id.is_some() {
            "WHERE project_id = ?"
        } else {
            ""
        };

        let query = format!(
            "SELECT {} FROM project_connections {} ORDER BY project_id ASC",
            CONNECTION_COLUMNS, project_filter
        );

        let mut q = sqlx::query(&query);
        if let Some(project_id) = project_id {
            q = q.bind(project_id);
        }

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_connection).collect())
    }

    async fn get(&self, project_id: &str) -> DbResult<Option<ProjectConnection>> {
        let query = format!(
            "SELECT {} FROM project_connections WHERE project_id = ?",
            CONNECTION_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(row_to_connection))
    }

    async fn upsert(&self, input: UpsertProjectConnection) -> DbResult<ProjectConnection> {
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO project_connections (
                project_id, aws_account_id, bucket_name, report_prefix,
                access_key_param_path, secret_key_param_path, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (project_id) DO UPDATE SET
                aws_account_id = excluded.aws_account_id,
                bucket_name = excluded.bucket_name,
                report_prefix = excluded.report_prefix,
                access_key_param_path = excluded.access_key_param_path,
                secret_key_param_path = excluded.secret_key_param_path,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&input.project_id)
        .bind(&input.aws_account_id)
        .bind(&input.bucket_name)
        .bind(&input.report_prefix)
        .bind(&input.access_key_param_path)
        .bind(&input.secret_key_param_path)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(&input.project_id)
            .await?
            .ok_or(crate::db::error::DbError::NotFound)
    }

    async fn delete(&self, project_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM project_connections WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        sqlx::query(
            r#"
            CREATE TABLE project_connections (
                project_id TEXT PRIMARY KEY NOT NULL,
                aws_account_id TEXT NOT NULL,
                bucket_name TEXT NOT NULL,
                report_prefix TEXT NOT NULL,
                access_key_param_path TEXT NOT NULL,
                secret_key_param_path TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&pool)
        .await
        .expect("Failed to create project_connections table");

        pool
    }

    fn connection_input(project_id: &str) -> UpsertProjectConnection {
        UpsertProjectConnection {
            project_id: project_id.to_string(),
            aws_account_id: "123456789012".to_string(),
            bucket_name: "billing-bucket".to_string(),
            report_prefix: "reports/".to_string(),
            access_key_param_path: format!("/finops/{}/access-key", project_id),
            secret_key_param_path: format!("/finops/{}/secret-key", project_id),
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let pool = create_test_pool().await;
        let repo = SqliteProjectConnectionRepo::new(pool);

        let created = repo
            .upsert(connection_input("proj-1"))
            .await
            .expect("Failed to insert connection");
        assert_eq!(created.bucket_name, "billing-bucket");

        let mut updated_input = connection_input("proj-1");
        updated_input.bucket_name = "other-bucket".to_string();
        let updated = repo
            .upsert(updated_input)
            .await
            .expect("Failed to update connection");
        assert_eq!(updated.bucket_name, "other-bucket");

        let all = repo.list(None).await.expect("Failed to list connections");
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_list_with_project_filter() {
        let pool = create_test_pool().await;
        let repo = SqliteProjectConnectionRepo::new(pool);

        repo.upsert(connection_input("proj-1"))
            .await
            .expect("Failed to insert proj-1");
        repo.upsert(connection_input("proj-2"))
            .await
            .expect("Failed to insert proj-2");

        let filtered = repo
            .list(Some("proj-2"))
            .await
            .expect("Failed to list connections");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].project_id, "proj-2");
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let pool = create_test_pool().await;
        let repo = SqliteProjectConnectionRepo::new(pool);

        let result = repo.get("nope").await.expect("Query should succeed");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = create_test_pool().await;
        let repo = SqliteProjectConnectionRepo::new(pool);

        repo.upsert(connection_input("proj-1"))
            .await
            .expect("Failed to insert connection");
        repo.delete("proj-1").await.expect("Failed to delete");

        let result = repo.get("proj-1").await.expect("Query should succeed");
        assert!(result.is_none());
    }
}
