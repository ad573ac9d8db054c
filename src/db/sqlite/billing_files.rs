use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::BillingFileRepo,
    },
    models::{BillingFile, BillingFileStatus, NewBillingFile},
};

pub struct SqliteBillingFileRepo {
    pool: SqlitePool,
}

impl SqliteBillingFileRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_billing_file(row: &SqliteRow) -> DbResult<BillingFile> {
    let status: String = row.get("status");
    let status = BillingFileStatus::parse(&status)
        .ok_or_else(|| DbError::Internal(format!("Unknown billing file status: {}", status)))?;

    Ok(BillingFile {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        project_id: row.get("project_id"),
        aws_account_id: row.get("aws_account_id"),
        bucket_name: row.get("bucket_name"),
        object_key: row.get("object_key"),
        object_key_hash: row.get("object_key_hash"),
        billing_period: row.get("billing_period"),
        s3_last_modified_at: row.get("s3_last_modified_at"),
        status,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const BILLING_FILE_COLUMNS: &str = "id, project_id, aws_account_id, bucket_name, object_key, \
     object_key_hash, billing_period, s3_last_modified_at, status, error_message, \
     created_at, updated_at";

#[async_trait]
impl BillingFileRepo for SqliteBillingFileRepo {
    async fn create(&self, input: NewBillingFile) -> DbResult<BillingFile> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO billing_files (
                id, project_id, aws_account_id, bucket_name, object_key,
                object_key_hash, billing_period, s3_last_modified_at, status,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.project_id)
        .bind(&input.aws_account_id)
        .bind(&input.bucket_name)
        .bind(&input.object_key)
        .bind(&input.object_key_hash)
        .bind(&input.billing_period)
        .bind(input.s3_last_modified_at)
        .bind(input.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::Conflict(
                format!("Billing file '{}' is already registered", input.object_key),
            ),
            _ => DbError::from(e),
        })?;

        Ok(BillingFile {
            id,
            project_id: input.project_id,
            aws_account_id: input.aws_account_id,
            bucket_name: input.bucket_name,
            object_key: input.object_key,
            object_key_hash: input.object_key_hash,
            billing_period: input.billing_period,
            s3_last_modified_at: input.s3_last_modified_at,
            status: input.status,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_by_identity(
        &self,
        project_id: &str,
        bucket_name: &str,
        object_key_hash: &str,
    ) -> DbResult<Option<BillingFile>> {
        let query = format!(
            r#"
            SELECT {}
            FROM billing_files
            WHERE project_id = ? AND bucket_name = ? AND object_key_hash = ?
            "#,
            BILLING_FILE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(project_id)
            .bind(bucket_name)
            .bind(object_key_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_billing_file).transpose()
    }

    async fn list_pending(
        &self,
        project_id: Option<&str>,
        limit: i64,
    ) -> DbResult<Vec<BillingFile>> {
        let project_filter = if project_id.is_some() {
            "AND project_id = ?"
        } else {
            ""
        };

        let query = format!(
            r#"
            SELECT {}
            FROM billing_files
            WHERE status = 'PENDING' {}
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
            BILLING_FILE_COLUMNS, project_filter
        );

        let mut q = sqlx::query(&query);
        if let Some(project_id) = project_id {
            q = q.bind(project_id);
        }

        let rows = q.bind(limit).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_billing_file).collect()
    }

    async fn list_by_project_and_period(
        &self,
        project_id: &str,
        billing_period: &str,
    ) -> DbResult<Vec<BillingFile>> {
        let query = format!(
            r#"
            SELECT {}
            FROM billing_files
            WHERE project_id = ? AND billing_period = ?
            ORDER BY created_at ASC, id ASC
            "#,
            BILLING_FILE_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(project_id)
            .bind(billing_period)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_billing_file).collect()
    }

    async fn claim_pending(&self, id: Uuid) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE billing_files
            SET status = 'PROCESSING', updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(chrono::Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_done(&self, id: Uuid) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE billing_files
            SET status = 'DONE', error_message = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(chrono::Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_error(&self, id: Uuid, message: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE billing_files
            SET status = 'ERROR', error_message = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(chrono::Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reset_to_pending(
        &self,
        id: Uuid,
        s3_last_modified_at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE billing_files
            SET status = 'PENDING', s3_last_modified_at = ?, error_message = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(s3_last_modified_at)
        .bind(chrono::Utc::now())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
