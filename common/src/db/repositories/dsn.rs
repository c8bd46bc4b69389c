// DSN repository

use super::queries::dsn_queries::SELECT_ALL_COLUMNS;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{DsnPatch, DsnRecord, NewDsn};
use tracing::instrument;

/// Repository for named target-database connections
#[derive(Debug, Clone)]
pub struct DsnRepository {
    pool: DbPool,
}

impl DsnRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find a DSN by its logical database name
    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> Result<Option<DsnRecord>, DatabaseError> {
        let dsn = sqlx::query_as::<_, DsnRecord>(&format!(
            "SELECT {} FROM dsns WHERE name = $1",
            SELECT_ALL_COLUMNS
        ))
        .bind(name)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(dsn)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<DsnRecord>, DatabaseError> {
        let dsn = sqlx::query_as::<_, DsnRecord>(&format!(
            "SELECT {} FROM dsns WHERE id = $1",
            SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(dsn)
    }

    #[instrument(skip(self))]
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<DsnRecord>, DatabaseError> {
        let dsns = sqlx::query_as::<_, DsnRecord>(&format!(
            "SELECT {} FROM dsns ORDER BY id LIMIT $1 OFFSET $2",
            SELECT_ALL_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(dsns)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dsns")
            .fetch_one(self.pool.pool())
            .await?;
        Ok(total)
    }

    #[instrument(skip(self, dsn), fields(name = %dsn.name, driver = %dsn.driver))]
    pub async fn create(&self, dsn: &NewDsn) -> Result<DsnRecord, DatabaseError> {
        let created = sqlx::query_as::<_, DsnRecord>(&format!(
            "INSERT INTO dsns (name, driver, dsn) VALUES ($1, $2, $3) RETURNING {}",
            SELECT_ALL_COLUMNS
        ))
        .bind(&dsn.name)
        .bind(&dsn.driver)
        .bind(&dsn.dsn)
        .fetch_one(self.pool.pool())
        .await?;

        tracing::info!(dsn_id = created.id, name = %created.name, "DSN created");
        Ok(created)
    }

    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: i64, patch: &DsnPatch) -> Result<Option<DsnRecord>, DatabaseError> {
        let updated = sqlx::query_as::<_, DsnRecord>(&format!(
            r#"
            UPDATE dsns
            SET name = COALESCE($2, name),
                driver = COALESCE($3, driver),
                dsn = COALESCE($4, dsn),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.driver.as_deref())
        .bind(patch.dsn.as_deref())
        .fetch_optional(self.pool.pool())
        .await?;

        if updated.is_some() {
            tracing::info!(dsn_id = id, "DSN updated");
        }
        Ok(updated)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM dsns WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(dsn_id = id, "DSN deleted");
        }
        Ok(deleted)
    }
}
