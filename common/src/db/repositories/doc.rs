// Template document repository

use super::queries::doc_queries::SELECT_ALL_COLUMNS;
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::{DocPatch, DocRecord, NewDoc};
use tracing::instrument;

/// Repository for template documents, addressed by id or by request path
#[derive(Debug, Clone)]
pub struct DocRepository {
    pool: DbPool,
}

impl DocRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Find the document serving a request path
    #[instrument(skip(self))]
    pub async fn find_by_path(&self, path: &str) -> Result<Option<DocRecord>, DatabaseError> {
        let doc = sqlx::query_as::<_, DocRecord>(&format!(
            "SELECT {} FROM docs WHERE path = $1",
            SELECT_ALL_COLUMNS
        ))
        .bind(path)
        .fetch_optional(self.pool.pool())
        .await?;

        tracing::debug!(path = %path, found = doc.is_some(), "Looked up document by path");
        Ok(doc)
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i64) -> Result<Option<DocRecord>, DatabaseError> {
        let doc = sqlx::query_as::<_, DocRecord>(&format!(
            "SELECT {} FROM docs WHERE id = $1",
            SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(doc)
    }

    /// Page through documents ordered by id
    #[instrument(skip(self))]
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<DocRecord>, DatabaseError> {
        let docs = sqlx::query_as::<_, DocRecord>(&format!(
            "SELECT {} FROM docs ORDER BY id LIMIT $1 OFFSET $2",
            SELECT_ALL_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(docs)
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM docs")
            .fetch_one(self.pool.pool())
            .await?;
        Ok(total)
    }

    #[instrument(skip(self, doc), fields(path = %doc.path))]
    pub async fn create(&self, doc: &NewDoc) -> Result<DocRecord, DatabaseError> {
        let created = sqlx::query_as::<_, DocRecord>(&format!(
            "INSERT INTO docs (path, db_name, content) VALUES ($1, $2, $3) RETURNING {}",
            SELECT_ALL_COLUMNS
        ))
        .bind(&doc.path)
        .bind(&doc.db_name)
        .bind(&doc.content)
        .fetch_one(self.pool.pool())
        .await?;

        tracing::info!(doc_id = created.id, path = %created.path, "Document created");
        Ok(created)
    }

    /// Apply a partial update; `None` when no document has this id
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: i64, patch: &DocPatch) -> Result<Option<DocRecord>, DatabaseError> {
        let updated = sqlx::query_as::<_, DocRecord>(&format!(
            r#"
            UPDATE docs
            SET path = COALESCE($2, path),
                db_name = COALESCE($3, db_name),
                content = COALESCE($4, content),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_ALL_COLUMNS
        ))
        .bind(id)
        .bind(patch.path.as_deref())
        .bind(patch.db_name.as_deref())
        .bind(patch.content.as_deref())
        .fetch_optional(self.pool.pool())
        .await?;

        if updated.is_some() {
            tracing::info!(doc_id = id, "Document updated");
        }
        Ok(updated)
    }

    /// Returns whether a row was deleted
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM docs WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(doc_id = id, "Document deleted");
        }
        Ok(deleted)
    }
}
