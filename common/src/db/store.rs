// Template store backed by the metadata repositories

use crate::db::repositories::{DocRepository, DsnRepository};
use crate::db::DbPool;
use crate::errors::DatabaseError;
use crate::models::ConnectionDescriptor;
use crate::orchestrator::{StoredTemplate, TemplateStore};
use async_trait::async_trait;

/// `TemplateStore` over the `docs` and `dsns` tables
#[derive(Debug, Clone)]
pub struct PgTemplateStore {
    docs: DocRepository,
    dsns: DsnRepository,
}

impl PgTemplateStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            docs: DocRepository::new(pool.clone()),
            dsns: DsnRepository::new(pool),
        }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn find_template_by_path(
        &self,
        path: &str,
    ) -> Result<Option<StoredTemplate>, DatabaseError> {
        let doc = self.docs.find_by_path(path).await?;
        Ok(doc.map(|doc| StoredTemplate {
            path: doc.path,
            db_name: doc.db_name,
            content: doc.content,
        }))
    }

    async fn find_connection_descriptor(
        &self,
        name: &str,
    ) -> Result<Option<ConnectionDescriptor>, DatabaseError> {
        let dsn = self.dsns.find_by_name(name).await?;
        Ok(dsn.map(|dsn| dsn.descriptor()))
    }
}
