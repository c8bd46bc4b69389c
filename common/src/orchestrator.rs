// Execution orchestrator
//
// Per-request control flow: resolve the template and its target database,
// decode the caller's filters, render every subject, then execute them over
// one ad hoc connection and assemble the response.

use crate::composer::{Composer, QueryContext, RenderedStatement, FULLTEXT_PIPELINE};
use crate::dictionary::{AttributeDictionary, ConnectionDictionarySource};
use crate::errors::{DatabaseError, FailureClass, QueryError};
use crate::models::{ConnectionDescriptor, ExecuteRequest, ExecuteResponse};
use crate::target::{TargetConnection, TargetConnector};
use crate::telemetry;
use crate::template::{Template, TOTAL_SUBJECT};
use crate::token::TokenRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// A stored template document as the orchestrator needs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTemplate {
    pub path: String,
    pub db_name: String,
    pub content: String,
}

/// Lookup interface onto the template and DSN registry
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn find_template_by_path(
        &self,
        path: &str,
    ) -> Result<Option<StoredTemplate>, DatabaseError>;

    async fn find_connection_descriptor(
        &self,
        name: &str,
    ) -> Result<Option<ConnectionDescriptor>, DatabaseError>;
}

pub struct Orchestrator {
    store: Arc<dyn TemplateStore>,
    connector: Arc<dyn TargetConnector>,
    registry: Arc<TokenRegistry>,
    dictionary: Arc<AttributeDictionary>,
    dictionary_query: String,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TemplateStore>,
        connector: Arc<dyn TargetConnector>,
        registry: Arc<TokenRegistry>,
        dictionary: Arc<AttributeDictionary>,
        dictionary_query: impl Into<String>,
    ) -> Self {
        Self {
            store,
            connector,
            registry,
            dictionary,
            dictionary_query: dictionary_query.into(),
        }
    }

    pub fn dictionary(&self) -> &Arc<AttributeDictionary> {
        &self.dictionary
    }

    /// Execute the template served at `path` with the given request body.
    ///
    /// With `debug` set, the response carries the rendered SQL of every subject.
    #[tracing::instrument(skip(self, body, debug), fields(body_len = body.len()))]
    pub async fn execute(
        &self,
        path: &str,
        body: &[u8],
        debug: bool,
    ) -> Result<ExecuteResponse, QueryError> {
        let started = Instant::now();
        telemetry::record_query_request(path);

        let result = self.run(path, body, debug, started).await;
        telemetry::record_query_duration(path, started.elapsed().as_secs_f64());

        match &result {
            Ok(response) => {
                tracing::info!(
                    path = %path,
                    total = ?response.total,
                    rows = response.data.as_ref().map(Vec::len),
                    exec_time = %response.exec_time,
                    "Query executed"
                );
            }
            Err(e) => {
                telemetry::record_query_failure(path, e.kind());
                match e.class() {
                    FailureClass::Execution => {
                        tracing::error!(path = %path, kind = e.kind(), sql = ?e.sql(), error = %e, "Query failed")
                    }
                    _ if matches!(e, QueryError::ConnectionResolutionFailed(_)) => {
                        tracing::error!(path = %path, kind = e.kind(), error = %e, "Query failed")
                    }
                    _ => tracing::warn!(path = %path, kind = e.kind(), error = %e, "Query rejected"),
                }
            }
        }

        result
    }

    async fn run(
        &self,
        path: &str,
        body: &[u8],
        debug: bool,
        started: Instant,
    ) -> Result<ExecuteResponse, QueryError> {
        let stored = match self.store.find_template_by_path(path).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return Err(QueryError::TemplateNotFound(path.to_string())),
            Err(e) => {
                tracing::error!(path = %path, error = %e, "Template lookup failed");
                return Err(QueryError::TemplateNotFound(path.to_string()));
            }
        };

        let request = ExecuteRequest::from_slice(body).map_err(QueryError::RequestDecodeFailed)?;
        let template = Template::parse(stored.content.as_bytes())?;

        let descriptor = match self.store.find_connection_descriptor(&stored.db_name).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                return Err(QueryError::ConnectionResolutionFailed(format!(
                    "no connection registered under '{}'",
                    stored.db_name
                )))
            }
            Err(e) => {
                return Err(QueryError::ConnectionResolutionFailed(format!(
                    "lookup of '{}' failed: {}",
                    stored.db_name, e
                )))
            }
        };

        let mut conn = self
            .connector
            .connect(&descriptor)
            .await
            .map_err(|e| QueryError::ConnectionResolutionFailed(e.to_string()))?;

        let result = self
            .compose_and_execute(&template, &request, conn.as_mut(), debug)
            .await;

        if let Err(e) = conn.close().await {
            tracing::warn!(db_name = %stored.db_name, error = %e, "Failed to close target connection");
        }

        let mut response = result?;
        response.exec_time = format!("{:?}", started.elapsed());
        Ok(response)
    }

    /// Render every subject first; execution starts only once all rendered
    async fn compose_and_execute(
        &self,
        template: &Template,
        request: &ExecuteRequest,
        conn: &mut dyn TargetConnection,
        debug: bool,
    ) -> Result<ExecuteResponse, QueryError> {
        let mut composer = Composer::new(template, &self.registry, conn.dialect());
        composer.enable_pipeline(FULLTEXT_PIPELINE);

        if composer.needs_dictionary() {
            let mut source = ConnectionDictionarySource::new(&mut *conn, &self.dictionary_query);
            let snapshot = self.dictionary.ensure_loaded(&mut source).await;
            composer.set_dictionary(snapshot);
        }

        let context = QueryContext::from_request(request);
        let mut statements: Vec<(String, RenderedStatement)> = Vec::new();
        for subject in template.subject_keys() {
            let statement = composer.render(subject, &context)?;
            statements.push((subject.to_string(), statement));
        }

        let mut response = ExecuteResponse::default();
        if debug {
            for (subject, statement) in &statements {
                response.sql.insert(subject.clone(), statement.sql.clone());
            }
        }

        for (subject, statement) in statements {
            let execution_failed = |message: String| QueryError::ExecutionFailed {
                subject: subject.clone(),
                message,
                sql: statement.sql.clone(),
            };

            if subject == TOTAL_SUBJECT {
                let total = conn
                    .fetch_scalar(&statement.sql, &statement.args)
                    .await
                    .map_err(|e| execution_failed(e.to_string()))?;
                response.total = Some(total);
            } else {
                let rows = conn
                    .fetch_rows(&statement.sql, &statement.args)
                    .await
                    .map_err(|e| execution_failed(e.to_string()))?;
                response.data.get_or_insert_with(Vec::new).extend(rows);
            }
        }

        Ok(response)
    }
}
