use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use common::errors::{FailureClass, QueryError};
use common::models::ExecuteResponse;

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteParams {
    pub debug: Option<String>,
}

/// Failure body of the execute endpoint; `sql` is set for execution failures
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryErrorBody {
    pub err: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

/// A query failure rendered as an HTTP response
#[derive(Debug)]
pub struct QueryFailure(pub QueryError);

impl IntoResponse for QueryFailure {
    fn into_response(self) -> Response {
        let status = match self.0.class() {
            FailureClass::NotFound => StatusCode::NOT_FOUND,
            FailureClass::BadInput => StatusCode::BAD_REQUEST,
            FailureClass::Execution => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let body = QueryErrorBody {
            err: self.0.to_string(),
            sql: self.0.sql().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

/// Template paths always carry a single leading slash
pub fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Execute the template stored under the wildcard path
#[tracing::instrument(skip(state, params, body))]
pub async fn execute_template(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<ExecuteParams>,
    body: Bytes,
) -> Result<Json<ExecuteResponse>, QueryFailure> {
    let path = normalize_path(&path);
    let debug = state.debug_enabled(params.debug.as_deref());

    let response = state
        .orchestrator
        .execute(&path, &body, debug)
        .await
        .map_err(QueryFailure)?;

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::create_router;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use common::composer::sql::Dialect;
    use common::config::Settings;
    use common::db::DbPool;
    use common::dictionary::AttributeDictionary;
    use common::errors::{DatabaseError, TargetError};
    use common::models::ConnectionDescriptor;
    use common::orchestrator::{Orchestrator, StoredTemplate, TemplateStore};
    use common::target::{Row, TargetConnection, TargetConnector};
    use common::token::TokenRegistry;
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;

    const PRODUCTS: &str = r#"
composition:
  subject:
    data: SELECT p.id, p.name FROM products p {{ where }} {{ order_by }} {{ limit }}
    total: SELECT COUNT(*) FROM products p {{ where }}
"#;

    const BROKEN: &str = "composition:\n  subject:\n    data: SELECT broken FROM products\n";

    struct FakeStore;

    #[async_trait]
    impl TemplateStore for FakeStore {
        async fn find_template_by_path(
            &self,
            path: &str,
        ) -> Result<Option<StoredTemplate>, DatabaseError> {
            let content = match path {
                "/products" => PRODUCTS,
                "/broken" => BROKEN,
                _ => return Ok(None),
            };
            Ok(Some(StoredTemplate {
                path: path.to_string(),
                db_name: "catalog".to_string(),
                content: content.to_string(),
            }))
        }

        async fn find_connection_descriptor(
            &self,
            _name: &str,
        ) -> Result<Option<ConnectionDescriptor>, DatabaseError> {
            Ok(Some(ConnectionDescriptor {
                driver: "mysql".to_string(),
                dsn: "mysql://fake/catalog".to_string(),
            }))
        }
    }

    struct FakeConnector;

    #[async_trait]
    impl TargetConnector for FakeConnector {
        async fn connect(
            &self,
            _descriptor: &ConnectionDescriptor,
        ) -> Result<Box<dyn TargetConnection>, TargetError> {
            Ok(Box::new(FakeConnection))
        }
    }

    struct FakeConnection;

    #[async_trait]
    impl TargetConnection for FakeConnection {
        fn dialect(&self) -> Dialect {
            Dialect::Question
        }

        async fn fetch_rows(&mut self, sql: &str, _args: &[Value]) -> Result<Vec<Row>, TargetError> {
            if sql.contains("broken") {
                return Err(TargetError::QueryFailed("Unknown column 'broken'".to_string()));
            }
            let mut row = Row::new();
            row.insert("id".to_string(), json!(1));
            row.insert("name".to_string(), json!("bolt"));
            Ok(vec![row])
        }

        async fn fetch_scalar(&mut self, _sql: &str, _args: &[Value]) -> Result<i64, TargetError> {
            Ok(1)
        }

        async fn close(self: Box<Self>) -> Result<(), TargetError> {
            Ok(())
        }
    }

    fn app() -> axum::Router {
        let settings = Settings::default();
        let pool = PgPoolOptions::new()
            .connect_lazy(&settings.database.url)
            .unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(FakeStore),
            Arc::new(FakeConnector),
            Arc::new(TokenRegistry::with_standard_tokens(&settings.composer.attributes)),
            Arc::new(AttributeDictionary::new()),
            settings.composer.attributes.dictionary_query.clone(),
        );
        let state = AppState::new(orchestrator, DbPool::from_pool(pool), settings, None);
        create_router(state)
    }

    async fn post(uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("products"), "/products");
        assert_eq!(normalize_path("/products/list"), "/products/list");
        assert_eq!(normalize_path("//products"), "/products");
    }

    #[tokio::test]
    async fn test_execute_returns_total_and_data() {
        let (status, body) = post(
            "/execute/products",
            r#"{"pageIndex": 1, "pageLimit": 10, "filters": [{"attr": "p.name", "op": "=", "val": "bolt"}]}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], json!(1));
        assert_eq!(body["data"], json!([{"id": 1, "name": "bolt"}]));
        assert_eq!(body["sql"], json!({}));
        assert!(body["exec_time"].is_string());
    }

    #[tokio::test]
    async fn test_debug_flag_captures_sql() {
        let (status, body) = post("/sql-composer/products?debug=1", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sql"]["total"], json!("SELECT COUNT(*) FROM products p"));
        assert_eq!(body["sql"]["data"], json!("SELECT p.id, p.name FROM products p"));
    }

    #[tokio::test]
    async fn test_other_debug_values_do_not_capture() {
        let (_, body) = post("/execute/products?debug=true", "").await;
        assert_eq!(body["sql"], json!({}));
    }

    #[tokio::test]
    async fn test_unknown_template_is_404() {
        let (status, body) = post("/execute/missing", "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["err"].as_str().unwrap().contains("/missing"));
        assert!(body.get("sql").is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (status, body) = post("/execute/products", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("sql").is_none());
    }

    #[tokio::test]
    async fn test_execution_failure_carries_sql() {
        let (status, body) = post("/execute/broken", "").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["sql"], json!("SELECT broken FROM products"));
        assert!(body["err"].as_str().unwrap().contains("Unknown column"));
    }
}
