use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::handlers::{require_non_empty, ErrorResponse, ListParams, ListResponse, SuccessResponse};
use crate::state::AppState;
use common::db::repositories::DocRepository;
use common::models::{DocPatch, DocRecord, NewDoc};
use common::template::Template;

/// Reject document content that would fail at execution time
fn validate_content(content: &str) -> Result<(), ErrorResponse> {
    Template::parse(content.as_bytes()).map(|_| ()).map_err(|e| {
        ErrorResponse::new("validation_error", "Document content is not a valid template")
            .with_details(serde_json::json!({ "reason": e.to_string() }))
    })
}

fn validate_path(path: &str) -> Result<(), ErrorResponse> {
    require_non_empty("path", path)?;
    if !path.starts_with('/') {
        return Err(ErrorResponse::new(
            "validation_error",
            "path must start with '/'",
        ));
    }
    Ok(())
}

#[tracing::instrument(skip(state))]
pub async fn list_docs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<SuccessResponse<ListResponse<DocRecord>>>, ErrorResponse> {
    let (limit, offset) = params.normalized();
    let repo = DocRepository::new(state.db_pool.clone());

    let items = repo.list(limit, offset).await?;
    let total = repo.count().await?;

    Ok(Json(SuccessResponse::new(ListResponse { items, total })))
}

#[tracing::instrument(skip(state))]
pub async fn get_doc(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<DocRecord>>, ErrorResponse> {
    let repo = DocRepository::new(state.db_pool.clone());
    let doc = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Document", id))?;

    Ok(Json(SuccessResponse::new(doc)))
}

#[tracing::instrument(skip(state, req))]
pub async fn create_doc(
    State(state): State<AppState>,
    Json(req): Json<NewDoc>,
) -> Result<Json<SuccessResponse<DocRecord>>, ErrorResponse> {
    validate_path(&req.path)?;
    require_non_empty("db_name", &req.db_name)?;
    validate_content(&req.content)?;

    let repo = DocRepository::new(state.db_pool.clone());
    let doc = repo.create(&req).await?;

    tracing::info!(doc_id = doc.id, path = %doc.path, "Document created via API");
    Ok(Json(SuccessResponse::new(doc)))
}

#[tracing::instrument(skip(state, req))]
pub async fn update_doc(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<DocPatch>,
) -> Result<Json<SuccessResponse<DocRecord>>, ErrorResponse> {
    if let Some(path) = &req.path {
        validate_path(path)?;
    }
    if let Some(db_name) = &req.db_name {
        require_non_empty("db_name", db_name)?;
    }
    if let Some(content) = &req.content {
        validate_content(content)?;
    }

    let repo = DocRepository::new(state.db_pool.clone());
    let doc = repo
        .update(id, &req)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("Document", id))?;

    Ok(Json(SuccessResponse::new(doc)))
}

#[tracing::instrument(skip(state))]
pub async fn delete_doc(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<i64>>, ErrorResponse> {
    let repo = DocRepository::new(state.db_pool.clone());
    if !repo.delete(id).await? {
        return Err(ErrorResponse::not_found("Document", id));
    }

    Ok(Json(SuccessResponse::new(id)))
}
