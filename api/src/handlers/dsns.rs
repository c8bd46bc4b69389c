use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::handlers::{require_non_empty, ErrorResponse, ListParams, ListResponse, SuccessResponse};
use crate::state::AppState;
use common::db::repositories::DsnRepository;
use common::models::{DriverKind, DsnPatch, DsnRecord, NewDsn};

fn validate_driver(driver: &str) -> Result<(), ErrorResponse> {
    driver
        .parse::<DriverKind>()
        .map(|_| ())
        .map_err(|reason| ErrorResponse::new("validation_error", reason))
}

#[tracing::instrument(skip(state))]
pub async fn list_dsns(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<SuccessResponse<ListResponse<DsnRecord>>>, ErrorResponse> {
    let (limit, offset) = params.normalized();
    let repo = DsnRepository::new(state.db_pool.clone());

    let items = repo.list(limit, offset).await?;
    let total = repo.count().await?;

    Ok(Json(SuccessResponse::new(ListResponse { items, total })))
}

#[tracing::instrument(skip(state))]
pub async fn get_dsn(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<DsnRecord>>, ErrorResponse> {
    let repo = DsnRepository::new(state.db_pool.clone());
    let dsn = repo
        .find_by_id(id)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("DSN", id))?;

    Ok(Json(SuccessResponse::new(dsn)))
}

#[tracing::instrument(skip(state, req))]
pub async fn create_dsn(
    State(state): State<AppState>,
    Json(req): Json<NewDsn>,
) -> Result<Json<SuccessResponse<DsnRecord>>, ErrorResponse> {
    require_non_empty("name", &req.name)?;
    require_non_empty("dsn", &req.dsn)?;
    validate_driver(&req.driver)?;

    let repo = DsnRepository::new(state.db_pool.clone());
    let dsn = repo.create(&req).await?;

    tracing::info!(dsn_id = dsn.id, name = %dsn.name, "DSN created via API");
    Ok(Json(SuccessResponse::new(dsn)))
}

#[tracing::instrument(skip(state, req))]
pub async fn update_dsn(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<DsnPatch>,
) -> Result<Json<SuccessResponse<DsnRecord>>, ErrorResponse> {
    if let Some(name) = &req.name {
        require_non_empty("name", name)?;
    }
    if let Some(dsn) = &req.dsn {
        require_non_empty("dsn", dsn)?;
    }
    if let Some(driver) = &req.driver {
        validate_driver(driver)?;
    }

    let repo = DsnRepository::new(state.db_pool.clone());
    let dsn = repo
        .update(id, &req)
        .await?
        .ok_or_else(|| ErrorResponse::not_found("DSN", id))?;

    Ok(Json(SuccessResponse::new(dsn)))
}

#[tracing::instrument(skip(state))]
pub async fn delete_dsn(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<i64>>, ErrorResponse> {
    let repo = DsnRepository::new(state.db_pool.clone());
    if !repo.delete(id).await? {
        return Err(ErrorResponse::not_found("DSN", id));
    }

    Ok(Json(SuccessResponse::new(id)))
}
