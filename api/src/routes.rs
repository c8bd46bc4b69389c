use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the application router with all routes and middleware
#[tracing::instrument(skip(state))]
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let query_routes = Router::new()
        .route("/execute/*path", post(handlers::execute::execute_template))
        // Legacy route kept for existing callers
        .route("/sql-composer/*path", post(handlers::execute::execute_template));

    // Template document and DSN management
    let management_routes = Router::new()
        .route(
            "/v1/doc",
            get(handlers::docs::list_docs).post(handlers::docs::create_doc),
        )
        .route(
            "/v1/doc/:id",
            get(handlers::docs::get_doc)
                .patch(handlers::docs::update_doc)
                .delete(handlers::docs::delete_doc),
        )
        .route(
            "/v1/dsn",
            get(handlers::dsns::list_dsns).post(handlers::dsns::create_dsn),
        )
        .route(
            "/v1/dsn/:id",
            get(handlers::dsns::get_dsn)
                .patch(handlers::dsns::update_dsn)
                .delete(handlers::dsns::delete_dsn),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ping", get(handlers::health::ping))
        .route("/metrics", get(handlers::metrics::metrics_handler))
        .merge(query_routes)
        .merge(management_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
