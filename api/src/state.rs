use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use common::config::Settings;
use common::db::DbPool;
use common::orchestrator::Orchestrator;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub db_pool: DbPool,
    pub config: Arc<Settings>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        db_pool: DbPool,
        config: Settings,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            db_pool,
            config: Arc::new(config),
            metrics_handle,
        }
    }

    /// Whether a `debug` query value turns on SQL capture
    pub fn debug_enabled(&self, value: Option<&str>) -> bool {
        value == Some(self.config.composer.debug_param_value.as_str())
    }
}
