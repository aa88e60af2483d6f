use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, jobs, run, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes, all behind the configured authenticator
    let api_routes = Router::new()
        // Run control
        .route("/run/start", post(run::start))
        .route("/run/pause", post(run::pause))
        .route("/run/resume", post(run::resume))
        .route("/run/stop", post(run::stop))
        .route("/run/priority-check", post(run::priority_check))
        .route("/run/sync", post(run::sync))
        .route("/run/status", get(run::status))
        // Jobs
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}/regenerate", post(jobs::regenerate))
        .route("/jobs/reset-from", post(jobs::reset_from))
        // Config
        .route("/config", get(handlers::get_config))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            super::middleware::auth_middleware,
        ));

    // Health, metrics, and the event stream stay outside auth
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/ws", get(ws::ws_handler))
        .nest("/api", api_routes)
        .layer(middleware::from_fn(super::middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
