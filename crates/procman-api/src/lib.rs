//! REST control surface for the job supervisor.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use procman_core::Registry;
use procman_store::JobStore;
use procman_types::JobDescriptor;
use tokio::sync::mpsc;

mod handlers;
mod middleware;
mod responses;

/// Everything the REST handlers need.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub registry: Registry,
    /// Sink for freshly created descriptors; the registry ingress picks
    /// them up and materialises a supervisor.
    pub arrivals: mpsc::Sender<JobDescriptor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/states", get(handlers::list_job_states))
        .route("/job/create", post(handlers::create_job))
        .route("/job/replace/:name", put(handlers::replace_job))
        .route("/job/delete/:name", delete(handlers::delete_job))
        .route("/job/:name", get(handlers::get_job))
        .route("/job/:name/start", get(handlers::start_job))
        .route("/job/:name/stop", get(handlers::stop_job))
        .route("/job/:name/restart", get(handlers::restart_job))
        .route("/job/:name/state", get(handlers::job_state))
        .layer(axum_middleware::from_fn(middleware::log_requests))
        .with_state(state)
}

/// Binds `0.0.0.0:<port>` and serves requests until the server fails.
///
/// # Errors
///
/// Returns the bind or accept-loop error; there is no clean shutdown
/// trigger in this release.
pub async fn serve(port: u16, state: AppState) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "web server listening");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
