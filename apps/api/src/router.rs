use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::appointment_routes;
use shared_config::AppConfig;
use vet_cell::router::availability_routes;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Vetdesk scheduling API is running!" }))
        .nest("/api/availability", availability_routes(state.clone()))
        .nest("/api/appointments", appointment_routes(state))
}
