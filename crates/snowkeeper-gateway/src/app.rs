use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{health_handler, identity_handler, uuid_handler};
use crate::state::AppState;

pub struct App {}

impl App {
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/uuid", get(uuid_handler))
            .route("/identity", get(identity_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
