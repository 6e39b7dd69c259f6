use crate::error::Result;
use crate::model::IdentityResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;

/// Returns the next id as a decimal string.
///
/// Generation may briefly block on clock drift or sequence rollover, so it
/// runs on the blocking pool.
pub async fn uuid_handler(State(state): State<AppState>) -> Result<String> {
    let generator = state.generator();
    let id = tokio::task::spawn_blocking(move || generator.next_id()).await??;
    Ok(id.to_string())
}

pub async fn identity_handler(State(state): State<AppState>) -> Json<IdentityResponse> {
    let identity = state.generator().identity();
    Json(IdentityResponse {
        worker_id: identity.worker_id(),
        datacenter_id: identity.datacenter_id(),
    })
}
