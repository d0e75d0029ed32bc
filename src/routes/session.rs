use axum::{Json, Router, extract::State, routing::post};
use tracing::info;

use crate::{
    dto::room::SessionResponse,
    services::identity::{CallerIdentity, IdentityProvider, issue_identity},
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/session",
    tag = "session",
    responses((status = 200, description = "Identity to send as x-player-id", body = SessionResponse))
)]
/// Sign in on demand: keep the caller's identity or issue a new anonymous one.
pub async fn create_session(
    State(_state): State<SharedState>,
    identity: CallerIdentity,
) -> Json<SessionResponse> {
    let player_id = match identity.current_identity() {
        Some(existing) => existing,
        None => {
            let issued = issue_identity();
            info!(player_id = %issued, "anonymous identity issued");
            issued
        }
    };
    Json(SessionResponse { player_id })
}

/// Session routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/session", post(create_session))
}
