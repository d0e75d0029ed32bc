use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/rooms/{id}/ws",
    tag = "websocket",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade into a room socket: identify first, then receive snapshots and send strokes or guesses.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, id, socket))
}

/// WebSocket routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{id}/ws", get(ws_handler))
}
