use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::{
        identity::{CallerIdentity, IdentityProvider},
        sse_service,
    },
    state::SharedState,
};

/// Browsers cannot set headers on an `EventSource`, so the viewer may come as a query parameter.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ViewerQuery {
    /// Viewer identity, used when no `x-player-id` header is sent.
    pub player_id: Option<String>,
}

#[utoipa::path(
    get,
    path = "/rooms/{id}/events",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Room identifier"), ViewerQuery),
    responses(
        (status = 200, description = "Room snapshots: room, players, round, strokes, guesses, room.closed", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown room")
    )
)]
/// Stream full snapshots of a room whenever it changes.
pub async fn room_stream(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
    Query(query): Query<ViewerQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let viewer = identity
        .current_identity()
        .or(query.player_id.filter(|id| !id.trim().is_empty()));
    Ok(sse_service::subscribe_room(&state, id, viewer).await?)
}

/// SSE routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{id}/events", get(room_stream))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode, header::CONTENT_TYPE},
    };
    use futures::StreamExt;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        services::lobby_service,
        state::AppState,
    };

    #[tokio::test]
    async fn streams_room_snapshots_as_named_events() {
        let state =
            AppState::with_store(AppConfig::default(), Arc::new(MemoryRoomStore::new())).await;
        let created = lobby_service::create_room(&state, &CallerIdentity::new("a"), "Ana", None)
            .await
            .unwrap();
        let app = router().with_state(state);

        let uri = format!("/rooms/{}/events?player_id=a", created.room_id);
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        let first = String::from_utf8(first.to_vec()).unwrap();
        assert!(first.contains("event: room"), "unexpected frame {first}");

        let missing = format!("/rooms/{}/events", Uuid::new_v4());
        let response = app
            .oneshot(Request::get(missing).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
