use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::models::{StrokeEntity, StrokePoint, now_ms},
    error::ServiceError,
    services::identity::IdentityProvider,
    state::SharedState,
};

/// Stroke submitted by a client, before it gets an id and a timestamp.
#[derive(Debug, Clone)]
pub struct NewStroke {
    /// Points in drawing order; never empty.
    pub points: Vec<StrokePoint>,
    /// CSS color.
    pub color: String,
    /// Line width in pixels.
    pub thickness: f32,
}

/// Append a stroke to the room canvas.
pub async fn add_stroke(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    room_id: Uuid,
    stroke: NewStroke,
) -> Result<StrokeEntity, ServiceError> {
    let caller = identity.require_identity()?;
    if stroke.points.is_empty() {
        return Err(ServiceError::InvalidInput("stroke has no points".into()));
    }
    let store = state.require_room_store().await?;
    let room = store
        .find_room(room_id)
        .await?
        .ok_or(ServiceError::RoomNotFound(room_id))?;
    if !room.has_player(&caller) {
        return Err(ServiceError::InvalidState(format!(
            "`{caller}` is not in this room"
        )));
    }

    let stroke = StrokeEntity {
        id: Uuid::new_v4(),
        points: stroke.points,
        color: stroke.color,
        thickness: stroke.thickness,
        created_at_ms: now_ms(),
    };
    store.append_stroke(room_id, stroke.clone()).await?;
    debug!(%room_id, stroke_id = %stroke.id, points = stroke.points.len(), "stroke added");
    Ok(stroke)
}

/// Remove every stroke of the room canvas, returning how many were dropped.
pub async fn clear_canvas(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    room_id: Uuid,
) -> Result<usize, ServiceError> {
    let caller = identity.require_identity()?;
    let store = state.require_room_store().await?;
    let room = store
        .find_room(room_id)
        .await?
        .ok_or(ServiceError::RoomNotFound(room_id))?;
    if !room.has_player(&caller) {
        return Err(ServiceError::InvalidState(format!(
            "`{caller}` is not in this room"
        )));
    }

    let removed = store.clear_strokes(room_id).await?;
    debug!(%room_id, removed, "canvas cleared");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lobby_service::tests::{memory_state, room_with, who};

    fn line() -> NewStroke {
        NewStroke {
            points: vec![StrokePoint { x: 0.0, y: 0.0 }, StrokePoint { x: 5.0, y: 5.0 }],
            color: "#ff0000".into(),
            thickness: 4.0,
        }
    }

    #[tokio::test]
    async fn strokes_are_appended_in_order_and_cleared() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 3).await;

        let first = add_stroke(&state, &who("a"), room_id, line()).await.unwrap();
        let second = add_stroke(&state, &who("b"), room_id, line()).await.unwrap();

        let store = state.require_room_store().await.unwrap();
        let ids: Vec<_> = store
            .list_strokes(room_id)
            .await
            .unwrap()
            .into_iter()
            .map(|stroke| stroke.id)
            .collect();
        assert_eq!(ids, [first.id, second.id]);

        assert_eq!(clear_canvas(&state, &who("a"), room_id).await.unwrap(), 2);
        assert!(store.list_strokes(room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outsiders_and_empty_strokes_are_rejected() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 3).await;

        let err = add_stroke(&state, &who("z"), room_id, line()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let empty = NewStroke {
            points: Vec::new(),
            ..line()
        };
        let err = add_stroke(&state, &who("a"), room_id, empty).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = clear_canvas(&state, &who("a"), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotFound(_)));
    }
}
