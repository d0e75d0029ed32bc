use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::services::fanout_service::{RoomClosed, RoomClosedReason};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// Event name, if any.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// Sent once when the room stops being observable; the stream ends afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoomClosedEvent {
    /// Room that closed.
    pub room_id: Uuid,
    /// `deleted` when the host closed the room, `unreachable` otherwise.
    pub reason: String,
}

impl From<RoomClosed> for RoomClosedEvent {
    fn from(closed: RoomClosed) -> Self {
        Self {
            room_id: closed.room_id,
            reason: match closed.reason {
                RoomClosedReason::Deleted => "deleted",
                RoomClosedReason::Unreachable => "unreachable",
            }
            .to_string(),
        }
    }
}
