use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::RoomStatus,
    dto::{
        room::{
            GuessRequest, GuessSummary, PlayerSummary, RoomSummary, RoundSummary, StrokeRequest,
            StrokeSummary,
        },
        sse::{RoomClosedEvent, ServerEvent},
    },
    services::fanout_service::{RoomClosed, RoomUpdate},
};

#[derive(Debug, Deserialize, ToSchema)]
/// Messages accepted from room WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first frame of the connection.
    Identification {
        /// Identity the client plays as.
        player_id: String,
    },
    /// Draw a stroke.
    Stroke(StrokeRequest),
    /// Submit a guess.
    Guess(GuessRequest),
    /// Any other `type`; ignored.
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a text frame and validate its payload.
    pub fn from_json_str(text: &str) -> Result<Self, ClientMessageError> {
        let message: Self = serde_json::from_str(text)?;
        match &message {
            Self::Stroke(stroke) => stroke.validate()?,
            Self::Guess(guess) => guess.validate()?,
            Self::Identification { player_id } if player_id.trim().is_empty() => {
                return Err(ClientMessageError::BlankIdentity);
            }
            _ => {}
        }
        Ok(message)
    }
}

/// Reasons a client frame is rejected.
#[derive(Debug, thiserror::Error)]
pub enum ClientMessageError {
    /// Not JSON, or not a known message shape.
    #[error("malformed message: {0}")]
    Parse(#[from] serde_json::Error),
    /// Payload failed validation.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationErrors),
    /// Identification with an empty player id.
    #[error("identification carries a blank player id")]
    BlankIdentity,
}

#[derive(Debug, Serialize, ToSchema)]
/// Frames pushed to room WebSocket clients.
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Room status and settings.
    Room(RoomSummary),
    /// Players in join order.
    Players(Vec<PlayerSummary>),
    /// Current round, `null` before the game starts.
    Round(Option<RoundSummary>),
    /// Whole canvas.
    Strokes(Vec<StrokeSummary>),
    /// Whole guess log.
    Guesses(Vec<GuessSummary>),
    /// Last frame before the socket closes.
    RoomClosed(RoomClosedEvent),
    /// A command sent over the socket failed.
    Error {
        /// Failure description.
        message: String,
    },
}

impl ServerFrame {
    /// SSE event name of the frame.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Room(_) => "room",
            Self::Players(_) => "players",
            Self::Round(_) => "round",
            Self::Strokes(_) => "strokes",
            Self::Guesses(_) => "guesses",
            Self::RoomClosed(_) => "room.closed",
            Self::Error { .. } => "error",
        }
    }

    /// Named SSE event carrying only the frame payload.
    pub fn to_server_event(&self) -> serde_json::Result<ServerEvent> {
        let name = Some(self.event_name().to_string());
        match self {
            Self::Room(room) => ServerEvent::json(name, room),
            Self::Players(players) => ServerEvent::json(name, players),
            Self::Round(round) => ServerEvent::json(name, round),
            Self::Strokes(strokes) => ServerEvent::json(name, strokes),
            Self::Guesses(guesses) => ServerEvent::json(name, guesses),
            Self::RoomClosed(closed) => ServerEvent::json(name, closed),
            Self::Error { message } => ServerEvent::json(name, &serde_json::json!({ "message": message })),
        }
    }
}

/// Turns fan-out snapshots into frames for a single viewer.
///
/// Tracks the last room status so the round's secret word is revealed only
/// to its drawer until the room ends.
pub struct RoomProjection {
    viewer: Option<String>,
    status: RoomStatus,
}

impl RoomProjection {
    /// Projection for `viewer`; `None` sees no secret word until the room ends.
    pub fn new(viewer: Option<String>) -> Self {
        Self {
            viewer,
            status: RoomStatus::Waiting,
        }
    }

    /// Frame for one snapshot.
    pub fn frame(&mut self, update: RoomUpdate) -> ServerFrame {
        match update {
            RoomUpdate::Room(room) => {
                self.status = room.status;
                ServerFrame::Room(room.into())
            }
            RoomUpdate::Players(players) => {
                ServerFrame::Players(players.into_iter().map(Into::into).collect())
            }
            RoomUpdate::Round(round) => ServerFrame::Round(round.map(|round| {
                RoundSummary::for_viewer(round, self.status, self.viewer.as_deref())
            })),
            RoomUpdate::Strokes(strokes) => {
                ServerFrame::Strokes(strokes.into_iter().map(Into::into).collect())
            }
            RoomUpdate::Guesses(guesses) => {
                ServerFrame::Guesses(guesses.into_iter().map(Into::into).collect())
            }
        }
    }

    /// Frame announcing the room closed.
    pub fn closed(closed: RoomClosed) -> ServerFrame {
        ServerFrame::RoomClosed(closed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_client_messages() {
        let message =
            ClientMessage::from_json_str(r#"{"type":"identification","player_id":"p1"}"#).unwrap();
        assert!(matches!(message, ClientMessage::Identification { player_id } if player_id == "p1"));

        let message = ClientMessage::from_json_str(r#"{"type":"guess","text":"arca"}"#).unwrap();
        assert!(matches!(message, ClientMessage::Guess(GuessRequest { text }) if text == "arca"));

        let message = ClientMessage::from_json_str(r#"{"type":"wave"}"#).unwrap();
        assert!(matches!(message, ClientMessage::Unknown));
    }

    #[test]
    fn rejects_invalid_payloads() {
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"type":"guess","text":""}"#),
            Err(ClientMessageError::Invalid(_))
        ));
        assert!(matches!(
            ClientMessage::from_json_str(
                r##"{"type":"stroke","points":[],"color":"#000","thickness":2}"##
            ),
            Err(ClientMessageError::Invalid(_))
        ));
        assert!(matches!(
            ClientMessage::from_json_str(r#"{"type":"identification","player_id":" "}"#),
            Err(ClientMessageError::BlankIdentity)
        ));
        assert!(matches!(
            ClientMessage::from_json_str("not json"),
            Err(ClientMessageError::Parse(_))
        ));
    }

    #[test]
    fn projection_masks_the_word_until_the_room_ends() {
        use crate::dao::models::{RoomEntity, RoundEntity};

        let round = RoundEntity {
            number: 2,
            drawer_id: "a".into(),
            secret_word: "arca".into(),
            started_at_ms: 0,
            selection_deadline_ms: 0,
        };
        let mut room = RoomEntity {
            id: uuid::Uuid::new_v4(),
            code: "AB12".into(),
            host_id: "a".into(),
            status: RoomStatus::Playing,
            current_round: 2,
            max_rounds: 2,
            players: Vec::new(),
            created_at_ms: 0,
            version: 3,
        };
        let mut projection = RoomProjection::new(Some("b".into()));

        projection.frame(RoomUpdate::Room(room.clone()));
        match projection.frame(RoomUpdate::Round(Some(round.clone()))) {
            ServerFrame::Round(Some(summary)) => assert_eq!(summary.secret_word, None),
            other => panic!("unexpected frame {other:?}"),
        }

        room.status = RoomStatus::Ended;
        projection.frame(RoomUpdate::Room(room));
        match projection.frame(RoomUpdate::Round(Some(round))) {
            ServerFrame::Round(Some(summary)) => {
                assert_eq!(summary.secret_word.as_deref(), Some("arca"))
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn sse_events_carry_the_bare_payload() {
        let event = ServerFrame::Players(Vec::new()).to_server_event().unwrap();
        assert_eq!(event.event.as_deref(), Some("players"));
        assert_eq!(event.data, "[]");
    }

    #[test]
    fn server_frames_are_tagged() {
        let frame = ServerFrame::Error {
            message: "nope".into(),
        };
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"type":"error","data":{"message":"nope"}}"#
        );
    }
}
