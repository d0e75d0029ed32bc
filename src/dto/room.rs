use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{
        GuessEntity, PlayerEntity, RoomEntity, RoomStatus, RoundEntity, StrokeEntity, StrokePoint,
    },
    dto::{
        format_timestamp_ms,
        validation::{validate_not_blank, validate_room_code},
    },
    services::{canvas_service::NewStroke, lobby_service::RoomSnapshot},
};

/// Payload used to open a new room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateRoomRequest {
    /// Display name of the host.
    #[validate(length(min = 1, max = 32), custom(function = validate_not_blank))]
    pub player_name: String,
    /// Rounds to play, clamped to 1..=15. Defaults to 7.
    #[serde(default)]
    pub max_rounds: Option<u32>,
}

/// Payload used to join a waiting room by its code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    /// Four-character join code.
    #[validate(custom(function = validate_room_code))]
    pub code: String,
    /// Display name in the room.
    #[validate(length(min = 1, max = 32), custom(function = validate_not_blank))]
    pub player_name: String,
}

/// Word picked by the drawer.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChooseWordRequest {
    /// Round the drawer is picking for.
    pub round: u32,
    /// Chosen word.
    #[validate(length(min = 1, max = 64), custom(function = validate_not_blank))]
    pub word: String,
}

/// Request to skip a word selection whose deadline passed.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SkipSelectionRequest {
    /// Round whose selection timed out.
    pub round: u32,
}

/// Guess typed by a player.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GuessRequest {
    /// Guess text, stored as typed.
    #[validate(length(min = 1, max = 64), custom(function = validate_not_blank))]
    pub text: String,
}

/// New round limit for a room.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct MaxRoundsRequest {
    /// New round limit, clamped to 1..=15.
    pub max_rounds: u32,
}

/// Canvas coordinate.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, ToSchema)]
pub struct PointDto {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl From<PointDto> for StrokePoint {
    fn from(point: PointDto) -> Self {
        StrokePoint {
            x: point.x,
            y: point.y,
        }
    }
}

impl From<StrokePoint> for PointDto {
    fn from(point: StrokePoint) -> Self {
        PointDto {
            x: point.x,
            y: point.y,
        }
    }
}

/// Stroke drawn on the room canvas.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct StrokeRequest {
    /// Points in drawing order.
    #[validate(length(min = 1))]
    pub points: Vec<PointDto>,
    /// CSS color of the stroke.
    #[validate(length(min = 1, max = 32))]
    pub color: String,
    /// Line width in pixels.
    #[validate(range(exclusive_min = 0.0, max = 100.0))]
    pub thickness: f32,
}

impl From<StrokeRequest> for NewStroke {
    fn from(request: StrokeRequest) -> Self {
        NewStroke {
            points: request.points.into_iter().map(Into::into).collect(),
            color: request.color,
            thickness: request.thickness,
        }
    }
}

/// Identity issued to a client signing in on demand.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    /// Value to send back in the `x-player-id` header.
    pub player_id: String,
}

/// Room opened by the caller.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedRoomResponse {
    /// Room id.
    pub room_id: Uuid,
    /// Join code to share.
    pub code: String,
}

/// Room the caller now sits in.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinRoomResponse {
    /// Room id.
    pub room_id: Uuid,
}

/// Whether a command changed anything; `false` when its precondition no longer held.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    /// The command committed.
    pub applied: bool,
}

/// Outcome of a guess.
#[derive(Debug, Serialize, ToSchema)]
pub struct GuessResponse {
    /// The guess matched the secret word.
    pub correct: bool,
    /// This guess won the round.
    pub scored: bool,
}

/// Words offered to the drawer.
#[derive(Debug, Serialize, ToSchema)]
pub struct WordsResponse {
    /// Candidate words.
    pub words: Vec<String>,
}

/// Result of clearing the canvas.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClearCanvasResponse {
    /// Strokes removed.
    pub removed: usize,
}

/// Player with score.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PlayerSummary {
    /// Player identity.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Points so far.
    pub score: u32,
    /// Join time, RFC3339.
    pub joined_at: String,
}

impl From<PlayerEntity> for PlayerSummary {
    fn from(player: PlayerEntity) -> Self {
        Self {
            id: player.id,
            name: player.name,
            score: player.score,
            joined_at: format_timestamp_ms(player.joined_at_ms),
        }
    }
}

/// Public view of a room.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct RoomSummary {
    /// Room id.
    pub id: Uuid,
    /// Join code.
    pub code: String,
    /// Identity of the host.
    pub host_id: String,
    /// `waiting`, `word-selection`, `playing` or `ended`.
    pub status: String,
    /// Round being played, 0 before the start.
    pub current_round: u32,
    /// Round limit.
    pub max_rounds: u32,
    /// Players in join order.
    pub players: Vec<PlayerSummary>,
    /// Creation time, RFC3339.
    pub created_at: String,
}

impl From<RoomEntity> for RoomSummary {
    fn from(room: RoomEntity) -> Self {
        let players = room
            .players_by_join_time()
            .into_iter()
            .map(PlayerSummary::from)
            .collect();
        Self {
            id: room.id,
            code: room.code,
            host_id: room.host_id,
            status: room.status.as_str().to_string(),
            current_round: room.current_round,
            max_rounds: room.max_rounds,
            players,
            created_at: format_timestamp_ms(room.created_at_ms),
        }
    }
}

/// Round as seen by one viewer. The secret word is only revealed to the
/// drawer, or to everyone once the room ended.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct RoundSummary {
    /// Round number, from 1.
    pub number: u32,
    /// Identity of the drawer.
    pub drawer_id: String,
    /// The drawer picked a word.
    pub word_chosen: bool,
    /// Secret word, when visible to the viewer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_word: Option<String>,
    /// Round start, RFC3339.
    pub started_at: String,
    /// Word selection deadline, RFC3339.
    pub selection_deadline: String,
}

impl RoundSummary {
    /// Project `round` for `viewer`.
    pub fn for_viewer(round: RoundEntity, status: RoomStatus, viewer: Option<&str>) -> Self {
        let word_chosen = !round.is_pending_selection();
        let reveal = word_chosen
            && (status == RoomStatus::Ended || viewer == Some(round.drawer_id.as_str()));
        Self {
            number: round.number,
            word_chosen,
            secret_word: reveal.then_some(round.secret_word),
            started_at: format_timestamp_ms(round.started_at_ms),
            selection_deadline: format_timestamp_ms(round.selection_deadline_ms),
            drawer_id: round.drawer_id,
        }
    }
}

/// Stroke on the canvas.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct StrokeSummary {
    /// Stroke id.
    pub id: Uuid,
    /// Points in drawing order.
    pub points: Vec<PointDto>,
    /// CSS color.
    pub color: String,
    /// Line width in pixels.
    pub thickness: f32,
    /// Creation time, RFC3339.
    pub created_at: String,
}

impl From<StrokeEntity> for StrokeSummary {
    fn from(stroke: StrokeEntity) -> Self {
        Self {
            id: stroke.id,
            points: stroke.points.into_iter().map(Into::into).collect(),
            color: stroke.color,
            thickness: stroke.thickness,
            created_at: format_timestamp_ms(stroke.created_at_ms),
        }
    }
}

/// Guess log entry.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct GuessSummary {
    /// Entry id.
    pub id: Uuid,
    /// Author, or `system`.
    pub player_id: String,
    /// Author display name.
    pub player_name: String,
    /// Text as typed.
    pub text: String,
    /// The text matched the secret word.
    pub is_correct: bool,
    /// Creation time, RFC3339.
    pub created_at: String,
}

impl From<GuessEntity> for GuessSummary {
    fn from(guess: GuessEntity) -> Self {
        Self {
            id: guess.id,
            player_id: guess.player_id,
            player_name: guess.player_name,
            text: guess.text,
            is_correct: guess.is_correct,
            created_at: format_timestamp_ms(guess.created_at_ms),
        }
    }
}

/// Room with its ranking and current round.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomSnapshotResponse {
    /// Room and its players in join order.
    pub room: RoomSummary,
    /// Players by descending score.
    pub ranking: Vec<PlayerSummary>,
    /// Current round, if started.
    pub round: Option<RoundSummary>,
}

impl RoomSnapshotResponse {
    /// Project `snapshot` for `viewer`.
    pub fn for_viewer(snapshot: RoomSnapshot, viewer: Option<&str>) -> Self {
        let status = snapshot.room.status;
        Self {
            ranking: snapshot.ranking.into_iter().map(Into::into).collect(),
            round: snapshot
                .round
                .map(|round| RoundSummary::for_viewer(round, status, viewer)),
            room: snapshot.room.into(),
        }
    }
}
