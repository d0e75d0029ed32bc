use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity used for log entries emitted by the game itself.
pub const SYSTEM_PLAYER_ID: &str = "system";
/// Display name attached to system log entries.
pub const SYSTEM_PLAYER_NAME: &str = "Sistema";

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RoomStatus {
    /// Lobby: players may join, nothing is running.
    Waiting,
    /// The drawer of the current round must pick a word.
    WordSelection,
    /// The drawer is drawing and the others are guessing.
    Playing,
    /// Every round has been played.
    Ended,
}

impl RoomStatus {
    /// Wire representation, shared by every backend.
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::WordSelection => "word-selection",
            RoomStatus::Playing => "playing",
            RoomStatus::Ended => "ended",
        }
    }

    /// Statuses of a running room.
    pub fn active() -> [RoomStatus; 3] {
        [
            RoomStatus::Waiting,
            RoomStatus::WordSelection,
            RoomStatus::Playing,
        ]
    }

    /// Every status; a room holds its join code until it is deleted.
    pub fn all() -> [RoomStatus; 4] {
        [
            RoomStatus::Waiting,
            RoomStatus::WordSelection,
            RoomStatus::Playing,
            RoomStatus::Ended,
        ]
    }
}

/// Player embedded in its room document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identity of the user.
    pub id: String,
    /// Display name chosen on join.
    pub name: String,
    /// Accumulated score.
    pub score: u32,
    /// Join timestamp (milliseconds since the Unix epoch).
    pub joined_at_ms: u64,
}

/// Root aggregate persisted for every room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Store-assigned identifier.
    pub id: Uuid,
    /// Four character join code.
    pub code: String,
    /// Identity of the player who created the room.
    pub host_id: String,
    /// Current lifecycle status.
    pub status: RoomStatus,
    /// Number of the running round, 0 while no round has started.
    pub current_round: u32,
    /// Number of rounds to play before the room ends.
    pub max_rounds: u32,
    /// Players in join order.
    pub players: Vec<PlayerEntity>,
    /// Creation timestamp (milliseconds since the Unix epoch).
    pub created_at_ms: u64,
    /// Optimistic concurrency token, bumped on every committed write.
    pub version: u64,
}

impl RoomEntity {
    /// Look up a player by identity.
    pub fn player(&self, id: &str) -> Option<&PlayerEntity> {
        self.players.iter().find(|player| player.id == id)
    }

    /// Whether `id` already belongs to the room.
    pub fn has_player(&self, id: &str) -> bool {
        self.player(id).is_some()
    }

    /// Players sorted by join time.
    pub fn players_by_join_time(&self) -> Vec<PlayerEntity> {
        let mut players = self.players.clone();
        players.sort_by_key(|player| player.joined_at_ms);
        players
    }
}

/// One drawer/secret-word cycle of a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    /// Round number, also used as identifier.
    pub number: u32,
    /// Identity of the drawer.
    pub drawer_id: String,
    /// Secret word, empty until the drawer picked one.
    pub secret_word: String,
    /// Creation timestamp (milliseconds since the Unix epoch).
    pub started_at_ms: u64,
    /// Moment after which the word selection may be skipped.
    pub selection_deadline_ms: u64,
}

impl RoundEntity {
    /// Whether the drawer has not picked a word yet.
    pub fn is_pending_selection(&self) -> bool {
        self.secret_word.is_empty()
    }

    /// Whether the selection countdown elapsed at `now_ms`.
    pub fn selection_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.selection_deadline_ms
    }
}

/// Single point of a stroke.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StrokePoint {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

/// Append-only canvas entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrokeEntity {
    /// Stroke id.
    pub id: Uuid,
    /// Points in drawing order.
    pub points: Vec<StrokePoint>,
    /// CSS color.
    pub color: String,
    /// Line width in pixels.
    pub thickness: f32,
    /// Creation time, ms since the epoch.
    pub created_at_ms: u64,
}

/// Append-only chat / guess log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuessEntity {
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
    /// Creation time, ms since the epoch.
    pub created_at_ms: u64,
}

impl GuessEntity {
    /// Build a log entry authored by the game itself.
    pub fn system(text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            player_id: SYSTEM_PLAYER_ID.to_string(),
            player_name: SYSTEM_PLAYER_NAME.to_string(),
            text,
            is_correct: false,
            created_at_ms: now_ms(),
        }
    }
}

/// Change notification emitted by a store after a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    /// The room document (including its players) changed.
    Room(Uuid),
    /// A single round document was written.
    Round { room_id: Uuid, number: u32 },
    /// Every round of the room was removed.
    RoundsCleared(Uuid),
    /// The stroke log changed.
    Strokes(Uuid),
    /// The guess log changed.
    Guesses(Uuid),
    /// The room and its children are gone.
    RoomDeleted(Uuid),
}

impl StoreChange {
    /// Room the change belongs to.
    pub fn room_id(&self) -> Uuid {
        match *self {
            StoreChange::Room(id)
            | StoreChange::RoundsCleared(id)
            | StoreChange::Strokes(id)
            | StoreChange::Guesses(id)
            | StoreChange::RoomDeleted(id) => id,
            StoreChange::Round { room_id, .. } => room_id,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
