/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-memory backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dao::models::{
    GuessEntity, RoomEntity, RoomStatus, RoundEntity, StoreChange, StrokeEntity,
};
use crate::dao::storage::StorageResult;

/// Capacity of the in-process change channel shared by every backend.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Abstraction over the persistence layer for rooms and their child collections.
///
/// `commit_room` is the atomic read-modify-write primitive: it only succeeds when
/// the stored room still carries `expected_version`, otherwise it fails with
/// [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict) and leaves
/// every entity untouched.
pub trait RoomStore: Send + Sync {
    /// Insert a new room.
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a room by id.
    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Find a room holding `code`; an empty `statuses` slice matches any status.
    fn find_room_by_code(
        &self,
        code: String,
        statuses: Vec<RoomStatus>,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Rooms currently in `status`.
    fn list_rooms_by_status(
        &self,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>>;
    /// Load round `number` of a room.
    fn find_round(
        &self,
        room_id: Uuid,
        number: u32,
    ) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>>;
    /// Every round of a room, in number order.
    fn list_rounds(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>>;
    /// Apply a room transaction, returning the committed room.
    fn commit_room(&self, commit: RoomCommit) -> BoxFuture<'static, StorageResult<RoomEntity>>;
    /// Merge a new round limit into the room without replacing the document.
    /// The stored limit never drops below the room's current round.
    fn update_max_rounds(
        &self,
        room_id: Uuid,
        max_rounds: u32,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>>;
    /// Append a stroke to the canvas.
    fn append_stroke(
        &self,
        room_id: Uuid,
        stroke: StrokeEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop every stroke, returning how many were removed.
    fn clear_strokes(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<usize>>;
    /// Strokes in drawing order.
    fn list_strokes(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StrokeEntity>>>;
    /// Append an entry to the guess log.
    fn append_guess(
        &self,
        room_id: Uuid,
        guess: GuessEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Guess log in insertion order.
    fn list_guesses(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<GuessEntity>>>;
    /// Remove the room and every child entity, returning whether it existed.
    fn delete_room(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Subscribe to change notifications for every room.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
    /// Cheap round trip to the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Writes produced by a room transaction.
#[derive(Debug, Clone)]
pub struct RoomCommit {
    /// Version observed when the transaction read the room.
    pub expected_version: u64,
    /// New room state; the store assigns the bumped version.
    pub room: RoomEntity,
    /// Rounds to create or replace.
    pub put_rounds: Vec<RoundEntity>,
    /// Log entries to append.
    pub append_guesses: Vec<GuessEntity>,
    /// Drop every round, stroke and guess before applying the other writes.
    pub reset_children: bool,
}

impl RoomCommit {
    /// Start a commit for `room`, expecting the version it was read with.
    pub fn new(room: RoomEntity) -> Self {
        Self {
            expected_version: room.version,
            room,
            put_rounds: Vec::new(),
            append_guesses: Vec::new(),
            reset_children: false,
        }
    }

    /// Also create or replace `round`.
    pub fn with_round(mut self, round: RoundEntity) -> Self {
        self.put_rounds.push(round);
        self
    }

    /// Also append `guess` to the log.
    pub fn with_guess(mut self, guess: GuessEntity) -> Self {
        self.append_guesses.push(guess);
        self
    }

    /// Also drop every round, stroke and guess of the room.
    pub fn resetting_children(mut self) -> Self {
        self.reset_children = true;
        self
    }

    /// Room the commit targets.
    pub fn room_id(&self) -> Uuid {
        self.room.id
    }

    /// Change notifications describing this commit once applied.
    pub fn changes(&self) -> Vec<StoreChange> {
        let room_id = self.room.id;
        let mut changes = Vec::new();
        if self.reset_children {
            changes.push(StoreChange::RoundsCleared(room_id));
            changes.push(StoreChange::Strokes(room_id));
            changes.push(StoreChange::Guesses(room_id));
        }
        changes.push(StoreChange::Room(room_id));
        changes.extend(self.put_rounds.iter().map(|round| StoreChange::Round {
            room_id,
            number: round.number,
        }));
        if !self.append_guesses.is_empty() && !self.reset_children {
            changes.push(StoreChange::Guesses(room_id));
        }
        changes
    }
}

/// Broadcast wrapper used by stores to publish [`StoreChange`] events.
#[derive(Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<StoreChange>,
}

impl ChangeNotifier {
    /// Construct a notifier backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.sender.subscribe()
    }

    /// Send a change to all current subscribers, ignoring delivery errors.
    pub fn publish(&self, change: StoreChange) {
        let _ = self.sender.send(change);
    }

    /// Publish several changes in order.
    pub fn publish_all(&self, changes: impl IntoIterator<Item = StoreChange>) {
        for change in changes {
            self.publish(change);
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(CHANGE_CHANNEL_CAPACITY)
    }
}
