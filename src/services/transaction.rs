//! Optimistic read-modify-write over a room and its current round.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::RetryPolicy,
    dao::{
        models::{RoomEntity, RoundEntity},
        room_store::{RoomCommit, RoomStore},
    },
    error::ServiceError,
};

/// Consistent view handed to a transaction plan.
#[derive(Debug, Clone)]
pub struct TxnView {
    /// Room as read.
    pub room: RoomEntity,
    /// Round matching `room.current_round`, `None` before the first round.
    pub round: Option<RoundEntity>,
}

impl TxnView {
    /// Current round, failing when a started room lost it.
    pub fn require_round(&self) -> Result<&RoundEntity, ServiceError> {
        self.round.as_ref().ok_or_else(|| {
            ServiceError::InvariantViolation(format!(
                "round {} of room `{}` is missing",
                self.room.current_round, self.room.id
            ))
        })
    }
}

/// What a plan decided after looking at the fresh view.
pub enum TxnDecision<T> {
    /// Write the commit and return the value once it landed.
    Commit(RoomCommit, T),
    /// Precondition no longer holds: nothing to write.
    Skip(T),
}

/// Result of [`run_room_transaction`].
#[derive(Debug)]
pub enum TxnOutcome<T> {
    /// The commit landed; carries the stored room.
    Committed(RoomEntity, T),
    /// The plan skipped; nothing was written.
    Skipped(T),
}

impl<T> TxnOutcome<T> {
    /// Whether the commit landed.
    pub fn is_committed(&self) -> bool {
        matches!(self, TxnOutcome::Committed(..))
    }

    /// Value returned by the plan.
    pub fn into_value(self) -> T {
        match self {
            TxnOutcome::Committed(_, value) | TxnOutcome::Skipped(value) => value,
        }
    }
}

/// Read the room and its current round, let `plan` derive the writes and commit
/// them with a compare-and-swap on the room version.
///
/// A lost race re-reads and re-plans, so a plan whose precondition stopped
/// holding ends up skipping. After `policy.max_attempts` lost races the
/// operation fails with [`ServiceError::ConcurrentWriteConflict`].
pub async fn run_room_transaction<T, F>(
    store: &Arc<dyn RoomStore>,
    room_id: Uuid,
    policy: RetryPolicy,
    mut plan: F,
) -> Result<TxnOutcome<T>, ServiceError>
where
    F: FnMut(TxnView) -> Result<TxnDecision<T>, ServiceError>,
{
    let mut backoff = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts {
        let last_attempt = attempt == policy.max_attempts;
        let room = store
            .find_room(room_id)
            .await?
            .ok_or(ServiceError::RoomNotFound(room_id))?;

        let round = if room.current_round > 0 {
            store.find_round(room_id, room.current_round).await?
        } else {
            None
        };

        // Remote backends write the round right after the room; give it time to land.
        if room.current_round > 0 && round.is_none() && !last_attempt {
            debug!(%room_id, round = room.current_round, attempt, "current round not visible yet");
            sleep(backoff).await;
            backoff *= 2;
            continue;
        }

        let (commit, value) = match plan(TxnView { room, round })? {
            TxnDecision::Skip(value) => return Ok(TxnOutcome::Skipped(value)),
            TxnDecision::Commit(commit, value) => (commit, value),
        };

        match store.commit_room(commit).await {
            Ok(room) => return Ok(TxnOutcome::Committed(room, value)),
            Err(err) if err.is_conflict() => {
                if last_attempt {
                    break;
                }
                debug!(%room_id, attempt, "room transaction conflicted; retrying");
                sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => return Err(err.into()),
        }
    }

    warn!(%room_id, attempts = policy.max_attempts, "room transaction gave up after repeated conflicts");
    Err(ServiceError::ConcurrentWriteConflict(room_id))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    use futures::future::BoxFuture;
    use tokio::sync::broadcast;

    use super::*;
    use crate::dao::{
        models::{
            GuessEntity, PlayerEntity, RoomStatus, StoreChange, StrokeEntity, now_ms,
        },
        room_store::memory::MemoryRoomStore,
        storage::{StorageError, StorageResult},
    };

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn room() -> RoomEntity {
        RoomEntity {
            id: Uuid::new_v4(),
            code: "TX01".into(),
            host_id: "a".into(),
            status: RoomStatus::Waiting,
            current_round: 0,
            max_rounds: 3,
            players: vec![PlayerEntity {
                id: "a".into(),
                name: "A".into(),
                score: 0,
                joined_at_ms: now_ms(),
            }],
            created_at_ms: now_ms(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn commit_applies_the_plan() {
        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let room = room();
        store.create_room(room.clone()).await.unwrap();

        let outcome = run_room_transaction(&store, room.id, policy(), |view| {
            let mut room = view.room.clone();
            room.max_rounds = 7;
            Ok(TxnDecision::Commit(RoomCommit::new(room), "done"))
        })
        .await
        .unwrap();

        assert!(outcome.is_committed());
        let stored = store.find_room(room.id).await.unwrap().unwrap();
        assert_eq!(stored.max_rounds, 7);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn skip_writes_nothing() {
        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let room = room();
        store.create_room(room.clone()).await.unwrap();

        let outcome = run_room_transaction(&store, room.id, policy(), |_| Ok(TxnDecision::Skip(())))
            .await
            .unwrap();

        assert!(!outcome.is_committed());
        assert_eq!(
            store.find_room(room.id).await.unwrap().unwrap().version,
            0
        );
    }

    #[tokio::test]
    async fn missing_room_is_reported() {
        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let err = run_room_transaction(&store, Uuid::new_v4(), policy(), |_| {
            Ok(TxnDecision::Skip(()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotFound(_)));
    }

    /// Store whose commits always lose the race.
    struct AlwaysConflicting {
        inner: MemoryRoomStore,
        commits: AtomicU32,
    }

    impl RoomStore for AlwaysConflicting {
        fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.create_room(room)
        }
        fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
            self.inner.find_room(id)
        }
        fn find_room_by_code(
            &self,
            code: String,
            statuses: Vec<RoomStatus>,
        ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
            self.inner.find_room_by_code(code, statuses)
        }
        fn list_rooms_by_status(
            &self,
            status: RoomStatus,
        ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
            self.inner.list_rooms_by_status(status)
        }
        fn find_round(
            &self,
            room_id: Uuid,
            number: u32,
        ) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
            self.inner.find_round(room_id, number)
        }
        fn list_rounds(
            &self,
            room_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
            self.inner.list_rounds(room_id)
        }
        fn commit_room(&self, commit: RoomCommit) -> BoxFuture<'static, StorageResult<RoomEntity>> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            let room_id = commit.room_id();
            Box::pin(async move { Err(StorageError::Conflict { room_id }) })
        }
        fn update_max_rounds(
            &self,
            room_id: Uuid,
            max_rounds: u32,
        ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
            self.inner.update_max_rounds(room_id, max_rounds)
        }
        fn append_stroke(
            &self,
            room_id: Uuid,
            stroke: StrokeEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.append_stroke(room_id, stroke)
        }
        fn clear_strokes(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
            self.inner.clear_strokes(room_id)
        }
        fn list_strokes(
            &self,
            room_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<StrokeEntity>>> {
            self.inner.list_strokes(room_id)
        }
        fn append_guess(
            &self,
            room_id: Uuid,
            guess: GuessEntity,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.append_guess(room_id, guess)
        }
        fn list_guesses(
            &self,
            room_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<GuessEntity>>> {
            self.inner.list_guesses(room_id)
        }
        fn delete_room(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.delete_room(room_id)
        }
        fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
            self.inner.subscribe()
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    #[tokio::test]
    async fn gives_up_after_bounded_conflicts() {
        let conflicting = Arc::new(AlwaysConflicting {
            inner: MemoryRoomStore::new(),
            commits: AtomicU32::new(0),
        });
        let room = room();
        conflicting.create_room(room.clone()).await.unwrap();
        let store: Arc<dyn RoomStore> = conflicting.clone();

        let err = run_room_transaction(&store, room.id, policy(), |view| {
            Ok(TxnDecision::Commit(RoomCommit::new(view.room), ()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ServiceError::ConcurrentWriteConflict(id) if id == room.id));
        assert_eq!(conflicting.commits.load(Ordering::SeqCst), 3);
    }
}
