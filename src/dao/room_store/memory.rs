//! In-process implementation of [`RoomStore`], used as the default backend and by tests.

use std::{collections::BTreeMap, sync::Arc};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::dao::{
    models::{GuessEntity, RoomEntity, RoomStatus, RoundEntity, StoreChange, StrokeEntity},
    room_store::{ChangeNotifier, RoomCommit, RoomStore},
    storage::{StorageError, StorageResult},
};

/// In-process room store; each room and its children sit behind one lock.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    rooms: DashMap<Uuid, Arc<Mutex<RoomRecord>>>,
    changes: ChangeNotifier,
}

struct RoomRecord {
    room: RoomEntity,
    rounds: BTreeMap<u32, RoundEntity>,
    strokes: Vec<StrokeEntity>,
    guesses: Vec<GuessEntity>,
    deleted: bool,
}

impl RoomRecord {
    fn new(room: RoomEntity) -> Self {
        Self {
            room,
            rounds: BTreeMap::new(),
            strokes: Vec::new(),
            guesses: Vec::new(),
            deleted: false,
        }
    }
}

impl MemoryRoomStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, room_id: Uuid) -> Option<Arc<Mutex<RoomRecord>>> {
        self.inner
            .rooms
            .get(&room_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn records(&self) -> Vec<Arc<Mutex<RoomRecord>>> {
        self.inner
            .rooms
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Run `read` against a live room record, or return `None` when the room is gone.
    async fn read<T>(&self, room_id: Uuid, read: impl FnOnce(&RoomRecord) -> T) -> Option<T> {
        let record = self.record(room_id)?;
        let guard = record.lock().await;
        if guard.deleted {
            return None;
        }
        Some(read(&guard))
    }

    /// Run `write` against a live room record, failing with `NotFound` when the room is gone.
    async fn write<T>(
        &self,
        room_id: Uuid,
        write: impl FnOnce(&mut RoomRecord) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let record = self
            .record(room_id)
            .ok_or(StorageError::NotFound { room_id })?;
        let mut guard = record.lock().await;
        if guard.deleted {
            return Err(StorageError::NotFound { room_id });
        }
        write(&mut guard)
    }

    async fn commit(&self, commit: RoomCommit) -> StorageResult<RoomEntity> {
        let room_id = commit.room_id();
        let changes = commit.changes();
        let committed = self
            .write(room_id, move |record| {
                if record.room.version != commit.expected_version {
                    return Err(StorageError::Conflict { room_id });
                }

                let RoomCommit {
                    expected_version,
                    mut room,
                    put_rounds,
                    append_guesses,
                    reset_children,
                } = commit;

                if reset_children {
                    record.rounds.clear();
                    record.strokes.clear();
                    record.guesses.clear();
                }

                room.version = expected_version + 1;
                record.room = room.clone();
                for round in put_rounds {
                    record.rounds.insert(round.number, round);
                }
                record.guesses.extend(append_guesses);
                Ok(room)
            })
            .await?;

        self.inner.changes.publish_all(changes);
        Ok(committed)
    }

    async fn rooms_matching(&self, matches: impl Fn(&RoomEntity) -> bool) -> Vec<RoomEntity> {
        let mut rooms = Vec::new();
        for record in self.records() {
            let guard = record.lock().await;
            if !guard.deleted && matches(&guard.room) {
                rooms.push(guard.room.clone());
            }
        }
        rooms.sort_by_key(|room| room.created_at_ms);
        rooms
    }
}

impl RoomStore for MemoryRoomStore {
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let room_id = room.id;
            store
                .inner
                .rooms
                .insert(room_id, Arc::new(Mutex::new(RoomRecord::new(room))));
            store.inner.changes.publish(StoreChange::Room(room_id));
            Ok(())
        })
    }

    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.read(id, |record| record.room.clone()).await) })
    }

    fn find_room_by_code(
        &self,
        code: String,
        statuses: Vec<RoomStatus>,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rooms = store
                .rooms_matching(|room| {
                    room.code == code && (statuses.is_empty() || statuses.contains(&room.status))
                })
                .await;
            Ok(rooms.into_iter().next())
        })
    }

    fn list_rooms_by_status(
        &self,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.rooms_matching(|room| room.status == status).await) })
    }

    fn find_round(
        &self,
        room_id: Uuid,
        number: u32,
    ) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .read(room_id, |record| record.rounds.get(&number).cloned())
                .await
                .flatten())
        })
    }

    fn list_rounds(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .read(room_id, |record| record.rounds.values().cloned().collect())
                .await
                .unwrap_or_default())
        })
    }

    fn commit_room(&self, commit: RoomCommit) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let store = self.clone();
        Box::pin(async move { store.commit(commit).await })
    }

    fn update_max_rounds(
        &self,
        room_id: Uuid,
        max_rounds: u32,
    ) -> BoxFuture<'static, StorageResult<RoomEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let room = store
                .write(room_id, |record| {
                    record.room.max_rounds = max_rounds.max(record.room.current_round);
                    record.room.version += 1;
                    Ok(record.room.clone())
                })
                .await?;
            store.inner.changes.publish(StoreChange::Room(room_id));
            Ok(room)
        })
    }

    fn append_stroke(
        &self,
        room_id: Uuid,
        stroke: StrokeEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .write(room_id, |record| {
                    record.strokes.push(stroke);
                    Ok(())
                })
                .await?;
            store.inner.changes.publish(StoreChange::Strokes(room_id));
            Ok(())
        })
    }

    fn clear_strokes(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move {
            let removed = store
                .write(room_id, |record| Ok(record.strokes.drain(..).count()))
                .await?;
            store.inner.changes.publish(StoreChange::Strokes(room_id));
            Ok(removed)
        })
    }

    fn list_strokes(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StrokeEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .read(room_id, |record| record.strokes.clone())
                .await
                .unwrap_or_default())
        })
    }

    fn append_guess(
        &self,
        room_id: Uuid,
        guess: GuessEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .write(room_id, |record| {
                    record.guesses.push(guess);
                    Ok(())
                })
                .await?;
            store.inner.changes.publish(StoreChange::Guesses(room_id));
            Ok(())
        })
    }

    fn list_guesses(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<GuessEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .read(room_id, |record| record.guesses.clone())
                .await
                .unwrap_or_default())
        })
    }

    fn delete_room(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let Some((_, record)) = store.inner.rooms.remove(&room_id) else {
                return Ok(false);
            };
            record.lock().await.deleted = true;
            store.inner.changes.publish(StoreChange::RoomDeleted(room_id));
            Ok(true)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{PlayerEntity, StrokePoint, now_ms};

    fn room(code: &str) -> RoomEntity {
        RoomEntity {
            id: Uuid::new_v4(),
            code: code.into(),
            host_id: "host".into(),
            status: RoomStatus::Waiting,
            current_round: 0,
            max_rounds: 3,
            players: vec![PlayerEntity {
                id: "host".into(),
                name: "Host".into(),
                score: 0,
                joined_at_ms: now_ms(),
            }],
            created_at_ms: now_ms(),
            version: 0,
        }
    }

    fn round(number: u32) -> RoundEntity {
        RoundEntity {
            number,
            drawer_id: "host".into(),
            secret_word: String::new(),
            started_at_ms: 0,
            selection_deadline_ms: 0,
        }
    }

    #[tokio::test]
    async fn commit_bumps_version_and_writes_children() {
        let store = MemoryRoomStore::new();
        let room = room("AB12");
        store.create_room(room.clone()).await.unwrap();

        let mut next = room.clone();
        next.status = RoomStatus::WordSelection;
        next.current_round = 1;
        let committed = store
            .commit_room(RoomCommit::new(next).with_round(round(1)))
            .await
            .unwrap();

        assert_eq!(committed.version, 1);
        assert_eq!(store.find_round(room.id, 1).await.unwrap(), Some(round(1)));
        assert_eq!(
            store.find_room(room.id).await.unwrap().unwrap().status,
            RoomStatus::WordSelection
        );
    }

    #[tokio::test]
    async fn stale_commit_is_rejected_without_side_effects() {
        let store = MemoryRoomStore::new();
        let room = room("AB12");
        store.create_room(room.clone()).await.unwrap();

        store
            .commit_room(RoomCommit::new(room.clone()))
            .await
            .unwrap();
        let err = store
            .commit_room(
                RoomCommit::new(room.clone())
                    .with_round(round(1))
                    .with_guess(GuessEntity::system("late".into())),
            )
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(store.find_round(room.id, 1).await.unwrap().is_none());
        assert!(store.list_guesses(room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_every_child_collection() {
        let store = MemoryRoomStore::new();
        let room = room("AB12");
        store.create_room(room.clone()).await.unwrap();
        let room = store
            .commit_room(RoomCommit::new(room).with_round(round(1)))
            .await
            .unwrap();
        store
            .append_guess(room.id, GuessEntity::system("hello".into()))
            .await
            .unwrap();
        store
            .append_stroke(
                room.id,
                StrokeEntity {
                    id: Uuid::new_v4(),
                    points: vec![StrokePoint { x: 1.0, y: 2.0 }],
                    color: "#000".into(),
                    thickness: 2.0,
                    created_at_ms: now_ms(),
                },
            )
            .await
            .unwrap();

        store
            .commit_room(RoomCommit::new(room.clone()).resetting_children())
            .await
            .unwrap();

        assert!(store.list_rounds(room.id).await.unwrap().is_empty());
        assert!(store.list_strokes(room.id).await.unwrap().is_empty());
        assert!(store.list_guesses(room.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn max_rounds_merge_never_drops_below_current_round() {
        let store = MemoryRoomStore::new();
        let room = room("AB12");
        store.create_room(room.clone()).await.unwrap();

        // The round advances after the caller read the room with round 0.
        let mut advanced = room.clone();
        advanced.status = RoomStatus::WordSelection;
        advanced.current_round = 3;
        store
            .commit_room(RoomCommit::new(advanced).with_round(round(3)))
            .await
            .unwrap();

        let updated = store.update_max_rounds(room.id, 1).await.unwrap();
        assert_eq!(updated.max_rounds, 3);
        assert_eq!(updated.version, 2);

        let updated = store.update_max_rounds(room.id, 9).await.unwrap();
        assert_eq!(updated.max_rounds, 9);
    }

    #[tokio::test]
    async fn find_by_code_honours_status_filter() {
        let store = MemoryRoomStore::new();
        let mut ended = room("ZZ99");
        ended.status = RoomStatus::Ended;
        store.create_room(ended.clone()).await.unwrap();

        let active = store
            .find_room_by_code("ZZ99".into(), RoomStatus::active().to_vec())
            .await
            .unwrap();
        let any = store
            .find_room_by_code("ZZ99".into(), Vec::new())
            .await
            .unwrap();

        assert!(active.is_none());
        assert_eq!(any.map(|room| room.id), Some(ended.id));
    }

    #[tokio::test]
    async fn deletion_is_published_and_blocks_writes() {
        let store = MemoryRoomStore::new();
        let room = room("AB12");
        store.create_room(room.clone()).await.unwrap();
        let mut changes = store.subscribe();

        assert!(store.delete_room(room.id).await.unwrap());
        assert_eq!(changes.recv().await.unwrap(), StoreChange::RoomDeleted(room.id));
        assert!(matches!(
            store
                .append_guess(room.id, GuessEntity::system("x".into()))
                .await,
            Err(StorageError::NotFound { .. })
        ));
        assert!(!store.delete_room(room.id).await.unwrap());
    }
}
