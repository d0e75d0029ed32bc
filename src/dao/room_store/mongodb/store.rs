use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::{RwLock, broadcast};
use tracing::debug;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoGuessDocument, MongoRoomDocument, MongoRoundDocument, MongoStrokeDocument, doc_id,
        room_filter, round_filter,
    },
};
use crate::dao::{
    models::{GuessEntity, RoomEntity, RoomStatus, RoundEntity, StoreChange, StrokeEntity},
    room_store::{ChangeNotifier, RoomCommit, RoomStore},
    storage::{StorageError, StorageResult},
};

const ROOM_COLLECTION_NAME: &str = "rooms";
const ROUND_COLLECTION_NAME: &str = "rounds";
const STROKE_COLLECTION_NAME: &str = "strokes";
const GUESS_COLLECTION_NAME: &str = "guesses";

/// Room store backed by MongoDB collections.
#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
    changes: ChangeNotifier,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
            changes: ChangeNotifier::default(),
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let rooms = database.collection::<Document>(ROOM_COLLECTION_NAME);
        let code_index = IndexModel::builder()
            .keys(doc! {"code": 1, "status": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("room_code_idx".to_owned()))
                    .build(),
            )
            .build();
        rooms
            .create_index(code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION_NAME,
                index: "code,status",
                source,
            })?;

        for collection in [
            ROUND_COLLECTION_NAME,
            STROKE_COLLECTION_NAME,
            GUESS_COLLECTION_NAME,
        ] {
            let index = IndexModel::builder()
                .keys(doc! {"room_id": 1, "created_at_ms": 1})
                .build();
            database
                .collection::<Document>(collection)
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index: "room_id,created_at_ms",
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.database()
            .await
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    async fn rounds(&self) -> Collection<MongoRoundDocument> {
        self.database()
            .await
            .collection::<MongoRoundDocument>(ROUND_COLLECTION_NAME)
    }

    async fn strokes(&self) -> Collection<MongoStrokeDocument> {
        self.database()
            .await
            .collection::<MongoStrokeDocument>(STROKE_COLLECTION_NAME)
    }

    async fn guesses(&self) -> Collection<MongoGuessDocument> {
        self.database()
            .await
            .collection::<MongoGuessDocument>(GUESS_COLLECTION_NAME)
    }

    async fn create_room(&self, room: RoomEntity) -> MongoResult<()> {
        let id = room.id;
        let document: MongoRoomDocument = room.into();
        self.rooms()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveRoom { id, source })?;
        Ok(())
    }

    async fn find_room(&self, id: Uuid) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadRoom { id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn find_rooms(&self, filter: Document) -> MongoResult<Vec<RoomEntity>> {
        let documents: Vec<MongoRoomDocument> = self
            .rooms()
            .await
            .find(filter)
            .sort(doc! {"created_at_ms": 1})
            .await
            .map_err(|source| MongoDaoError::ListRooms { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListRooms { source })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_round(&self, room_id: Uuid, number: u32) -> MongoResult<Option<RoundEntity>> {
        let document = self
            .rounds()
            .await
            .find_one(round_filter(room_id, number))
            .await
            .map_err(|source| MongoDaoError::LoadChildren {
                collection: ROUND_COLLECTION_NAME,
                id: room_id,
                source,
            })?;
        Ok(document.map(Into::into))
    }

    async fn list_rounds(&self, room_id: Uuid) -> MongoResult<Vec<RoundEntity>> {
        let documents: Vec<MongoRoundDocument> = self
            .rounds()
            .await
            .find(room_filter(room_id))
            .sort(doc! {"number": 1})
            .await
            .map_err(|source| MongoDaoError::LoadChildren {
                collection: ROUND_COLLECTION_NAME,
                id: room_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadChildren {
                collection: ROUND_COLLECTION_NAME,
                id: room_id,
                source,
            })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    /// Compare-and-swap the room document, then apply the child writes.
    async fn commit(&self, commit: RoomCommit) -> StorageResult<RoomEntity> {
        let room_id = commit.room_id();
        let changes = commit.changes();
        let RoomCommit {
            expected_version,
            mut room,
            put_rounds,
            append_guesses,
            reset_children,
        } = commit;

        room.version = expected_version + 1;
        let document: MongoRoomDocument = room.clone().into();
        let mut filter = doc_id(room_id);
        filter.insert("version", expected_version as i64);

        let result = self
            .rooms()
            .await
            .replace_one(filter, &document)
            .await
            .map_err(|source| MongoDaoError::SaveRoom {
                id: room_id,
                source,
            })?;

        if result.matched_count == 0 {
            return match self.find_room(room_id).await? {
                Some(_) => Err(StorageError::Conflict { room_id }),
                None => Err(StorageError::NotFound { room_id }),
            };
        }

        if reset_children {
            self.delete_children(room_id).await?;
        }

        let rounds = self.rounds().await;
        for round in put_rounds {
            let document = MongoRoundDocument::from_entity(room_id, round);
            rounds
                .replace_one(doc! {"_id": document.key()}, &document)
                .upsert(true)
                .await
                .map_err(|source| MongoDaoError::SaveChildren {
                    collection: ROUND_COLLECTION_NAME,
                    id: room_id,
                    source,
                })?;
        }

        if !append_guesses.is_empty() {
            let documents: Vec<MongoGuessDocument> = append_guesses
                .into_iter()
                .map(|guess| MongoGuessDocument::from_entity(room_id, guess))
                .collect();
            self.guesses()
                .await
                .insert_many(documents)
                .await
                .map_err(|source| MongoDaoError::SaveChildren {
                    collection: GUESS_COLLECTION_NAME,
                    id: room_id,
                    source,
                })?;
        }

        debug!(%room_id, version = room.version, "committed room transaction");
        self.inner.changes.publish_all(changes);
        Ok(room)
    }

    async fn update_max_rounds(&self, room_id: Uuid, max_rounds: u32) -> StorageResult<RoomEntity> {
        let updated = self
            .rooms()
            .await
            .find_one_and_update(
                doc_id(room_id),
                vec![doc! {
                    "$set": {
                        "max_rounds": {"$max": [i64::from(max_rounds), "$current_round"]},
                        "version": {"$add": ["$version", 1_i64]},
                    },
                }],
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SaveRoom {
                id: room_id,
                source,
            })?;

        let Some(document) = updated else {
            return Err(StorageError::NotFound { room_id });
        };
        let room: RoomEntity = document.try_into()?;
        self.inner.changes.publish(StoreChange::Room(room_id));
        Ok(room)
    }

    async fn append_stroke(&self, room_id: Uuid, stroke: StrokeEntity) -> MongoResult<()> {
        let document = MongoStrokeDocument::from_entity(room_id, stroke);
        self.strokes()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveChildren {
                collection: STROKE_COLLECTION_NAME,
                id: room_id,
                source,
            })?;
        self.inner.changes.publish(StoreChange::Strokes(room_id));
        Ok(())
    }

    async fn clear_strokes(&self, room_id: Uuid) -> MongoResult<usize> {
        let result = self
            .strokes()
            .await
            .delete_many(room_filter(room_id))
            .await
            .map_err(|source| MongoDaoError::SaveChildren {
                collection: STROKE_COLLECTION_NAME,
                id: room_id,
                source,
            })?;
        self.inner.changes.publish(StoreChange::Strokes(room_id));
        Ok(result.deleted_count as usize)
    }

    async fn list_strokes(&self, room_id: Uuid) -> MongoResult<Vec<StrokeEntity>> {
        let documents: Vec<MongoStrokeDocument> = self
            .strokes()
            .await
            .find(room_filter(room_id))
            .sort(doc! {"created_at_ms": 1, "_id": 1})
            .await
            .map_err(|source| MongoDaoError::LoadChildren {
                collection: STROKE_COLLECTION_NAME,
                id: room_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadChildren {
                collection: STROKE_COLLECTION_NAME,
                id: room_id,
                source,
            })?;
        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn append_guess(&self, room_id: Uuid, guess: GuessEntity) -> MongoResult<()> {
        let document = MongoGuessDocument::from_entity(room_id, guess);
        self.guesses()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveChildren {
                collection: GUESS_COLLECTION_NAME,
                id: room_id,
                source,
            })?;
        self.inner.changes.publish(StoreChange::Guesses(room_id));
        Ok(())
    }

    async fn list_guesses(&self, room_id: Uuid) -> MongoResult<Vec<GuessEntity>> {
        let documents: Vec<MongoGuessDocument> = self
            .guesses()
            .await
            .find(room_filter(room_id))
            .sort(doc! {"created_at_ms": 1, "_id": 1})
            .await
            .map_err(|source| MongoDaoError::LoadChildren {
                collection: GUESS_COLLECTION_NAME,
                id: room_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadChildren {
                collection: GUESS_COLLECTION_NAME,
                id: room_id,
                source,
            })?;
        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete_children(&self, room_id: Uuid) -> MongoResult<()> {
        let database = self.database().await;
        for collection in [
            ROUND_COLLECTION_NAME,
            STROKE_COLLECTION_NAME,
            GUESS_COLLECTION_NAME,
        ] {
            database
                .collection::<Document>(collection)
                .delete_many(room_filter(room_id))
                .await
                .map_err(|source| MongoDaoError::SaveChildren {
                    collection,
                    id: room_id,
                    source,
                })?;
        }
        Ok(())
    }

    async fn delete_room(&self, room_id: Uuid) -> MongoResult<bool> {
        let result = self
            .rooms()
            .await
            .delete_one(doc_id(room_id))
            .await
            .map_err(|source| MongoDaoError::DeleteRoom {
                id: room_id,
                source,
            })?;
        self.delete_children(room_id).await?;

        let existed = result.deleted_count > 0;
        if existed {
            self.inner.changes.publish(StoreChange::RoomDeleted(room_id));
        }
        Ok(existed)
    }
}

impl RoomStore for MongoRoomStore {
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let room_id = room.id;
            store.create_room(room).await?;
            store.inner.changes.publish(StoreChange::Room(room_id));
            Ok(())
        })
    }

    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_room(id).await.map_err(Into::into) })
    }

    fn find_room_by_code(
        &self,
        code: String,
        statuses: Vec<RoomStatus>,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut filter = doc! {"code": code};
            if !statuses.is_empty() {
                let statuses: Vec<&str> = statuses.iter().map(|status| status.as_str()).collect();
                filter.insert("status", doc! {"$in": statuses});
            }
            let rooms = store.find_rooms(filter).await?;
            Ok(rooms.into_iter().next())
        })
    }

    fn list_rooms_by_status(
        &self,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_rooms(doc! {"status": status.as_str()})
                .await
                .map_err(Into::into)
        })
    }

    fn find_round(
        &self,
        room_id: Uuid,
        number: u32,
    ) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_round(room_id, number).await.map_err(Into::into) })
    }

    fn list_rounds(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_rounds(room_id).await.map_err(Into::into) })
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
        Box::pin(async move { store.update_max_rounds(room_id, max_rounds).await })
    }

    fn append_stroke(
        &self,
        room_id: Uuid,
        stroke: StrokeEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_stroke(room_id, stroke).await.map_err(Into::into) })
    }

    fn clear_strokes(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.clear_strokes(room_id).await.map_err(Into::into) })
    }

    fn list_strokes(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StrokeEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_strokes(room_id).await.map_err(Into::into) })
    }

    fn append_guess(
        &self,
        room_id: Uuid,
        guess: GuessEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_guess(room_id, guess).await.map_err(Into::into) })
    }

    fn list_guesses(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<GuessEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_guesses(room_id).await.map_err(Into::into) })
    }

    fn delete_room(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_room(room_id).await.map_err(Into::into) })
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.changes.subscribe()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
