use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dao::{
    models::{GuessEntity, RoomEntity, RoomStatus, RoundEntity, StoreChange, StrokeEntity},
    room_store::{ChangeNotifier, RoomCommit, RoomStore},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, BulkDocsRequest, CouchGuessDocument, CouchRoomDocument,
        CouchRoundDocument, CouchStrokeDocument, DeletedDocument, END_SUFFIX, ROOM_PREFIX,
        guess_prefix, room_doc_id, round_doc_id, round_prefix, stroke_prefix,
    },
};

const MERGE_ATTEMPTS: u32 = 5;

/// Room store backed by a CouchDB database, one document per entity.
#[derive(Clone)]
pub struct CouchRoomStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    changes: ChangeNotifier,
}

impl CouchRoomStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let auth = config
            .username
            .zip(config.password)
            .map(|(user, pass)| (Arc::<str>::from(user), Arc::<str>::from(pass)));

        let store = Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            database: Arc::from(config.database),
            auth,
            changes: ChangeNotifier::default(),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another instance created it first.
                if create.status().is_success()
                    || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document; a stale `_rev` surfaces as [`CouchDaoError::RevisionConflict`].
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn all_docs(&self, prefix: &str, include_docs: bool) -> CouchResult<AllDocsResponse> {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", include_docs.to_string()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<AllDocsResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            })
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let payload = self.all_docs(prefix, true).await?;
        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc.map(|doc| (row.id, doc)))
            .map(|(id, doc)| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: id,
                    source,
                })
            })
            .collect()
    }

    /// Tombstone every document whose id starts with one of `prefixes`.
    async fn delete_prefixed(&self, prefixes: &[String]) -> CouchResult<usize> {
        const BULK_DOCS: &str = "_bulk_docs";
        let mut docs = Vec::new();
        for prefix in prefixes {
            let payload = self.all_docs(prefix, false).await?;
            docs.extend(payload.rows.into_iter().filter_map(|row| {
                row.value.map(|value| DeletedDocument {
                    id: row.id,
                    rev: value.rev,
                    deleted: true,
                })
            }));
        }

        if docs.is_empty() {
            return Ok(0);
        }

        let count = docs.len();
        let response = self
            .request(Method::POST, BULK_DOCS)
            .json(&BulkDocsRequest { docs })
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: BULK_DOCS.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(count)
        } else {
            Err(CouchDaoError::RequestStatus {
                path: BULK_DOCS.to_string(),
                status: response.status(),
            })
        }
    }

    async fn list_rooms(&self) -> CouchResult<Vec<RoomEntity>> {
        let docs = self
            .list_documents::<CouchRoomDocument>(ROOM_PREFIX)
            .await?;
        let mut rooms: Vec<RoomEntity> = docs.into_iter().map(|doc| doc.room).collect();
        rooms.sort_by_key(|room| room.created_at_ms);
        Ok(rooms)
    }

    async fn put_round(&self, room_id: Uuid, round: RoundEntity) -> CouchResult<()> {
        let doc_id = round_doc_id(room_id, round.number);
        let rev = self
            .get_document::<CouchRoundDocument>(&doc_id)
            .await?
            .and_then(|existing| existing.rev);
        self.put_document(&doc_id, &CouchRoundDocument::new(room_id, round, rev))
            .await
    }

    async fn put_guess(&self, room_id: Uuid, guess: GuessEntity) -> CouchResult<()> {
        let document = CouchGuessDocument::new(room_id, guess);
        self.put_document(&document.id, &document).await
    }

    fn child_prefixes(room_id: Uuid) -> [String; 3] {
        [
            round_prefix(room_id),
            stroke_prefix(room_id),
            guess_prefix(room_id),
        ]
    }

    /// Compare the stored version, then write the room with its observed `_rev`.
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

        let doc_id = room_doc_id(room_id);
        let Some(current) = self.get_document::<CouchRoomDocument>(&doc_id).await? else {
            return Err(StorageError::NotFound { room_id });
        };
        if current.room.version != expected_version {
            return Err(StorageError::Conflict { room_id });
        }

        room.version = expected_version + 1;
        let document = CouchRoomDocument::new(room.clone(), current.rev);
        self.put_document(&doc_id, &document)
            .await
            .map_err(|err| match err {
                err if err.is_revision_conflict() => StorageError::Conflict { room_id },
                err => err.into(),
            })?;

        if reset_children {
            let removed = self.delete_prefixed(&Self::child_prefixes(room_id)).await?;
            debug!(%room_id, removed, "cleared room children");
        }
        for round in put_rounds {
            self.put_round(room_id, round).await?;
        }
        for guess in append_guesses {
            self.put_guess(room_id, guess).await?;
        }

        debug!(%room_id, version = room.version, "committed room transaction");
        self.changes.publish_all(changes);
        Ok(room)
    }

    async fn update_max_rounds(&self, room_id: Uuid, max_rounds: u32) -> StorageResult<RoomEntity> {
        let doc_id = room_doc_id(room_id);
        for attempt in 1..=MERGE_ATTEMPTS {
            let Some(mut document) = self.get_document::<CouchRoomDocument>(&doc_id).await? else {
                return Err(StorageError::NotFound { room_id });
            };
            document.room.max_rounds = max_rounds.max(document.room.current_round);
            document.room.version += 1;

            match self.put_document(&doc_id, &document).await {
                Ok(()) => {
                    self.changes.publish(StoreChange::Room(room_id));
                    return Ok(document.room);
                }
                Err(err) if err.is_revision_conflict() => {
                    warn!(%room_id, attempt, "max rounds merge raced another write; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(StorageError::Conflict { room_id })
    }

    async fn delete_room(&self, room_id: Uuid) -> CouchResult<bool> {
        let doc_id = room_doc_id(room_id);
        let existed = self
            .get_document::<CouchRoomDocument>(&doc_id)
            .await?
            .is_some();

        let [rounds, strokes, guesses] = Self::child_prefixes(room_id);
        self.delete_prefixed(&[doc_id, rounds, strokes, guesses])
            .await?;

        if existed {
            self.changes.publish(StoreChange::RoomDeleted(room_id));
        }
        Ok(existed)
    }
}

impl RoomStore for CouchRoomStore {
    fn create_room(&self, room: RoomEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let room_id = room.id;
            let document = CouchRoomDocument::new(room, None);
            store
                .put_document(&document.id, &document)
                .await
                .map_err(|err| match err {
                    err if err.is_revision_conflict() => StorageError::Conflict { room_id },
                    err => err.into(),
                })?;
            store.changes.publish(StoreChange::Room(room_id));
            Ok(())
        })
    }

    fn find_room(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .get_document::<CouchRoomDocument>(&room_doc_id(id))
                .await?;
            Ok(document.map(|doc| doc.room))
        })
    }

    fn find_room_by_code(
        &self,
        code: String,
        statuses: Vec<RoomStatus>,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rooms = store.list_rooms().await?;
            Ok(rooms.into_iter().find(|room| {
                room.code == code && (statuses.is_empty() || statuses.contains(&room.status))
            }))
        })
    }

    fn list_rooms_by_status(
        &self,
        status: RoomStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rooms = store.list_rooms().await?;
            Ok(rooms
                .into_iter()
                .filter(|room| room.status == status)
                .collect())
        })
    }

    fn find_round(
        &self,
        room_id: Uuid,
        number: u32,
    ) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .get_document::<CouchRoundDocument>(&round_doc_id(room_id, number))
                .await?;
            Ok(document.map(|doc| doc.round))
        })
    }

    fn list_rounds(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchRoundDocument>(&round_prefix(room_id))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.round).collect())
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
        Box::pin(async move { store.update_max_rounds(room_id, max_rounds).await })
    }

    fn append_stroke(
        &self,
        room_id: Uuid,
        stroke: StrokeEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let document = CouchStrokeDocument::new(room_id, stroke);
            store.put_document(&document.id, &document).await?;
            store.changes.publish(StoreChange::Strokes(room_id));
            Ok(())
        })
    }

    fn clear_strokes(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move {
            let removed = store.delete_prefixed(&[stroke_prefix(room_id)]).await?;
            store.changes.publish(StoreChange::Strokes(room_id));
            Ok(removed)
        })
    }

    fn list_strokes(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<StrokeEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchStrokeDocument>(&stroke_prefix(room_id))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.stroke).collect())
        })
    }

    fn append_guess(
        &self,
        room_id: Uuid,
        guess: GuessEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.put_guess(room_id, guess).await?;
            store.changes.publish(StoreChange::Guesses(room_id));
            Ok(())
        })
    }

    fn list_guesses(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<GuessEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchGuessDocument>(&guess_prefix(room_id))
                .await?;
            Ok(docs.into_iter().map(|doc| doc.guess).collect())
        })
    }

    fn delete_room(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_room(room_id).await.map_err(Into::into) })
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
