//! Per-room change fan-out: full snapshots pushed whenever a store write touches the room.

use std::sync::Arc;

use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, oneshot,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{GuessEntity, PlayerEntity, RoomEntity, RoundEntity, StoreChange, StrokeEntity},
        room_store::RoomStore,
        storage::StorageResult,
    },
    error::ServiceError,
    state::SharedState,
};

/// Buffered snapshots per observer before the watcher waits on the consumer.
const UPDATE_BUFFER: usize = 32;

/// Full snapshot of one of the streams a room observer follows.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomUpdate {
    /// Room document.
    Room(RoomEntity),
    /// Players ordered by join time.
    Players(Vec<PlayerEntity>),
    /// Active round, `None` while the room sits in the lobby.
    Round(Option<RoundEntity>),
    /// Whole canvas in drawing order.
    Strokes(Vec<StrokeEntity>),
    /// Whole guess log in insertion order.
    Guesses(Vec<GuessEntity>),
}

/// Why an observer stopped receiving snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomClosedReason {
    /// The host closed the room.
    Deleted,
    /// The room could not be read anymore.
    Unreachable,
}

/// Terminal notification delivered apart from the snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomClosed {
    /// Watched room.
    pub room_id: Uuid,
    /// Why it closed.
    pub reason: RoomClosedReason,
}

/// Handle held by a room observer. Dropping `updates` stops the watcher.
pub struct RoomFeed {
    /// Snapshots, initial ones first.
    pub updates: mpsc::Receiver<RoomUpdate>,
    /// Fires once when the room stops being observable.
    pub closed: oneshot::Receiver<RoomClosed>,
}

/// Start watching `room_id`; the initial snapshots of every stream are sent first.
pub async fn watch_room(state: &SharedState, room_id: Uuid) -> Result<RoomFeed, ServiceError> {
    let store = state.require_room_store().await?;
    // Subscribe before the first read so no write slips between snapshot and stream.
    let changes = store.subscribe();
    let room = store
        .find_room(room_id)
        .await?
        .ok_or(ServiceError::RoomNotFound(room_id))?;

    let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
    let (closed_tx, closed_rx) = oneshot::channel();

    let watcher = RoomWatcher {
        store,
        room_id,
        current_round: room.current_round,
        updates: updates_tx,
    };
    tokio::spawn(watcher.run(room, changes, closed_tx));

    Ok(RoomFeed {
        updates: updates_rx,
        closed: closed_rx,
    })
}

/// What a store change requires the watcher to resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// Room, players and, when the round counter moved, the active round.
    Room,
    Round(u32),
    AnyRound,
    Strokes,
    Guesses,
    Deleted,
}

fn refresh_for(change: StoreChange) -> Refresh {
    match change {
        StoreChange::Room(_) => Refresh::Room,
        StoreChange::Round { number, .. } => Refresh::Round(number),
        StoreChange::RoundsCleared(_) => Refresh::AnyRound,
        StoreChange::Strokes(_) => Refresh::Strokes,
        StoreChange::Guesses(_) => Refresh::Guesses,
        StoreChange::RoomDeleted(_) => Refresh::Deleted,
    }
}

/// Outcome of pushing snapshots to the observer.
enum Flow {
    Continue,
    /// The observer went away.
    Detached,
    /// The room is gone.
    Closed(RoomClosedReason),
}

struct RoomWatcher {
    store: Arc<dyn RoomStore>,
    room_id: Uuid,
    current_round: u32,
    updates: mpsc::Sender<RoomUpdate>,
}

impl RoomWatcher {
    async fn run(
        mut self,
        room: RoomEntity,
        mut changes: broadcast::Receiver<StoreChange>,
        closed: oneshot::Sender<RoomClosed>,
    ) {
        let room_id = self.room_id;
        let mut flow = self.resync_with(room).await;

        while matches!(flow, Flow::Continue) {
            let received = tokio::select! {
                _ = self.updates.closed() => None,
                received = changes.recv() => Some(received),
            };
            flow = match received {
                None => Flow::Detached,
                Some(Ok(change)) if change.room_id() == room_id => {
                    self.apply(refresh_for(change)).await
                }
                Some(Ok(_)) => Flow::Continue,
                Some(Err(RecvError::Lagged(skipped))) => {
                    warn!(%room_id, skipped, "room observer lagged; resyncing");
                    self.resync().await
                }
                Some(Err(RecvError::Closed)) => Flow::Closed(RoomClosedReason::Unreachable),
            };
        }

        match flow {
            Flow::Closed(reason) => {
                info!(%room_id, ?reason, "room feed closed");
                let _ = closed.send(RoomClosed { room_id, reason });
            }
            _ => debug!(%room_id, "room observer detached"),
        }
    }

    async fn apply(&mut self, refresh: Refresh) -> Flow {
        let result = match refresh {
            Refresh::Room => return self.refresh_room().await,
            Refresh::Round(number) if number != self.current_round => return Flow::Continue,
            Refresh::Round(_) | Refresh::AnyRound => self.send_round().await,
            Refresh::Strokes => self.send_strokes().await,
            Refresh::Guesses => self.send_guesses().await,
            Refresh::Deleted => return Flow::Closed(RoomClosedReason::Deleted),
        };
        self.settle(result)
    }

    async fn resync(&mut self) -> Flow {
        match self.store.find_room(self.room_id).await {
            Ok(Some(room)) => self.resync_with(room).await,
            Ok(None) => Flow::Closed(RoomClosedReason::Deleted),
            Err(err) => {
                warn!(room_id = %self.room_id, error = %err, "room unreachable during resync");
                Flow::Closed(RoomClosedReason::Unreachable)
            }
        }
    }

    /// Send every stream starting from an already loaded room.
    async fn resync_with(&mut self, room: RoomEntity) -> Flow {
        self.current_round = room.current_round;
        if !self.send_room(room).await {
            return Flow::Detached;
        }
        for refresh in [Refresh::AnyRound, Refresh::Strokes, Refresh::Guesses] {
            let flow = self.apply(refresh).await;
            if !matches!(flow, Flow::Continue) {
                return flow;
            }
        }
        Flow::Continue
    }

    async fn refresh_room(&mut self) -> Flow {
        let room = match self.store.find_room(self.room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => return Flow::Closed(RoomClosedReason::Deleted),
            Err(err) => {
                warn!(room_id = %self.room_id, error = %err, "room unreachable");
                return Flow::Closed(RoomClosedReason::Unreachable);
            }
        };
        let round_moved = room.current_round != self.current_round;
        self.current_round = room.current_round;
        if !self.send_room(room).await {
            return Flow::Detached;
        }
        if round_moved {
            let result = self.send_round().await;
            return self.settle(result);
        }
        Flow::Continue
    }

    async fn send_room(&self, room: RoomEntity) -> bool {
        let players = room.players_by_join_time();
        self.updates.send(RoomUpdate::Room(room)).await.is_ok()
            && self.updates.send(RoomUpdate::Players(players)).await.is_ok()
    }

    async fn send_round(&self) -> StorageResult<bool> {
        let round = if self.current_round > 0 {
            self.store.find_round(self.room_id, self.current_round).await?
        } else {
            None
        };
        Ok(self.updates.send(RoomUpdate::Round(round)).await.is_ok())
    }

    async fn send_strokes(&self) -> StorageResult<bool> {
        let strokes = self.store.list_strokes(self.room_id).await?;
        Ok(self.updates.send(RoomUpdate::Strokes(strokes)).await.is_ok())
    }

    async fn send_guesses(&self) -> StorageResult<bool> {
        let guesses = self.store.list_guesses(self.room_id).await?;
        Ok(self.updates.send(RoomUpdate::Guesses(guesses)).await.is_ok())
    }

    fn settle(&self, result: StorageResult<bool>) -> Flow {
        match result {
            Ok(true) => Flow::Continue,
            Ok(false) => Flow::Detached,
            Err(err) => {
                warn!(room_id = %self.room_id, error = %err, "room unreachable");
                Flow::Closed(RoomClosedReason::Unreachable)
            }
        }
    }
}
