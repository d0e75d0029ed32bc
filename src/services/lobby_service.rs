//! Room lifecycle: creation, joining, start, restart, round limit and closing.

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{PlayerEntity, RoomEntity, RoomStatus, RoundEntity, now_ms},
    error::ServiceError,
    services::{
        identity::IdentityProvider,
        room_code,
        transaction::{TxnDecision, TxnOutcome, run_room_transaction},
    },
    dao::room_store::RoomCommit,
    state::{
        SharedState,
        state_machine::{RoomEvent, next_status},
        turns::new_round,
    },
};

/// Smallest allowed round limit.
pub const MIN_ROUNDS: u32 = 1;
/// Largest allowed round limit.
pub const MAX_ROUNDS: u32 = 15;
/// Round limit used when the host does not ask for one.
pub const DEFAULT_ROUNDS: u32 = 7;
/// Players needed before a game can start.
pub const MIN_PLAYERS: usize = 2;

/// Clamp a requested round limit into the allowed range.
pub fn clamp_max_rounds(requested: u32) -> u32 {
    requested.clamp(MIN_ROUNDS, MAX_ROUNDS)
}

/// Room freshly created by [`create_room`].
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    /// Room id.
    pub room_id: Uuid,
    /// Join code.
    pub code: String,
}

/// Create a room in the lobby with the caller as host and sole player.
pub async fn create_room(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    host_name: &str,
    max_rounds: Option<u32>,
) -> Result<CreatedRoom, ServiceError> {
    let host_id = identity.require_identity()?;
    let host_name = display_name(host_name)?;
    let store = state.require_room_store().await?;

    let code = room_code::generate_unique_code(&store).await?;
    let now = now_ms();
    let room = RoomEntity {
        id: Uuid::new_v4(),
        code: code.clone(),
        host_id: host_id.clone(),
        status: RoomStatus::Waiting,
        current_round: 0,
        max_rounds: clamp_max_rounds(max_rounds.unwrap_or(DEFAULT_ROUNDS)),
        players: vec![PlayerEntity {
            id: host_id,
            name: host_name,
            score: 0,
            joined_at_ms: now,
        }],
        created_at_ms: now,
        version: 0,
    };
    let room_id = room.id;
    store.create_room(room).await?;

    info!(%room_id, %code, "room created");
    Ok(CreatedRoom { room_id, code })
}

/// Join the waiting room holding `code`; joining twice is a no-op.
pub async fn join_room(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    code: &str,
    player_name: &str,
) -> Result<Uuid, ServiceError> {
    let player_id = identity.require_identity()?;
    let player_name = display_name(player_name)?;
    let store = state.require_room_store().await?;
    let code = code.trim().to_ascii_uppercase();

    let room = store
        .find_room_by_code(code.clone(), vec![RoomStatus::Waiting])
        .await?
        .ok_or_else(|| ServiceError::RoomNotJoinable(format!("no waiting room with code {code}")))?;
    let room_id = room.id;
    if room.has_player(&player_id) {
        return Ok(room_id);
    }

    let max_players = state.config().max_players();
    let outcome = run_room_transaction(&store, room_id, state.config().retry_policy(), |view| {
        let mut room = view.room;
        if room.has_player(&player_id) {
            return Ok(TxnDecision::Skip(()));
        }
        if room.status != RoomStatus::Waiting {
            return Err(ServiceError::RoomNotJoinable(format!(
                "room {code} already started"
            )));
        }
        if room.players.len() >= max_players {
            return Err(ServiceError::RoomNotJoinable(format!("room {code} is full")));
        }
        room.players.push(PlayerEntity {
            id: player_id.clone(),
            name: player_name.clone(),
            score: 0,
            joined_at_ms: now_ms(),
        });
        Ok(TxnDecision::Commit(RoomCommit::new(room), ()))
    })
    .await?;

    if outcome.is_committed() {
        info!(%room_id, player_id = %player_id, "player joined room");
    }
    Ok(room_id)
}

/// Start the first round; silently does nothing with fewer than two players.
pub async fn start_game(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    room_id: Uuid,
) -> Result<bool, ServiceError> {
    let caller = identity.require_identity()?;
    let store = state.require_room_store().await?;
    let config = state.config();

    let outcome = run_room_transaction(&store, room_id, config.retry_policy(), |view| {
        let mut room = view.room;
        ensure_host(&room, &caller)?;
        if room.players.len() < MIN_PLAYERS {
            return Ok(TxnDecision::Skip(()));
        }
        room.status = next_status(room.status, RoomEvent::StartGame)?;
        room.current_round = 1;

        let players = room.players_by_join_time();
        let round: RoundEntity = new_round(
            1,
            &players[0].id,
            now_ms(),
            config.word_selection_timeout(),
        );
        Ok(TxnDecision::Commit(RoomCommit::new(room).with_round(round), ()))
    })
    .await?;

    let started = outcome.is_committed();
    if started {
        info!(%room_id, "game started");
    }
    Ok(started)
}

/// Change the round limit, never below the round already being played.
pub async fn update_max_rounds(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    room_id: Uuid,
    requested: u32,
) -> Result<RoomEntity, ServiceError> {
    let caller = identity.require_identity()?;
    let store = state.require_room_store().await?;

    let room = store
        .find_room(room_id)
        .await?
        .ok_or(ServiceError::RoomNotFound(room_id))?;
    ensure_host(&room, &caller)?;

    let max_rounds = clamp_max_rounds(requested).max(room.current_round);
    let updated = store.update_max_rounds(room_id, max_rounds).await?;
    info!(%room_id, max_rounds, "round limit updated");
    Ok(updated)
}

/// Wipe rounds, strokes and guesses, reset scores and return to the lobby.
pub async fn restart_game(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    room_id: Uuid,
) -> Result<RoomEntity, ServiceError> {
    let caller = identity.require_identity()?;
    let store = state.require_room_store().await?;

    let outcome = run_room_transaction(&store, room_id, state.config().retry_policy(), |view| {
        let mut room = view.room;
        ensure_host(&room, &caller)?;
        room.status = next_status(room.status, RoomEvent::Restart)?;
        room.current_round = 0;
        for player in &mut room.players {
            player.score = 0;
        }
        Ok(TxnDecision::Commit(
            RoomCommit::new(room).resetting_children(),
            (),
        ))
    })
    .await?;

    match outcome {
        TxnOutcome::Committed(room, ()) => {
            info!(%room_id, "game restarted");
            Ok(room)
        }
        TxnOutcome::Skipped(()) => Err(ServiceError::InvariantViolation(
            "restart did not commit".into(),
        )),
    }
}

/// Delete the room and everything it owns.
pub async fn close_room(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    room_id: Uuid,
) -> Result<(), ServiceError> {
    let caller = identity.require_identity()?;
    let store = state.require_room_store().await?;

    let room = store
        .find_room(room_id)
        .await?
        .ok_or(ServiceError::RoomNotFound(room_id))?;
    ensure_host(&room, &caller)?;

    if !store.delete_room(room_id).await? {
        return Err(ServiceError::RoomNotFound(room_id));
    }
    info!(%room_id, "room closed");
    Ok(())
}

/// Room with its players ranked by score, and its current round.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    /// Room document.
    pub room: RoomEntity,
    /// Players by descending score, ties in join order.
    pub ranking: Vec<PlayerEntity>,
    /// Current round, if started.
    pub round: Option<RoundEntity>,
}

/// Load a room with its ranking and current round.
pub async fn room_snapshot(state: &SharedState, room_id: Uuid) -> Result<RoomSnapshot, ServiceError> {
    let store = state.require_room_store().await?;
    let room = store
        .find_room(room_id)
        .await?
        .ok_or(ServiceError::RoomNotFound(room_id))?;
    let round = if room.current_round > 0 {
        store.find_round(room_id, room.current_round).await?
    } else {
        None
    };
    Ok(RoomSnapshot {
        ranking: ranking(&room),
        room,
        round,
    })
}

/// Players ordered by descending score, ties broken by join order.
pub fn ranking(room: &RoomEntity) -> Vec<PlayerEntity> {
    let mut players = room.players_by_join_time();
    players.sort_by(|a, b| b.score.cmp(&a.score));
    players
}

fn ensure_host(room: &RoomEntity, caller: &str) -> Result<(), ServiceError> {
    if room.host_id == caller {
        Ok(())
    } else {
        Err(ServiceError::NotHost(room.id))
    }
}

fn display_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("player name is empty".into()));
    }
    Ok(name.to_owned())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{GuessEntity, StrokeEntity, StrokePoint},
            room_store::{RoomStore, memory::MemoryRoomStore},
        },
        services::identity::CallerIdentity,
        state::AppState,
    };

    pub(crate) async fn memory_state() -> SharedState {
        AppState::with_store(AppConfig::default(), Arc::new(MemoryRoomStore::new())).await
    }

    pub(crate) fn who(id: &str) -> CallerIdentity {
        CallerIdentity::new(id)
    }

    /// Room created by `a` and joined by every other id, in order.
    pub(crate) async fn room_with(state: &SharedState, ids: &[&str], max_rounds: u32) -> Uuid {
        let created = create_room(state, &who(ids[0]), ids[0], Some(max_rounds))
            .await
            .unwrap();
        for id in &ids[1..] {
            join_room(state, &who(id), &created.code, id).await.unwrap();
        }
        created.room_id
    }

    async fn stored(state: &SharedState, room_id: Uuid) -> RoomEntity {
        let store = state.require_room_store().await.unwrap();
        store.find_room(room_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn create_room_requires_identity() {
        let state = memory_state().await;
        let err = create_room(&state, &CallerIdentity::anonymous(), "Ana", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::IdentityUnavailable));
    }

    #[tokio::test]
    async fn create_room_clamps_rounds_and_seats_host() {
        let state = memory_state().await;
        let created = create_room(&state, &who("a"), " Ana ", Some(99))
            .await
            .unwrap();
        let room = stored(&state, created.room_id).await;

        assert_eq!(room.max_rounds, MAX_ROUNDS);
        assert_eq!(room.status, RoomStatus::Waiting);
        assert_eq!(room.current_round, 0);
        assert_eq!(room.host_id, "a");
        assert_eq!(room.players.len(), 1);
        assert_eq!(room.players[0].name, "Ana");
        assert_eq!(room.code, created.code);

        let low = create_room(&state, &who("b"), "Bia", Some(0)).await.unwrap();
        assert_eq!(stored(&state, low.room_id).await.max_rounds, MIN_ROUNDS);

        let default = create_room(&state, &who("c"), "Caio", None).await.unwrap();
        assert_eq!(stored(&state, default.room_id).await.max_rounds, 7);
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let state = memory_state().await;
        let created = create_room(&state, &who("a"), "Ana", None).await.unwrap();

        let first = join_room(&state, &who("b"), &created.code, "Bia").await.unwrap();
        let second = join_room(&state, &who("b"), &created.code.to_lowercase(), "Bia")
            .await
            .unwrap();

        assert_eq!(first, created.room_id);
        assert_eq!(second, created.room_id);
        let room = stored(&state, created.room_id).await;
        assert_eq!(room.players.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_joins_both_land() {
        let state = memory_state().await;
        let created = create_room(&state, &who("a"), "Ana", None).await.unwrap();

        let (bia, caio) = (who("b"), who("c"));
        let (b, c) = tokio::join!(
            join_room(&state, &bia, &created.code, "Bia"),
            join_room(&state, &caio, &created.code, "Caio"),
        );
        b.unwrap();
        c.unwrap();

        let room = stored(&state, created.room_id).await;
        let mut ids: Vec<_> = room.players.iter().map(|p| p.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn join_rejects_unknown_code_started_room_and_full_room() {
        let state = memory_state().await;
        let err = join_room(&state, &who("b"), "ZZZZ", "Bia").await.unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotJoinable(_)));

        let room_id = room_with(&state, &["a", "b"], 3).await;
        assert!(start_game(&state, &who("a"), room_id).await.unwrap());
        let code = stored(&state, room_id).await.code;
        let err = join_room(&state, &who("c"), &code, "Caio").await.unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotJoinable(_)));

        let small = AppState::with_store(
            AppConfig::default().with_max_players(2),
            Arc::new(MemoryRoomStore::new()),
        )
        .await;
        let created = create_room(&small, &who("a"), "Ana", None).await.unwrap();
        join_room(&small, &who("b"), &created.code, "Bia").await.unwrap();
        let err = join_room(&small, &who("c"), &created.code, "Caio")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotJoinable(_)));
    }

    #[tokio::test]
    async fn start_needs_two_players_and_the_host() {
        let state = memory_state().await;
        let created = create_room(&state, &who("a"), "Ana", None).await.unwrap();
        assert!(!start_game(&state, &who("a"), created.room_id).await.unwrap());
        assert_eq!(
            stored(&state, created.room_id).await.status,
            RoomStatus::Waiting
        );

        join_room(&state, &who("b"), &created.code, "Bia").await.unwrap();
        let err = start_game(&state, &who("b"), created.room_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotHost(_)));

        assert!(start_game(&state, &who("a"), created.room_id).await.unwrap());
        let room = stored(&state, created.room_id).await;
        assert_eq!(room.status, RoomStatus::WordSelection);
        assert_eq!(room.current_round, 1);

        let store = state.require_room_store().await.unwrap();
        let round = store.find_round(created.room_id, 1).await.unwrap().unwrap();
        assert_eq!(round.drawer_id, "a");
        assert!(round.is_pending_selection());
        assert!(round.selection_deadline_ms > round.started_at_ms);
    }

    #[tokio::test]
    async fn max_rounds_is_clamped_and_host_only() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 3).await;

        let err = update_max_rounds(&state, &who("b"), room_id, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotHost(_)));

        let room = update_max_rounds(&state, &who("a"), room_id, 40).await.unwrap();
        assert_eq!(room.max_rounds, MAX_ROUNDS);
        assert_eq!(room.players.len(), 2);
        assert_eq!(room.code, stored(&state, room_id).await.code);

        let room = update_max_rounds(&state, &who("a"), room_id, 0).await.unwrap();
        assert_eq!(room.max_rounds, MIN_ROUNDS);
    }

    #[tokio::test]
    async fn restart_resets_scores_and_children() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 3).await;
        start_game(&state, &who("a"), room_id).await.unwrap();

        let store = state.require_room_store().await.unwrap();
        let mut room = stored(&state, room_id).await;
        room.players[1].score = 10;
        store.commit_room(RoomCommit::new(room.clone())).await.unwrap();
        store
            .append_stroke(
                room_id,
                StrokeEntity {
                    id: Uuid::new_v4(),
                    points: vec![StrokePoint { x: 1.0, y: 2.0 }],
                    color: "#000".into(),
                    thickness: 3.0,
                    created_at_ms: now_ms(),
                },
            )
            .await
            .unwrap();
        store
            .append_guess(room_id, GuessEntity::system("oi".into()))
            .await
            .unwrap();

        let err = restart_game(&state, &who("b"), room_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotHost(_)));

        let restarted = restart_game(&state, &who("a"), room_id).await.unwrap();
        assert_eq!(restarted.status, RoomStatus::Waiting);
        assert_eq!(restarted.current_round, 0);
        assert!(restarted.players.iter().all(|p| p.score == 0));
        assert_eq!(restarted.id, room.id);
        assert_eq!(restarted.code, room.code);
        assert_eq!(restarted.host_id, room.host_id);
        let ids: Vec<_> = restarted.players.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, ["a", "b"]);

        assert!(store.list_rounds(room_id).await.unwrap().is_empty());
        assert!(store.list_strokes(room_id).await.unwrap().is_empty());
        assert!(store.list_guesses(room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_room_deletes_it() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 3).await;

        let err = close_room(&state, &who("b"), room_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotHost(_)));

        close_room(&state, &who("a"), room_id).await.unwrap();
        let err = room_snapshot(&state, room_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotFound(_)));
    }

    #[test]
    fn ranking_orders_by_score_then_join_time() {
        let room = RoomEntity {
            id: Uuid::new_v4(),
            code: "RANK".into(),
            host_id: "a".into(),
            status: RoomStatus::Ended,
            current_round: 2,
            max_rounds: 2,
            players: vec![
                PlayerEntity {
                    id: "a".into(),
                    name: "A".into(),
                    score: 5,
                    joined_at_ms: 1,
                },
                PlayerEntity {
                    id: "b".into(),
                    name: "B".into(),
                    score: 10,
                    joined_at_ms: 2,
                },
                PlayerEntity {
                    id: "c".into(),
                    name: "C".into(),
                    score: 5,
                    joined_at_ms: 3,
                },
            ],
            created_at_ms: 0,
            version: 0,
        };
        let ids: Vec<_> = ranking(&room).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }
}
