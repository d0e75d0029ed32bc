use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::room::{
        ActionResponse, ChooseWordRequest, ClearCanvasResponse, CreateRoomRequest,
        CreatedRoomResponse, GuessRequest, GuessResponse, JoinRoomRequest, JoinRoomResponse,
        MaxRoundsRequest, RoomSnapshotResponse, RoomSummary, SkipSelectionRequest, StrokeRequest,
        StrokeSummary, WordsResponse,
    },
    error::AppError,
    services::{
        canvas_service,
        identity::{CallerIdentity, IdentityProvider},
        lobby_service, scoring_service, turn_service, word_service,
    },
    state::SharedState,
};

/// Room commands: lifecycle, turns, guesses and canvas.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/join", post(join_room))
        .route("/rooms/{id}", get(get_room).delete(close_room))
        .route("/rooms/{id}/start", post(start_game))
        .route("/rooms/{id}/word", post(choose_word))
        .route("/rooms/{id}/skip", post(skip_word_selection))
        .route("/rooms/{id}/guesses", post(submit_guess))
        .route("/rooms/{id}/strokes", post(add_stroke).delete(clear_canvas))
        .route("/rooms/{id}/restart", post(restart_game))
        .route("/rooms/{id}/max-rounds", put(update_max_rounds))
        .route("/rooms/{id}/words", get(words_to_choose))
}

/// Open a room with the caller as host.
#[utoipa::path(
    post,
    path = "/rooms",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = CreatedRoomResponse),
        (status = 401, description = "Missing x-player-id header")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<(StatusCode, Json<CreatedRoomResponse>), AppError> {
    let created =
        lobby_service::create_room(&state, &identity, &payload.player_name, payload.max_rounds)
            .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedRoomResponse {
            room_id: created.room_id,
            code: created.code,
        }),
    ))
}

/// Join a waiting room by code. Joining twice returns the same room.
#[utoipa::path(
    post,
    path = "/rooms/join",
    tag = "rooms",
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Joined", body = JoinRoomResponse),
        (status = 409, description = "No waiting room with this code, or room full")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Valid(Json(payload)): Valid<Json<JoinRoomRequest>>,
) -> Result<Json<JoinRoomResponse>, AppError> {
    let room_id =
        lobby_service::join_room(&state, &identity, &payload.code, &payload.player_name).await?;
    Ok(Json(JoinRoomResponse { room_id }))
}

/// Room snapshot with the players ranked by score.
#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSnapshotResponse),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomSnapshotResponse>, AppError> {
    let snapshot = lobby_service::room_snapshot(&state, id).await?;
    let viewer = identity.current_identity();
    Ok(Json(RoomSnapshotResponse::for_viewer(
        snapshot,
        viewer.as_deref(),
    )))
}

/// Delete the room; observers receive a `room.closed` notification.
#[utoipa::path(
    delete,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses(
        (status = 204, description = "Room closed"),
        (status = 403, description = "Caller is not the host")
    )
)]
pub async fn close_room(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    lobby_service::close_room(&state, &identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Start round one. Not applied with fewer than two players.
#[utoipa::path(
    post,
    path = "/rooms/{id}/start",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Whether the game started", body = ActionResponse),
        (status = 403, description = "Caller is not the host")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, AppError> {
    let applied = lobby_service::start_game(&state, &identity, id).await?;
    Ok(Json(ActionResponse { applied }))
}

/// Record the drawer's word for the current round.
#[utoipa::path(
    post,
    path = "/rooms/{id}/word",
    tag = "turns",
    params(("id" = Uuid, Path, description = "Room identifier")),
    request_body = ChooseWordRequest,
    responses((status = 200, description = "Whether the word was recorded", body = ActionResponse))
)]
pub async fn choose_word(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ChooseWordRequest>>,
) -> Result<Json<ActionResponse>, AppError> {
    let applied =
        turn_service::choose_word(&state, &identity, id, payload.round, &payload.word).await?;
    Ok(Json(ActionResponse { applied }))
}

/// Skip a drawer whose selection countdown elapsed.
#[utoipa::path(
    post,
    path = "/rooms/{id}/skip",
    tag = "turns",
    params(("id" = Uuid, Path, description = "Room identifier")),
    request_body = SkipSelectionRequest,
    responses((status = 200, description = "Whether the round was skipped", body = ActionResponse))
)]
pub async fn skip_word_selection(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SkipSelectionRequest>>,
) -> Result<Json<ActionResponse>, AppError> {
    identity.require_identity().map_err(AppError::from)?;
    let applied = turn_service::skip_word_selection(&state, id, payload.round).await?;
    Ok(Json(ActionResponse { applied }))
}

/// Log a guess and score it when it matches.
#[utoipa::path(
    post,
    path = "/rooms/{id}/guesses",
    tag = "turns",
    params(("id" = Uuid, Path, description = "Room identifier")),
    request_body = GuessRequest,
    responses(
        (status = 200, description = "Guess logged", body = GuessResponse),
        (status = 409, description = "The drawer cannot guess")
    )
)]
pub async fn submit_guess(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<GuessRequest>>,
) -> Result<Json<GuessResponse>, AppError> {
    let result = scoring_service::submit_guess(&state, &identity, id, &payload.text).await?;
    Ok(Json(GuessResponse {
        correct: result.correct,
        scored: result.scored,
    }))
}

/// Append a stroke to the canvas.
#[utoipa::path(
    post,
    path = "/rooms/{id}/strokes",
    tag = "canvas",
    params(("id" = Uuid, Path, description = "Room identifier")),
    request_body = StrokeRequest,
    responses((status = 201, description = "Stroke appended", body = StrokeSummary))
)]
pub async fn add_stroke(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<StrokeRequest>>,
) -> Result<(StatusCode, Json<StrokeSummary>), AppError> {
    let stroke = canvas_service::add_stroke(&state, &identity, id, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(stroke.into())))
}

/// Remove every stroke.
#[utoipa::path(
    delete,
    path = "/rooms/{id}/strokes",
    tag = "canvas",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses((status = 200, description = "Canvas cleared", body = ClearCanvasResponse))
)]
pub async fn clear_canvas(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ClearCanvasResponse>, AppError> {
    let removed = canvas_service::clear_canvas(&state, &identity, id).await?;
    Ok(Json(ClearCanvasResponse { removed }))
}

/// Reset scores and rounds and go back to the lobby.
#[utoipa::path(
    post,
    path = "/rooms/{id}/restart",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room back in the lobby", body = RoomSummary),
        (status = 403, description = "Caller is not the host")
    )
)]
pub async fn restart_game(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomSummary>, AppError> {
    let room = lobby_service::restart_game(&state, &identity, id).await?;
    Ok(Json(room.into()))
}

/// Change the round limit of a room.
#[utoipa::path(
    put,
    path = "/rooms/{id}/max-rounds",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier")),
    request_body = MaxRoundsRequest,
    responses(
        (status = 200, description = "Round limit updated", body = RoomSummary),
        (status = 403, description = "Caller is not the host")
    )
)]
pub async fn update_max_rounds(
    State(state): State<SharedState>,
    identity: CallerIdentity,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<MaxRoundsRequest>>,
) -> Result<Json<RoomSummary>, AppError> {
    let room = lobby_service::update_max_rounds(&state, &identity, id, payload.max_rounds).await?;
    Ok(Json(room.into()))
}

/// Two words for the drawer, avoiding words already played in the room.
#[utoipa::path(
    get,
    path = "/rooms/{id}/words",
    tag = "turns",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses((status = 200, description = "Words to choose from", body = WordsResponse))
)]
pub async fn words_to_choose(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WordsResponse>, AppError> {
    let words = word_service::words_to_choose(&state, id).await?;
    Ok(Json(WordsResponse { words }))
}
