use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Sketch Guess Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::create_session,
        crate::routes::rooms::create_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::close_room,
        crate::routes::rooms::start_game,
        crate::routes::rooms::choose_word,
        crate::routes::rooms::skip_word_selection,
        crate::routes::rooms::submit_guess,
        crate::routes::rooms::add_stroke,
        crate::routes::rooms::clear_canvas,
        crate::routes::rooms::restart_game,
        crate::routes::rooms::update_max_rounds,
        crate::routes::rooms::words_to_choose,
        crate::routes::sse::room_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::RoomClosedEvent,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerFrame,
            crate::dto::room::PlayerSummary,
            crate::dto::room::RoomSummary,
            crate::dto::room::RoundSummary,
            crate::dto::room::StrokeSummary,
            crate::dto::room::GuessSummary,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Anonymous sign-in on demand"),
        (name = "rooms", description = "Room lifecycle"),
        (name = "turns", description = "Word selection and guesses"),
        (name = "canvas", description = "Drawing strokes"),
        (name = "sse", description = "Server-sent room snapshots"),
        (name = "websocket", description = "Bidirectional room socket"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_room_routes() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/rooms",
            "/rooms/join",
            "/rooms/{id}",
            "/rooms/{id}/guesses",
            "/rooms/{id}/events",
            "/session",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }
}
