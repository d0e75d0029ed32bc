/// Canvas strokes.
pub mod canvas_service;
/// Background skip of expired word selections.
pub mod deadline_sweeper;
/// OpenAPI documentation generation.
pub mod documentation;
/// Per-room change fan-out.
pub mod fanout_service;
/// Health check service.
pub mod health_service;
/// Caller identity resolution.
pub mod identity;
/// Room lifecycle operations.
pub mod lobby_service;
/// Join code generation.
pub mod room_code;
/// Guess scoring.
pub mod scoring_service;
/// Server-Sent Events room streams.
pub mod sse_service;
/// Storage connection supervisor.
pub mod storage_supervisor;
/// Optimistic room transactions.
pub mod transaction;
/// Word selection and turn timeouts.
pub mod turn_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
/// Words offered to the drawer.
pub mod word_service;
