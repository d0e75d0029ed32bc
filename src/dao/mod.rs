/// Entities persisted for every room.
pub mod models;
/// Room persistence contract and its backends.
pub mod room_store;
/// Backend-agnostic storage errors.
pub mod storage;
