use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{GuessEntity, RoomEntity, RoundEntity, StrokeEntity};

pub const ROOM_PREFIX: &str = "room::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub value: Option<RowValue>,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RowValue {
    pub rev: String,
}

/// Document stored for every room, keyed `room::{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub room: RoomEntity,
}

impl CouchRoomDocument {
    pub fn new(room: RoomEntity, rev: Option<String>) -> Self {
        Self {
            id: room_doc_id(room.id),
            rev,
            room,
        }
    }
}

/// Round document, keyed so that `_all_docs` returns rounds in number order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoundDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub round: RoundEntity,
}

impl CouchRoundDocument {
    pub fn new(room_id: Uuid, round: RoundEntity, rev: Option<String>) -> Self {
        Self {
            id: round_doc_id(room_id, round.number),
            rev,
            round,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchStrokeDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub stroke: StrokeEntity,
}

impl CouchStrokeDocument {
    pub fn new(room_id: Uuid, stroke: StrokeEntity) -> Self {
        Self {
            id: log_doc_id(
                &stroke_prefix(room_id),
                stroke.created_at_ms,
                stroke.id,
            ),
            stroke,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchGuessDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub guess: GuessEntity,
}

impl CouchGuessDocument {
    pub fn new(room_id: Uuid, guess: GuessEntity) -> Self {
        Self {
            id: log_doc_id(&guess_prefix(room_id), guess.created_at_ms, guess.id),
            guess,
        }
    }
}

/// Tombstone sent through `_bulk_docs`.
#[derive(Debug, Serialize)]
pub struct DeletedDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub rev: String,
    #[serde(rename = "_deleted")]
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest<T> {
    pub docs: Vec<T>,
}

pub fn room_doc_id(id: Uuid) -> String {
    format!("{ROOM_PREFIX}{id}")
}

pub fn round_prefix(room_id: Uuid) -> String {
    format!("round::{room_id}::")
}

pub fn round_doc_id(room_id: Uuid, number: u32) -> String {
    format!("{}{number:04}", round_prefix(room_id))
}

pub fn stroke_prefix(room_id: Uuid) -> String {
    format!("stroke::{room_id}::")
}

pub fn guess_prefix(room_id: Uuid) -> String {
    format!("guess::{room_id}::")
}

/// Child log keys embed the zero-padded creation time so key order is insertion order.
fn log_doc_id(prefix: &str, created_at_ms: u64, id: Uuid) -> String {
    format!("{prefix}{created_at_ms:016}::{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_ids_sort_by_number() {
        let room_id = Uuid::new_v4();
        let mut ids = vec![
            round_doc_id(room_id, 10),
            round_doc_id(room_id, 2),
            round_doc_id(room_id, 1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                round_doc_id(room_id, 1),
                round_doc_id(room_id, 2),
                round_doc_id(room_id, 10),
            ]
        );
        assert!(ids.iter().all(|id| id.starts_with(&round_prefix(room_id))));
    }

    #[test]
    fn log_ids_sort_by_creation_time() {
        let room_id = Uuid::new_v4();
        let early = log_doc_id(&guess_prefix(room_id), 999, Uuid::new_v4());
        let late = log_doc_id(&guess_prefix(room_id), 1_000, Uuid::new_v4());
        assert!(early < late);
    }
}
