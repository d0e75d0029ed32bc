use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    GuessEntity, PlayerEntity, RoomEntity, RoomStatus, RoundEntity, StrokeEntity, StrokePoint,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayer {
    id: String,
    name: String,
    score: i64,
    joined_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    id: String,
    code: String,
    host_id: String,
    status: RoomStatus,
    current_round: i64,
    max_rounds: i64,
    players: Vec<MongoPlayer>,
    created_at_ms: i64,
    version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoundDocument {
    #[serde(rename = "_id")]
    id: String,
    room_id: String,
    number: i64,
    drawer_id: String,
    secret_word: String,
    started_at_ms: i64,
    selection_deadline_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStrokeDocument {
    #[serde(rename = "_id")]
    id: String,
    room_id: String,
    points: Vec<StrokePoint>,
    color: String,
    thickness: f64,
    created_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGuessDocument {
    #[serde(rename = "_id")]
    id: String,
    room_id: String,
    player_id: String,
    player_name: String,
    text: String,
    is_correct: bool,
    created_at_ms: i64,
}

impl From<PlayerEntity> for MongoPlayer {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            score: i64::from(value.score),
            joined_at_ms: value.joined_at_ms as i64,
        }
    }
}

impl From<MongoPlayer> for PlayerEntity {
    fn from(value: MongoPlayer) -> Self {
        Self {
            id: value.id,
            name: value.name,
            score: value.score.max(0) as u32,
            joined_at_ms: value.joined_at_ms.max(0) as u64,
        }
    }
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            id: value.id.to_string(),
            code: value.code,
            host_id: value.host_id,
            status: value.status,
            current_round: i64::from(value.current_round),
            max_rounds: i64::from(value.max_rounds),
            players: value.players.into_iter().map(Into::into).collect(),
            created_at_ms: value.created_at_ms as i64,
            version: value.version as i64,
        }
    }
}

impl TryFrom<MongoRoomDocument> for RoomEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRoomDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(&value.id)?,
            code: value.code,
            host_id: value.host_id,
            status: value.status,
            current_round: value.current_round.max(0) as u32,
            max_rounds: value.max_rounds.max(0) as u32,
            players: value.players.into_iter().map(Into::into).collect(),
            created_at_ms: value.created_at_ms.max(0) as u64,
            version: value.version.max(0) as u64,
        })
    }
}

impl MongoRoundDocument {
    pub fn from_entity(room_id: Uuid, value: RoundEntity) -> Self {
        Self {
            id: round_doc_key(room_id, value.number),
            room_id: room_id.to_string(),
            number: i64::from(value.number),
            drawer_id: value.drawer_id,
            secret_word: value.secret_word,
            started_at_ms: value.started_at_ms as i64,
            selection_deadline_ms: value.selection_deadline_ms as i64,
        }
    }

    pub fn key(&self) -> &str {
        &self.id
    }
}

impl From<MongoRoundDocument> for RoundEntity {
    fn from(value: MongoRoundDocument) -> Self {
        Self {
            number: value.number.max(0) as u32,
            drawer_id: value.drawer_id,
            secret_word: value.secret_word,
            started_at_ms: value.started_at_ms.max(0) as u64,
            selection_deadline_ms: value.selection_deadline_ms.max(0) as u64,
        }
    }
}

impl MongoStrokeDocument {
    pub fn from_entity(room_id: Uuid, value: StrokeEntity) -> Self {
        Self {
            id: value.id.to_string(),
            room_id: room_id.to_string(),
            points: value.points,
            color: value.color,
            thickness: f64::from(value.thickness),
            created_at_ms: value.created_at_ms as i64,
        }
    }
}

impl TryFrom<MongoStrokeDocument> for StrokeEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoStrokeDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(&value.id)?,
            points: value.points,
            color: value.color,
            thickness: value.thickness as f32,
            created_at_ms: value.created_at_ms.max(0) as u64,
        })
    }
}

impl MongoGuessDocument {
    pub fn from_entity(room_id: Uuid, value: GuessEntity) -> Self {
        Self {
            id: value.id.to_string(),
            room_id: room_id.to_string(),
            player_id: value.player_id,
            player_name: value.player_name,
            text: value.text,
            is_correct: value.is_correct,
            created_at_ms: value.created_at_ms as i64,
        }
    }
}

impl TryFrom<MongoGuessDocument> for GuessEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoGuessDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(&value.id)?,
            player_id: value.player_id,
            player_name: value.player_name,
            text: value.text,
            is_correct: value.is_correct,
            created_at_ms: value.created_at_ms.max(0) as u64,
        })
    }
}

fn parse_id(value: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| MongoDaoError::InvalidId {
        value: value.to_owned(),
    })
}

fn round_doc_key(room_id: Uuid, number: u32) -> String {
    format!("{room_id}:{number}")
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn room_filter(room_id: Uuid) -> Document {
    doc! {"room_id": room_id.to_string()}
}

pub fn round_filter(room_id: Uuid, number: u32) -> Document {
    doc! {"_id": round_doc_key(room_id, number)}
}
