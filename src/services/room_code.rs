use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::{
    dao::{models::RoomStatus, room_store::RoomStore},
    error::ServiceError,
};

/// Symbols a join code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Length of a join code.
pub const CODE_LENGTH: usize = 4;

/// Draw a random candidate code.
pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Generate a code no stored room holds, ended rooms included, so a restarted
/// room never shares its code with another waiting room.
///
/// Uniqueness is best effort: two creations racing on the same fresh code may
/// both pass the check.
pub async fn generate_unique_code(store: &Arc<dyn RoomStore>) -> Result<String, ServiceError> {
    generate_unique_code_with(store, || random_code(&mut rand::rng())).await
}

async fn generate_unique_code_with(
    store: &Arc<dyn RoomStore>,
    mut next_candidate: impl FnMut() -> String + Send,
) -> Result<String, ServiceError> {
    loop {
        let candidate = next_candidate();
        let existing = store
            .find_room_by_code(candidate.clone(), RoomStatus::all().to_vec())
            .await?;
        match existing {
            None => return Ok(candidate),
            Some(room) => {
                debug!(code = %candidate, room_id = %room.id, "room code collision; retrying");
            }
        }
    }
}
