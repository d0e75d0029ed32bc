use std::collections::HashSet;

use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::scoring_service::normalize,
    state::SharedState,
};

/// Number of words offered to the drawer.
pub const WORD_CHOICES: usize = 2;

/// Words the drawer may pick from, skipping words already played in this room.
pub async fn words_to_choose(state: &SharedState, room_id: Uuid) -> Result<Vec<String>, ServiceError> {
    let store = state.require_room_store().await?;
    if store.find_room(room_id).await?.is_none() {
        return Err(ServiceError::RoomNotFound(room_id));
    }
    let used: HashSet<String> = store
        .list_rounds(room_id)
        .await?
        .iter()
        .filter(|round| !round.is_pending_selection())
        .map(|round| normalize(&round.secret_word))
        .collect();

    let config = state.config();
    Ok(pick_words(config.words(), &used, &mut rand::rng()))
}

/// Shuffle the unused words and keep the first few. When too few remain, the
/// unused ones lead and the rest is filled from the shuffled full list.
pub fn pick_words<R: rand::Rng + ?Sized>(
    words: &[String],
    used: &HashSet<String>,
    rng: &mut R,
) -> Vec<String> {
    let (mut available, mut played): (Vec<&String>, Vec<&String>) = words
        .iter()
        .partition(|word| !used.contains(&normalize(word)));
    available.shuffle(rng);
    if available.len() < WORD_CHOICES {
        played.shuffle(rng);
        available.extend(played);
    }
    available
        .into_iter()
        .take(WORD_CHOICES)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::services::{
        lobby_service::{
            start_game,
            tests::{memory_state, room_with, who},
        },
        turn_service::choose_word,
    };

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|word| word.to_string()).collect()
    }

    #[test]
    fn used_words_are_excluded() {
        let list = words(&["Arca", "Moisés", "Davi"]);
        let used = HashSet::from(["moises".to_owned()]);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let mut picked = pick_words(&list, &used, &mut rng);
            picked.sort();
            assert_eq!(picked, ["Arca", "Davi"]);
        }
    }

    #[test]
    fn falls_back_to_full_list_when_exhausted() {
        let list = words(&["Arca", "Davi", "Golias"]);
        let used = HashSet::from(["arca".to_owned(), "davi".to_owned()]);
        let picked = pick_words(&list, &used, &mut StdRng::seed_from_u64(9));
        assert_eq!(picked.len(), WORD_CHOICES);
        assert!(picked.iter().all(|word| list.contains(word)));
        assert_ne!(picked[0], picked[1]);
    }

    #[test]
    fn last_unused_word_is_always_offered() {
        let list = words(&["Arca", "Davi", "Golias", "Noé"]);
        let used = HashSet::from(["arca".to_owned(), "davi".to_owned(), "noe".to_owned()]);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let picked = pick_words(&list, &used, &mut rng);
            assert_eq!(picked.len(), WORD_CHOICES);
            assert_eq!(picked[0], "Golias");
            assert_ne!(picked[1], "Golias");
        }
    }

    #[tokio::test]
    async fn played_words_are_not_offered_again() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 3).await;
        start_game(&state, &who("a"), room_id).await.unwrap();

        let offered = words_to_choose(&state, room_id).await.unwrap();
        assert_eq!(offered.len(), WORD_CHOICES);
        choose_word(&state, &who("a"), room_id, 1, &offered[0])
            .await
            .unwrap();

        for _ in 0..20 {
            let next = words_to_choose(&state, room_id).await.unwrap();
            assert!(!next.contains(&offered[0]));
        }
    }
}
