//! Guess submission and the scoring transaction.

use tracing::{debug, info};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};
use uuid::Uuid;

use crate::{
    dao::{
        models::{GuessEntity, RoomStatus, now_ms},
        room_store::RoomCommit,
    },
    error::ServiceError,
    services::{
        identity::IdentityProvider,
        transaction::{TxnDecision, TxnOutcome, run_room_transaction},
    },
    state::{
        SharedState,
        turns::{AdvanceCause, plan_advance},
    },
};

/// Points granted to the player who found the word.
pub const GUESSER_POINTS: u32 = 10;
/// Points granted to the drawer of the round that was guessed.
pub const DRAWER_POINTS: u32 = 5;

/// Case and diacritic insensitive form of `text`.
pub fn normalize(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Whether `guess` matches `secret` once both are normalized.
pub fn is_correct_guess(guess: &str, secret: &str) -> bool {
    let secret = normalize(secret);
    !secret.is_empty() && normalize(guess) == secret
}

/// Outcome of [`submit_guess`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessResult {
    /// The guess matched the secret word.
    pub correct: bool,
    /// This guess scored the round; `false` when another guess won the race.
    pub scored: bool,
}

/// Log a guess and, when it matches the secret word, score it and advance the round.
///
/// Concurrent correct guesses for the same round score exactly once.
pub async fn submit_guess(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    room_id: Uuid,
    text: &str,
) -> Result<GuessResult, ServiceError> {
    let player_id = identity.require_identity()?;
    if text.trim().is_empty() {
        return Err(ServiceError::InvalidInput("guess is empty".into()));
    }
    let store = state.require_room_store().await?;
    let config = state.config();

    let room = store
        .find_room(room_id)
        .await?
        .ok_or(ServiceError::RoomNotFound(room_id))?;
    let player = room
        .player(&player_id)
        .cloned()
        .ok_or_else(|| ServiceError::InvalidState(format!("`{player_id}` is not in this room")))?;
    let round_number = room.current_round;
    let round = if round_number > 0 {
        store.find_round(room_id, round_number).await?
    } else {
        None
    };
    if round.as_ref().is_some_and(|round| round.drawer_id == player_id) {
        return Err(ServiceError::InvalidState(
            "the drawer cannot guess".into(),
        ));
    }

    let correct = room.status == RoomStatus::Playing
        && round
            .as_ref()
            .is_some_and(|round| is_correct_guess(text, &round.secret_word));

    store
        .append_guess(
            room_id,
            GuessEntity {
                id: Uuid::new_v4(),
                player_id: player_id.clone(),
                player_name: player.name,
                text: text.to_owned(),
                is_correct: correct,
                created_at_ms: now_ms(),
            },
        )
        .await?;

    if !correct {
        return Ok(GuessResult {
            correct,
            scored: false,
        });
    }

    let outcome = run_room_transaction(&store, room_id, config.retry_policy(), |view| {
        if view.room.status != RoomStatus::Playing || view.room.current_round != round_number {
            return Ok(TxnDecision::Skip(()));
        }
        let current = view.require_round()?.clone();
        if !is_correct_guess(text, &current.secret_word) {
            return Ok(TxnDecision::Skip(()));
        }

        let mut room = view.room;
        for player in &mut room.players {
            if player.id == player_id {
                player.score += GUESSER_POINTS;
            } else if player.id == current.drawer_id {
                player.score += DRAWER_POINTS;
            }
        }
        let next = plan_advance(
            &mut room,
            &current,
            AdvanceCause::Guessed,
            now_ms(),
            config.word_selection_timeout(),
        )?;

        let mut commit = RoomCommit::new(room);
        if let Some(next) = next {
            commit = commit.with_round(next);
        }
        Ok(TxnDecision::Commit(commit, ()))
    })
    .await?;

    let scored = match outcome {
        TxnOutcome::Committed(room, ()) => {
            info!(
                %room_id,
                round = round_number,
                status = room.status.as_str(),
                "round guessed"
            );
            true
        }
        TxnOutcome::Skipped(()) => {
            debug!(%room_id, round = round_number, "round already scored");
            false
        }
    };
    Ok(GuessResult { correct, scored })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        lobby_service::{
            start_game,
            tests::{memory_state, room_with, who},
        },
        turn_service::{choose_word, skip_word_selection_at},
    };

    #[test]
    fn normalization_ignores_case_and_diacritics() {
        assert_eq!(normalize("Água"), "agua");
        assert!(is_correct_guess("Água", "agua"));
        assert!(is_correct_guess("  ARCA ", "arca"));
        assert!(is_correct_guess("coração", "CORACAO"));
        assert!(!is_correct_guess("aguas", "agua"));
        assert!(!is_correct_guess("", ""));
    }

    async fn scores(state: &SharedState, room_id: Uuid) -> Vec<(String, u32)> {
        let store = state.require_room_store().await.unwrap();
        let room = store.find_room(room_id).await.unwrap().unwrap();
        room.players
            .into_iter()
            .map(|player| (player.id, player.score))
            .collect()
    }

    #[tokio::test]
    async fn two_round_game_scores_then_ends_on_timeout() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 2).await;
        start_game(&state, &who("a"), room_id).await.unwrap();
        assert!(choose_word(&state, &who("a"), room_id, 1, "arca").await.unwrap());

        let result = submit_guess(&state, &who("b"), room_id, " Arca ").await.unwrap();
        assert_eq!(
            result,
            GuessResult {
                correct: true,
                scored: true
            }
        );
        assert_eq!(
            scores(&state, room_id).await,
            [("a".to_owned(), 5), ("b".to_owned(), 10)]
        );

        let store = state.require_room_store().await.unwrap();
        let room = store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(room.current_round, 2);
        assert_eq!(room.status, RoomStatus::WordSelection);
        let round = store.find_round(room_id, 2).await.unwrap().unwrap();
        assert_eq!(round.drawer_id, "b");

        assert!(
            skip_word_selection_at(&state, room_id, 2, round.selection_deadline_ms)
                .await
                .unwrap()
        );
        let room = store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(room.status, RoomStatus::Ended);
        assert_eq!(room.current_round, 2);

        let log = store.list_guesses(room_id).await.unwrap();
        assert_eq!(log.len(), 2);
        assert!(log[0].is_correct);
        assert_eq!(log[0].text, " Arca ");
        assert_eq!(log[1].text, "b: Perdeu a vez!");
    }

    #[tokio::test]
    async fn wrong_guesses_are_logged_without_scoring() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 3).await;
        start_game(&state, &who("a"), room_id).await.unwrap();
        choose_word(&state, &who("a"), room_id, 1, "agua").await.unwrap();

        let result = submit_guess(&state, &who("b"), room_id, "aguas").await.unwrap();
        assert!(!result.correct);
        assert!(!result.scored);
        assert!(scores(&state, room_id).await.iter().all(|(_, s)| *s == 0));

        let store = state.require_room_store().await.unwrap();
        let log = store.list_guesses(room_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(!log[0].is_correct);
    }

    #[tokio::test]
    async fn drawer_cannot_guess() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 3).await;
        start_game(&state, &who("a"), room_id).await.unwrap();
        choose_word(&state, &who("a"), room_id, 1, "arca").await.unwrap();

        let err = submit_guess(&state, &who("a"), room_id, "arca")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn concurrent_correct_guesses_score_once() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b", "c"], 5).await;
        start_game(&state, &who("a"), room_id).await.unwrap();
        choose_word(&state, &who("a"), room_id, 1, "Água").await.unwrap();

        let (bia, caio) = (who("b"), who("c"));
        let (b, c) = tokio::join!(
            submit_guess(&state, &bia, room_id, "agua"),
            submit_guess(&state, &caio, room_id, "AGUA"),
        );
        let (b, c) = (b.unwrap(), c.unwrap());
        assert!(b.scored ^ c.scored);

        let total: u32 = scores(&state, room_id).await.iter().map(|(_, s)| s).sum();
        assert_eq!(total, GUESSER_POINTS + DRAWER_POINTS);

        let store = state.require_room_store().await.unwrap();
        let room = store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(room.current_round, 2);
    }
}
