//! Word selection and its timeout path.

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        models::{GuessEntity, RoomStatus, now_ms},
        room_store::RoomCommit,
    },
    error::ServiceError,
    services::{
        identity::IdentityProvider,
        transaction::{TxnDecision, run_room_transaction},
    },
    state::{
        SharedState,
        state_machine::{RoomEvent, next_status},
        turns::{AdvanceCause, plan_advance},
    },
};

/// Text of the log entry announcing that `drawer` ran out of time.
pub fn skipped_turn_message(drawer: &str) -> String {
    format!("{drawer}: Perdeu a vez!")
}

/// Record the drawer's secret word and open the guessing phase.
///
/// Returns `false` when the room already left word selection for `round`, when
/// a word was already picked, or when the caller is not the drawer.
pub async fn choose_word(
    state: &SharedState,
    identity: &dyn IdentityProvider,
    room_id: Uuid,
    round: u32,
    word: &str,
) -> Result<bool, ServiceError> {
    let caller = identity.require_identity()?;
    let word = word.trim();
    if word.is_empty() {
        return Err(ServiceError::InvalidInput("secret word is empty".into()));
    }
    let store = state.require_room_store().await?;

    let outcome = run_room_transaction(&store, room_id, state.config().retry_policy(), |view| {
        if view.room.status != RoomStatus::WordSelection || view.room.current_round != round {
            return Ok(TxnDecision::Skip(()));
        }
        let mut current = view.require_round()?.clone();
        if current.drawer_id != caller || !current.is_pending_selection() {
            return Ok(TxnDecision::Skip(()));
        }

        let mut room = view.room;
        room.status = next_status(room.status, RoomEvent::WordChosen)?;
        current.secret_word = word.to_owned();
        Ok(TxnDecision::Commit(RoomCommit::new(room).with_round(current), ()))
    })
    .await?;

    let chosen = outcome.is_committed();
    if chosen {
        info!(%room_id, round, "word chosen");
    }
    Ok(chosen)
}

/// Skip the drawer of `round` once its selection deadline has passed.
///
/// Does nothing unless the room is still choosing a word for that round; the
/// timeout and a late `choose_word` can race safely, only one of them commits.
pub async fn skip_word_selection(
    state: &SharedState,
    room_id: Uuid,
    round: u32,
) -> Result<bool, ServiceError> {
    skip_word_selection_at(state, room_id, round, now_ms()).await
}

pub(crate) async fn skip_word_selection_at(
    state: &SharedState,
    room_id: Uuid,
    round: u32,
    now: u64,
) -> Result<bool, ServiceError> {
    let store = state.require_room_store().await?;
    let config = state.config();

    let outcome = run_room_transaction(&store, room_id, config.retry_policy(), |view| {
        if view.room.status != RoomStatus::WordSelection || view.room.current_round != round {
            return Ok(TxnDecision::Skip(None));
        }
        let current = view.require_round()?.clone();
        if !current.is_pending_selection() || !current.selection_expired(now) {
            return Ok(TxnDecision::Skip(None));
        }

        let drawer_name = view
            .room
            .player(&current.drawer_id)
            .map(|player| player.name.clone())
            .unwrap_or_else(|| current.drawer_id.clone());

        let mut room = view.room;
        let next = plan_advance(
            &mut room,
            &current,
            AdvanceCause::SelectionTimedOut,
            now,
            config.word_selection_timeout(),
        )?;
        let next_round = next.as_ref().map(|round| round.number);

        let mut commit =
            RoomCommit::new(room).with_guess(GuessEntity::system(skipped_turn_message(&drawer_name)));
        if let Some(next) = next {
            commit = commit.with_round(next);
        }
        Ok(TxnDecision::Commit(commit, Some(next_round)))
    })
    .await?;

    match outcome.into_value() {
        Some(Some(next_round)) => {
            info!(%room_id, round, next_round, "word selection skipped; round advanced");
            Ok(true)
        }
        Some(None) => {
            info!(%room_id, round, "word selection skipped on the last round; room ended");
            Ok(true)
        }
        None => Ok(false),
    }
}
