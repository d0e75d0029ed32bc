use thiserror::Error;

use crate::dao::models::RoomStatus;

/// Events that move a room between lifecycle statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// The host starts the first round.
    StartGame,
    /// The drawer picked the secret word.
    WordChosen,
    /// A correct guess closed the round; `last_round` when it was the final one.
    RoundWon { last_round: bool },
    /// The drawer let the selection countdown expire.
    SelectionTimedOut { last_round: bool },
    /// Scores and rounds are wiped and the room returns to the lobby.
    Restart,
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The status the room was in when the event was received.
    pub from: RoomStatus,
    /// The rejected event.
    pub event: RoomEvent,
}

/// Compute the status reached by applying `event` in `from`.
///
/// Statuses only move forward (`waiting → word-selection ⇄ playing → ended`);
/// [`RoomEvent::Restart`] is the single way back to `waiting`.
pub fn next_status(from: RoomStatus, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
    let next = match (from, event) {
        (RoomStatus::Waiting, RoomEvent::StartGame) => RoomStatus::WordSelection,
        (RoomStatus::WordSelection, RoomEvent::WordChosen) => RoomStatus::Playing,
        (RoomStatus::Playing, RoomEvent::RoundWon { last_round: false }) => {
            RoomStatus::WordSelection
        }
        (RoomStatus::WordSelection, RoomEvent::SelectionTimedOut { last_round: false }) => {
            RoomStatus::WordSelection
        }
        (RoomStatus::Playing, RoomEvent::RoundWon { last_round: true })
        | (RoomStatus::WordSelection, RoomEvent::SelectionTimedOut { last_round: true }) => {
            RoomStatus::Ended
        }
        (_, RoomEvent::Restart) => RoomStatus::Waiting,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_game_path() {
        let mut status = RoomStatus::Waiting;
        for event in [
            RoomEvent::StartGame,
            RoomEvent::WordChosen,
            RoomEvent::RoundWon { last_round: false },
            RoomEvent::SelectionTimedOut { last_round: false },
            RoomEvent::WordChosen,
            RoomEvent::RoundWon { last_round: true },
        ] {
            status = next_status(status, event).unwrap();
        }
        assert_eq!(status, RoomStatus::Ended);
    }

    #[test]
    fn selection_timeout_on_last_round_ends_the_game() {
        assert_eq!(
            next_status(
                RoomStatus::WordSelection,
                RoomEvent::SelectionTimedOut { last_round: true }
            ),
            Ok(RoomStatus::Ended)
        );
    }

    #[test]
    fn restart_is_accepted_from_every_status() {
        for from in [
            RoomStatus::Waiting,
            RoomStatus::WordSelection,
            RoomStatus::Playing,
            RoomStatus::Ended,
        ] {
            assert_eq!(
                next_status(from, RoomEvent::Restart),
                Ok(RoomStatus::Waiting)
            );
        }
    }

    #[test]
    fn ended_is_terminal() {
        for event in [
            RoomEvent::StartGame,
            RoomEvent::WordChosen,
            RoomEvent::RoundWon { last_round: false },
            RoomEvent::SelectionTimedOut { last_round: false },
        ] {
            let err = next_status(RoomStatus::Ended, event).unwrap_err();
            assert_eq!(err.from, RoomStatus::Ended);
            assert_eq!(err.event, event);
        }
    }

    #[test]
    fn guesses_cannot_win_during_selection() {
        assert!(
            next_status(
                RoomStatus::WordSelection,
                RoomEvent::RoundWon { last_round: false }
            )
            .is_err()
        );
        assert!(next_status(RoomStatus::Playing, RoomEvent::WordChosen).is_err());
        assert!(next_status(RoomStatus::Playing, RoomEvent::StartGame).is_err());
    }
}
