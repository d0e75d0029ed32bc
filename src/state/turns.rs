//! Drawer rotation and round advancement.

use std::time::Duration;

use thiserror::Error;

use crate::{
    dao::models::{PlayerEntity, RoomEntity, RoundEntity},
    state::state_machine::{InvalidTransition, RoomEvent, next_status},
};

/// Why the current round is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceCause {
    /// A guesser found the secret word.
    Guessed,
    /// The drawer did not pick a word in time.
    SelectionTimedOut,
}

/// Failures while planning the next round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    /// The room status does not allow the advance.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    /// Nobody to hand the turn to.
    #[error("room has no players")]
    NoPlayers,
    /// The round's drawer left the player list.
    #[error("drawer `{0}` is not a player of the room")]
    UnknownDrawer(String),
    /// The round passed in is not the room's current one.
    #[error("round {round} does not match the room's current round {current}")]
    RoundMismatch {
        /// Round number passed in.
        round: u32,
        /// Room's current round.
        current: u32,
    },
}

/// Next drawer after `current` in join order, wrapping around.
pub fn next_drawer<'a>(
    players: &'a [PlayerEntity],
    current: &str,
) -> Result<&'a PlayerEntity, TurnError> {
    if players.is_empty() {
        return Err(TurnError::NoPlayers);
    }
    let index = players
        .iter()
        .position(|player| player.id == current)
        .ok_or_else(|| TurnError::UnknownDrawer(current.to_owned()))?;
    Ok(&players[(index + 1) % players.len()])
}

/// Create round `number` drawn by `drawer`, waiting for a word.
pub fn new_round(number: u32, drawer_id: &str, now_ms: u64, selection: Duration) -> RoundEntity {
    RoundEntity {
        number,
        drawer_id: drawer_id.to_owned(),
        secret_word: String::new(),
        started_at_ms: now_ms,
        selection_deadline_ms: now_ms.saturating_add(selection.as_millis() as u64),
    }
}

/// Apply the end of `current` to `room`, returning the round to create, if any.
///
/// On the last round the room ends and no round is returned. Otherwise the
/// round counter moves by exactly one and the next player in join order draws.
pub fn plan_advance(
    room: &mut RoomEntity,
    current: &RoundEntity,
    cause: AdvanceCause,
    now_ms: u64,
    selection: Duration,
) -> Result<Option<RoundEntity>, TurnError> {
    if current.number != room.current_round {
        return Err(TurnError::RoundMismatch {
            round: current.number,
            current: room.current_round,
        });
    }

    let last_round = room.current_round >= room.max_rounds;
    let event = match cause {
        AdvanceCause::Guessed => RoomEvent::RoundWon { last_round },
        AdvanceCause::SelectionTimedOut => RoomEvent::SelectionTimedOut { last_round },
    };
    let status = next_status(room.status, event)?;

    if last_round {
        room.status = status;
        return Ok(None);
    }

    let players = room.players_by_join_time();
    let drawer = next_drawer(&players, &current.drawer_id)?;
    let next = new_round(room.current_round + 1, &drawer.id, now_ms, selection);

    room.status = status;
    room.current_round = next.number;
    Ok(Some(next))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::dao::models::RoomStatus;

    fn player(id: &str, joined_at_ms: u64) -> PlayerEntity {
        PlayerEntity {
            id: id.into(),
            name: id.to_uppercase(),
            score: 0,
            joined_at_ms,
        }
    }

    fn room(players: Vec<PlayerEntity>, max_rounds: u32) -> RoomEntity {
        RoomEntity {
            id: Uuid::new_v4(),
            code: "AB12".into(),
            host_id: players[0].id.clone(),
            status: RoomStatus::WordSelection,
            current_round: 1,
            max_rounds,
            players,
            created_at_ms: 0,
            version: 0,
        }
    }

    #[test]
    fn rotation_wraps_around() {
        let players = vec![player("a", 1), player("b", 2), player("c", 3)];
        assert_eq!(next_drawer(&players, "a").unwrap().id, "b");
        assert_eq!(next_drawer(&players, "c").unwrap().id, "a");
        assert_eq!(
            next_drawer(&players, "z").unwrap_err(),
            TurnError::UnknownDrawer("z".into())
        );
        assert_eq!(next_drawer(&[], "a").unwrap_err(), TurnError::NoPlayers);
    }

    #[test]
    fn n_advances_return_to_first_drawer() {
        let players = vec![
            player("a", 1),
            player("b", 2),
            player("c", 3),
            player("d", 4),
        ];
        let mut room = room(players.clone(), 15);
        let mut round = new_round(1, "a", 0, Duration::from_secs(20));
        let mut drawers = vec![round.drawer_id.clone()];

        for _ in 0..players.len() {
            round = plan_advance(
                &mut room,
                &round,
                AdvanceCause::SelectionTimedOut,
                0,
                Duration::from_secs(20),
            )
            .unwrap()
            .unwrap();
            drawers.push(round.drawer_id.clone());
        }

        assert_eq!(drawers, ["a", "b", "c", "d", "a"]);
        assert_eq!(room.current_round, 5);
    }

    #[test]
    fn rotation_follows_join_time_not_vector_order() {
        let mut room = room(vec![player("late", 20), player("early", 10)], 5);
        let round = new_round(1, "early", 0, Duration::from_secs(20));
        let next = plan_advance(
            &mut room,
            &round,
            AdvanceCause::SelectionTimedOut,
            0,
            Duration::from_secs(20),
        )
        .unwrap()
        .unwrap();
        assert_eq!(next.drawer_id, "late");
    }

    #[test]
    fn guessed_round_opens_next_selection() {
        let mut room = room(vec![player("a", 1), player("b", 2)], 3);
        room.status = RoomStatus::Playing;
        let round = new_round(1, "a", 0, Duration::from_secs(20));

        let next = plan_advance(
            &mut room,
            &round,
            AdvanceCause::Guessed,
            1_000,
            Duration::from_secs(20),
        )
        .unwrap()
        .unwrap();

        assert_eq!(room.status, RoomStatus::WordSelection);
        assert_eq!(room.current_round, 2);
        assert_eq!(next.number, 2);
        assert_eq!(next.drawer_id, "b");
        assert!(next.is_pending_selection());
        assert_eq!(next.selection_deadline_ms, 21_000);
    }

    #[test]
    fn last_round_ends_without_new_round() {
        let mut room = room(vec![player("a", 1), player("b", 2)], 1);
        let round = new_round(1, "a", 0, Duration::from_secs(20));

        let next = plan_advance(
            &mut room,
            &round,
            AdvanceCause::SelectionTimedOut,
            0,
            Duration::from_secs(20),
        )
        .unwrap();

        assert!(next.is_none());
        assert_eq!(room.status, RoomStatus::Ended);
        assert_eq!(room.current_round, 1);
    }

    #[test]
    fn stale_round_is_rejected() {
        let mut room = room(vec![player("a", 1), player("b", 2)], 5);
        room.current_round = 2;
        let stale = new_round(1, "a", 0, Duration::from_secs(20));
        assert_eq!(
            plan_advance(
                &mut room,
                &stale,
                AdvanceCause::SelectionTimedOut,
                0,
                Duration::from_secs(20)
            )
            .unwrap_err(),
            TurnError::RoundMismatch {
                round: 1,
                current: 2
            }
        );
    }
}
