//! Background skip of word selections whose deadline passed with nobody connected.

use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    dao::models::{RoomStatus, now_ms},
    error::ServiceError,
    services::turn_service,
    state::SharedState,
};

/// Periodically skip every expired word selection.
pub async fn run(state: SharedState, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match sweep_once(&state, now_ms()).await {
            Ok(0) => {}
            Ok(skipped) => info!(skipped, "expired word selections skipped"),
            Err(ServiceError::Degraded) => debug!("deadline sweep paused while degraded"),
            Err(err) => warn!(error = %err, "deadline sweep failed"),
        }
    }
}

/// Skip the selections expired at `now`, returning how many rounds moved.
pub async fn sweep_once(state: &SharedState, now: u64) -> Result<usize, ServiceError> {
    let store = state.require_room_store().await?;
    let rooms = store.list_rooms_by_status(RoomStatus::WordSelection).await?;

    let mut skipped = 0;
    for room in rooms {
        let Some(round) = store.find_round(room.id, room.current_round).await? else {
            continue;
        };
        if !round.is_pending_selection() || !round.selection_expired(now) {
            continue;
        }
        match turn_service::skip_word_selection_at(state, room.id, round.number, now).await {
            Ok(true) => skipped += 1,
            Ok(false) => {}
            Err(err) => warn!(room_id = %room.id, round = round.number, error = %err, "could not skip expired selection"),
        }
    }
    Ok(skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lobby_service::{
        start_game,
        tests::{memory_state, room_with, who},
    };

    #[tokio::test]
    async fn sweep_skips_only_expired_selections() {
        let state = memory_state().await;
        let room_id = room_with(&state, &["a", "b"], 3).await;
        start_game(&state, &who("a"), room_id).await.unwrap();

        let store = state.require_room_store().await.unwrap();
        let deadline = store
            .find_round(room_id, 1)
            .await
            .unwrap()
            .unwrap()
            .selection_deadline_ms;

        assert_eq!(sweep_once(&state, deadline - 1).await.unwrap(), 0);
        assert_eq!(sweep_once(&state, deadline).await.unwrap(), 1);
        assert_eq!(sweep_once(&state, deadline).await.unwrap(), 0);

        let room = store.find_room(room_id).await.unwrap().unwrap();
        assert_eq!(room.current_round, 2);
        assert_eq!(room.status, RoomStatus::WordSelection);
    }
}
