use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        sse::ServerEvent,
        ws::{RoomProjection, ServerFrame},
    },
    error::ServiceError,
    services::fanout_service::{self, RoomFeed},
    state::SharedState,
};

/// Subscribe to the snapshots of `room_id` as seen by `viewer`.
pub async fn subscribe_room(
    state: &SharedState,
    room_id: Uuid,
    viewer: Option<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let feed = fanout_service::watch_room(state, room_id).await?;
    info!(%room_id, "room SSE stream connected");
    Ok(to_sse_stream(room_id, feed, viewer))
}

fn to_event(frame: &ServerFrame) -> Option<Event> {
    match frame.to_server_event() {
        Ok(ServerEvent { event, data }) => {
            let mut sse = Event::default().data(data);
            if let Some(name) = event {
                sse = sse.event(name);
            }
            Some(sse)
        }
        Err(err) => {
            warn!(error = %err, event = frame.event_name(), "failed to serialize room event");
            None
        }
    }
}

/// Forward a room feed into an SSE response; the room-closed notification is
/// the last event of the stream.
fn to_sse_stream(
    room_id: Uuid,
    mut feed: RoomFeed,
    viewer: Option<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut projection = RoomProjection::new(viewer);
        loop {
            let frame = tokio::select! {
                _ = tx.closed() => break,
                update = feed.updates.recv() => match update {
                    Some(update) => projection.frame(update),
                    // The watcher reports a closed room before dropping the feed.
                    None => match feed.closed.try_recv() {
                        Ok(closed) => RoomProjection::closed(closed),
                        Err(_) => break,
                    },
                },
                closed = &mut feed.closed => match closed {
                    Ok(closed) => RoomProjection::closed(closed),
                    Err(_) => break,
                },
            };
            let last = matches!(frame, ServerFrame::RoomClosed(_));
            if let Some(event) = to_event(&frame) {
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
            if last {
                break;
            }
        }
        info!(%room_id, "room SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
