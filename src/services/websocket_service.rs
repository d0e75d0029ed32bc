use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, RoomProjection, ServerFrame},
    services::{
        canvas_service, fanout_service,
        identity::CallerIdentity,
        scoring_service,
    },
    state::SharedState,
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle the full lifecycle of a player's room WebSocket.
pub async fn handle_socket(state: SharedState, room_id: Uuid, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(%room_id, error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(%room_id, "websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let player_id = match ClientMessage::from_json_str(&initial_message) {
        Ok(ClientMessage::Identification { player_id }) => player_id.trim().to_owned(),
        Ok(_) => {
            warn!(%room_id, "first message was not identification");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Err(err) => {
            warn!(%room_id, error = %err, "failed to parse or validate room message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let feed = match fanout_service::watch_room(&state, room_id).await {
        Ok(feed) => feed,
        Err(err) => {
            warn!(%room_id, error = %err, "cannot watch room");
            send_frame(
                &outbound_tx,
                &ServerFrame::Error {
                    message: err.to_string(),
                },
            );
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };
    info!(%room_id, player_id = %player_id, "player connected to room socket");

    let forwarder = tokio::spawn(forward_feed(
        feed,
        RoomProjection::new(Some(player_id.clone())),
        outbound_tx.clone(),
    ));
    let identity = CallerIdentity::new(player_id.clone());

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientMessage::from_json_str(&text) {
                Ok(ClientMessage::Stroke(stroke)) => {
                    let result =
                        canvas_service::add_stroke(&state, &identity, room_id, stroke.into()).await;
                    if let Err(err) = result {
                        warn!(%room_id, player_id = %player_id, error = %err, "stroke rejected");
                        send_frame(&outbound_tx, &ServerFrame::Error { message: err.to_string() });
                    }
                }
                Ok(ClientMessage::Guess(guess)) => {
                    let result =
                        scoring_service::submit_guess(&state, &identity, room_id, &guess.text).await;
                    if let Err(err) = result {
                        warn!(%room_id, player_id = %player_id, error = %err, "guess rejected");
                        send_frame(&outbound_tx, &ServerFrame::Error { message: err.to_string() });
                    }
                }
                Ok(ClientMessage::Identification { .. }) => {
                    warn!(%room_id, player_id = %player_id, "ignoring duplicate identification message");
                }
                Ok(ClientMessage::Unknown) => {
                    warn!(%room_id, player_id = %player_id, "ignoring unknown message type");
                }
                Err(err) => {
                    warn!(%room_id, player_id = %player_id, error = %err, "failed to parse or validate room message");
                    send_frame(&outbound_tx, &ServerFrame::Error { message: err.to_string() });
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%room_id, player_id = %player_id, error = %err, "websocket error");
                break;
            }
        }
    }

    forwarder.abort();
    info!(%room_id, player_id = %player_id, "player left room socket");
    finalize(writer_task, outbound_tx).await;
}

/// Push every snapshot to the socket, then the room-closed frame and a close.
async fn forward_feed(
    mut feed: fanout_service::RoomFeed,
    mut projection: RoomProjection,
    outbound_tx: mpsc::UnboundedSender<Message>,
) {
    while let Some(update) = feed.updates.recv().await {
        if !send_frame(&outbound_tx, &projection.frame(update)) {
            return;
        }
    }
    if let Ok(closed) = feed.closed.await {
        send_frame(&outbound_tx, &RoomProjection::closed(closed));
        let _ = outbound_tx.send(Message::Close(None));
    }
}

/// Serialize a frame onto the writer channel, returning `false` once the writer is gone.
fn send_frame(tx: &mpsc::UnboundedSender<Message>, frame: &ServerFrame) -> bool {
    let payload = match serde_json::to_string(frame) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize frame `{frame:?}`");
            return true;
        }
    };
    tx.send(Message::Text(payload.into())).is_ok()
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
