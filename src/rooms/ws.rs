use axum::{debug_handler, extract::{ws::{Message, WebSocket}, Path, State, WebSocketUpgrade}, response::{IntoResponse, Response}};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{auth, lobby::error_frame, store::Store, AppError, AppResult};

use super::{msg::message_list, presence::presence_list, room::enter, state::{RoomSession, SessionEvent, SessionState}};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RoomCommand {
    Send { text: String },
    Delete { id: Uuid },
}

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    Path(room_id): Path<Uuid>,
    State(store): State<Store>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user = auth::current_user(&session).await?.ok_or(AppError::Unauthorized)?;

    let visit = enter(store, &session, room_id, user).await?;
    match visit.state() {
        SessionState::Granted => {}
        SessionState::Failed(_) => return Err(AppError::NotFound("room")),
        _ => return Err(AppError::Forbidden("room is locked")),
    }

    Ok(ws.on_upgrade(move |socket| run_session(socket, visit)).into_response())
}

/// The socket's lifetime is the visit's lifetime.
async fn run_session(mut socket: WebSocket, mut visit: RoomSession) {
    if let Err(e) = visit.activate().await {
        tracing::warn!(error = %e, "could not enter room");
        let _ = socket.send(error_frame(&e)).await;
        return;
    }
    tracing::info!(user_id = %visit.user().id, room = ?visit.room().map(|r| r.id), "joined room");

    loop {
        tokio::select! {
            event = visit.next_event() => {
                let Some(event) = event else { break };
                if socket.send(event_frame(event, &visit)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                let Some(Ok(incoming)) = incoming else { break };
                let Message::Text(text) = incoming else { continue };

                let result = match serde_json::from_str::<RoomCommand>(text.as_str()) {
                    Ok(RoomCommand::Send { text }) => visit.send(&text).await.map(|_| ()),
                    Ok(RoomCommand::Delete { id }) => visit.delete(id).await,
                    Err(e) => Err(e.into()),
                };

                if let Err(e) = result {
                    tracing::warn!(user_id = %visit.user().id, error = %e, "room command failed");
                    if socket.send(error_frame(&e)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = visit.close().await {
        tracing::warn!(error = %e, "could not leave room cleanly");
    }
    tracing::info!(user_id = %visit.user().id, "left room");
}

fn event_frame(event: SessionEvent, visit: &RoomSession) -> Message {
    let frame = match event {
        SessionEvent::Presence(Ok(entries)) => json!({
            "type": "presence",
            "count": entries.len(),
            "html": presence_list(&entries),
        }),
        SessionEvent::Messages(Ok(msgs)) => json!({
            "type": "messages",
            "html": message_list(&msgs, visit.user()),
        }),
        SessionEvent::Presence(Err(e)) | SessionEvent::Messages(Err(e)) => {
            tracing::warn!(error = %e, "live query failed");
            return error_frame(&e);
        }
    };
    Message::Text(frame.to_string().into())
}
