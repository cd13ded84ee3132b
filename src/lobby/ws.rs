use axum::{debug_handler, extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade}, response::{IntoResponse, Response}};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;

use crate::{auth::{self, User}, store::Store, AppError, AppResult};

use super::{directory::{self, Room}, page::room_items};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LobbyCommand {
    Filter { text: String },
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn lobby_ws(
    State(store): State<Store>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user = auth::current_user(&session).await?.ok_or(AppError::Unauthorized)?;

    Ok(ws.on_upgrade(move |socket| watch_rooms(socket, store, user)).into_response())
}

/// Pushes the room list on every change, filtered by what the browser typed.
async fn watch_rooms(mut socket: WebSocket, store: Store, user: User) {
    let mut rooms = store.subscribe_rooms();
    let mut snapshot: Vec<Room> = Vec::new();
    let mut filter_text = String::new();

    loop {
        tokio::select! {
            next = rooms.next() => {
                let Some(next) = next else { break };
                let frame = match next {
                    Ok(next) => {
                        snapshot = next;
                        rooms_frame(&snapshot, &filter_text, &user)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "room list refresh failed");
                        error_frame(&e)
                    }
                };
                if socket.send(frame).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                let Some(Ok(incoming)) = incoming else { break };
                let Message::Text(text) = incoming else { continue };
                match serde_json::from_str(text.as_str()) {
                    Ok(LobbyCommand::Filter { text }) => {
                        filter_text = text;
                        if socket.send(rooms_frame(&snapshot, &filter_text, &user)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "ignoring unreadable lobby frame"),
                }
            }
        }
    }

    rooms.unsubscribe();
    tracing::debug!(user_id = %user.id, "lobby socket closed");
}

fn rooms_frame(rooms: &[Room], filter_text: &str, user: &User) -> Message {
    let frame = json!({
        "type": "rooms",
        "html": room_items(&directory::filter(rooms, filter_text), user),
        "limit_reached": directory::limit_reached(rooms),
    });
    Message::Text(frame.to_string().into())
}

pub(crate) fn error_frame(error: &AppError) -> Message {
    Message::Text(json!({ "type": "error", "message": error.to_string() }).to_string().into())
}
