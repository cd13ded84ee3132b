pub mod directory;
mod page;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub(crate) use page::lobby_error;
pub(crate) use ws::error_frame;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(page::lobby))
        .route("/ws", get(ws::lobby_ws))
        .route("/rooms", post(page::new_room))
        .route("/rooms/{uuid}/delete", post(page::delete_room))
}
