pub mod msg;
pub mod presence;
mod room;
pub mod state;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{uuid}", get(room::room))
        .route("/{uuid}/password", post(room::password))
        .route("/{uuid}/ws", get(ws::room_ws))
}
