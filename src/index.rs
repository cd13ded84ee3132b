use axum::{debug_handler, response::Redirect};
use tower_sessions::Session;

use crate::{auth, AppResult};

#[debug_handler]
pub async fn index(
    session: Session
) -> AppResult<Redirect> {
    Ok(match auth::current_user(&session).await? {
        Some(_) => Redirect::to("/lobby"),
        None => Redirect::to("/login"),
    })
}
