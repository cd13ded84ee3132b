use axum::{debug_handler, response::Redirect};
use tower_sessions::Session;

use crate::AppResult;

use super::current_user;

#[debug_handler]
pub(crate) async fn logout(
    session: Session
) -> AppResult<Redirect> {
    if let Some(user) = current_user(&session).await? {
        tracing::info!(user_id = %user.id, "signed out");
    }
    session.flush().await?;
    Ok(Redirect::to("/login"))
}
