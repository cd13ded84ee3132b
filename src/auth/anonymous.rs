use axum::{debug_handler, extract::State, response::Redirect};
use tower_sessions::Session;

use crate::{session::RETURN_URL, AppResult, AppState};

use super::{firebase, login_error_url, sign_in, Clients};

#[debug_handler(state = AppState)]
pub(crate) async fn anonymous(
    State(clients): State<Clients>,
    session: Session,
) -> Redirect {
    match sign_up(&clients, &session).await {
        Ok(return_url) => Redirect::to(&return_url),
        Err(e) => {
            tracing::warn!(error = %e, "anonymous sign-in failed");
            Redirect::to(&login_error_url(&format!("Anonymous sign-in failed: {e}")))
        }
    }
}

async fn sign_up(clients: &Clients, session: &Session) -> AppResult<String> {
    let http_client = reqwest::Client::new();
    let user = firebase::sign_up_anonymous(&http_client, clients).await?;
    let return_url = session.remove::<String>(RETURN_URL).await?;
    sign_in(session, user).await?;
    Ok(return_url.unwrap_or("/lobby".to_string()))
}
