//! Identity lives with Firebase Authentication; we only keep the signed-in
//! user in the cookie session.

mod anonymous;
mod clients;
mod firebase;
mod login;
mod lockin;
mod logout;

use axum::{routing::{get, post}, Router};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{session::USER, AppResult, AppState};

pub use clients::{ClientProvider, Clients};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl User {
    pub fn name_or_anonymous(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => "Anonymous",
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page))
        .route("/login/anonymous", post(anonymous::anonymous))
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}

pub async fn current_user(session: &Session) -> AppResult<Option<User>> {
    Ok(session.get::<User>(USER).await?)
}

pub(crate) async fn sign_in(session: &Session, user: User) -> AppResult<()> {
    // fresh id on privilege change
    session.cycle_id().await?;
    session.insert(USER, &user).await?;
    tracing::info!(user_id = %user.id, name = user.name_or_anonymous(), "signed in");
    Ok(())
}

/// Login page url carrying an error to show.
pub(crate) fn login_error_url(message: &str) -> String {
    format!("/login?error={}", oauth2::url::form_urlencoded::byte_serialize(message.as_bytes()).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_fallback() {
        let mut user = User { id: "u1".into(), display_name: None, photo_url: None };
        assert_eq!(user.name_or_anonymous(), "Anonymous");
        user.display_name = Some("  ".into());
        assert_eq!(user.name_or_anonymous(), "Anonymous");
        user.display_name = Some("Ada".into());
        assert_eq!(user.name_or_anonymous(), "Ada");
    }

    #[test]
    fn login_error_is_url_encoded() {
        assert_eq!(login_error_url("popup closed & gone"), "/login?error=popup+closed+%26+gone");
    }
}
