use axum::{debug_handler, extract::{Path, State}, http::StatusCode, response::{Html, IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{auth::{self, User}, include_res, lobby, res, session::room_password, store::Store, AppResult};

use super::state::{RoomSession, SessionState};

#[derive(Deserialize)]
pub(crate) struct PasswordForm {
    password: String,
}

/// Resolves the room and replays a password typed earlier in this browser session.
pub(crate) async fn enter(store: Store, session: &Session, room_id: Uuid, user: User) -> AppResult<RoomSession> {
    let mut visit = RoomSession::new(store, room_id, user);

    if visit.resolve().await? == &SessionState::PasswordPrompt {
        if let Some(input) = session.get::<String>(&room_password(&room_id)).await? {
            if visit.submit_password(&input) == &SessionState::Denied {
                session.remove::<String>(&room_password(&room_id)).await?;
            }
        }
    }

    Ok(visit)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    State(store): State<Store>,
    session: Session,
    Path(room_id): Path<Uuid>,
) -> AppResult<Response> {
    let Some(user) = auth::current_user(&session).await? else {
        return Ok(Redirect::to(&format!("/login?return_url=/room/{room_id}")).into_response());
    };

    let visit = enter(store, &session, room_id, user).await?;

    match visit.state() {
        SessionState::Failed(reason) => {
            tracing::debug!(%room_id, reason, "room not available");
            Ok((StatusCode::NOT_FOUND, Html(res::sorry("room"))).into_response())
        }
        SessionState::PasswordPrompt => {
            let name = visit.room().map(|room| room.name.as_str()).unwrap_or_default();
            Ok(Html(res::fill(
                include_res!(str, "/pages/rooms/password.html"),
                &[("room_id", &room_id.to_string()), ("room_name", &res::escape(name))],
            ))
            .into_response())
        }
        SessionState::Denied => Ok(lobby::lobby_error("Incorrect password").into_response()),
        _ => {
            let name = visit.room().map(|room| room.name.as_str()).unwrap_or_default();
            Ok(Html(res::fill(
                include_res!(str, "/pages/rooms/room.html"),
                &[("room_id", &room_id.to_string()), ("room_name", &res::escape(name))],
            ))
            .into_response())
        }
    }
}

#[debug_handler]
pub(crate) async fn password(
    session: Session,
    Path(room_id): Path<Uuid>,
    Form(PasswordForm { password }): Form<PasswordForm>,
) -> AppResult<Redirect> {
    session.insert(&room_password(&room_id), password).await?;
    Ok(Redirect::to(&format!("/room/{room_id}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn user(id: &str) -> User {
        User { id: id.into(), display_name: None, photo_url: None }
    }

    fn browser_session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn wrong_remembered_password_is_forgotten() {
        let store = Store::in_memory().await.unwrap();
        let room = store.create_room("vault", Some("pw"), &user("ada")).await.unwrap().unwrap();
        let session = browser_session();
        let key = room_password(&room.id);

        session.insert(&key, "guess".to_owned()).await.unwrap();
        let visit = enter(store.clone(), &session, room.id, user("eve")).await.unwrap();
        assert_eq!(visit.state(), &SessionState::Denied);
        assert_eq!(session.get::<String>(&key).await.unwrap(), None);

        // nothing remembered now, so the next visit is asked again
        let visit = enter(store, &session, room.id, user("eve")).await.unwrap();
        assert_eq!(visit.state(), &SessionState::PasswordPrompt);
    }

    #[tokio::test]
    async fn right_remembered_password_is_kept() {
        let store = Store::in_memory().await.unwrap();
        let room = store.create_room("vault", Some("pw"), &user("ada")).await.unwrap().unwrap();
        let session = browser_session();
        let key = room_password(&room.id);

        session.insert(&key, "pw".to_owned()).await.unwrap();
        let visit = enter(store, &session, room.id, user("bob")).await.unwrap();
        assert_eq!(visit.state(), &SessionState::Granted);
        assert_eq!(session.get::<String>(&key).await.unwrap().as_deref(), Some("pw"));
    }

    #[tokio::test]
    async fn open_room_ignores_remembered_input() {
        let store = Store::in_memory().await.unwrap();
        let room = store.create_room("lounge", None, &user("ada")).await.unwrap().unwrap();
        let session = browser_session();

        session.insert(&room_password(&room.id), "stale".to_owned()).await.unwrap();
        let visit = enter(store, &session, room.id, user("bob")).await.unwrap();
        assert_eq!(visit.state(), &SessionState::Granted);
    }
}
