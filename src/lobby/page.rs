use axum::{debug_handler, extract::{Path, Query, State}, response::{Html, IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{auth::{self, User}, include_res, res, store::Store, AppResult};

use super::directory::{self, Room, ROOMS_LIMIT};

#[derive(Deserialize)]
pub(crate) struct LobbyQuery {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomForm {
    name: String,
    #[serde(default)]
    password: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn lobby(
    State(store): State<Store>,
    Query(LobbyQuery { error }): Query<LobbyQuery>,
    session: Session,
) -> AppResult<Response> {
    let Some(user) = auth::current_user(&session).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let rooms = store.subscribe_rooms().next().await.unwrap_or_else(|| Ok(Vec::new()))?;
    let limit_reached = directory::limit_reached(&rooms);

    let alert = error
        .map(|error| format!(r#"<p class="error" role="alert">{}</p>"#, res::escape(&error)))
        .unwrap_or_default();

    Ok(Html(res::fill(
        include_res!(str, "/pages/lobby.html"),
        &[
            ("alert", &alert),
            ("name", &res::escape(user.name_or_anonymous())),
            ("limit", &ROOMS_LIMIT.to_string()),
            ("form_hidden", if limit_reached { "hidden" } else { "" }),
            ("notice_hidden", if limit_reached { "" } else { "hidden" }),
            ("room_items", &room_items(&directory::filter(&rooms, ""), &user)),
        ],
    ))
    .into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room(
    State(store): State<Store>,
    session: Session,

    Form(NewRoomForm { name, password }): Form<NewRoomForm>,
) -> AppResult<Response> {
    let Some(user) = auth::current_user(&session).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    if let Err(e) = store.create_room(&name, Some(&password), &user).await {
        tracing::warn!(error = %e, "could not create room");
        return Ok(lobby_error(&format!("Could not create the room: {e}")).into_response());
    }

    Ok(Redirect::to("/lobby").into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_room(
    State(store): State<Store>,
    session: Session,
    Path(room_id): Path<Uuid>,
) -> AppResult<Response> {
    let Some(user) = auth::current_user(&session).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    if let Err(e) = store.delete_room(room_id, &user).await {
        tracing::warn!(%room_id, error = %e, "could not delete room");
        return Ok(lobby_error(&format!("Could not delete the room: {e}")).into_response());
    }

    Ok(Redirect::to("/lobby").into_response())
}

pub(crate) fn lobby_error(message: &str) -> Redirect {
    let message: String = oauth2::url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    Redirect::to(&format!("/lobby?error={message}"))
}

pub(crate) fn room_items(rooms: &[&Room], user: &User) -> String {
    if rooms.is_empty() {
        return include_res!(str, "/pages/lobby/no_rooms.html").to_owned();
    }

    rooms
        .iter()
        .map(|room| {
            let lock = if room.is_locked() {
                include_res!(str, "/pages/lobby/lock.html")
            } else {
                ""
            };
            let id = room.id.to_string();
            let delete = if room.created_by == user.id {
                res::fill(include_res!(str, "/pages/lobby/delete_room.html"), &[("id", &id)])
            } else {
                String::new()
            };
            res::fill(
                include_res!(str, "/pages/lobby/room_item.html"),
                &[("lock", lock), ("delete", &delete), ("id", &id), ("name", &res::escape(&room.name))],
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(name: &str, created_by: &str, password: Option<&str>) -> Room {
        Room {
            id: Uuid::now_v7(),
            name: name.into(),
            created_by: created_by.into(),
            created_at: 0,
            password: password.map(str::to_owned),
        }
    }

    fn user(id: &str) -> User {
        User { id: id.into(), display_name: None, photo_url: None }
    }

    #[test]
    fn delete_only_offered_to_creator() {
        let mine = room("mine", "ada", None);
        let theirs = room("theirs", "bob", Some("pw"));
        let html = room_items(&[&mine, &theirs], &user("ada"));

        assert!(html.contains(&format!("/lobby/rooms/{}/delete", mine.id)));
        assert!(!html.contains(&format!("/lobby/rooms/{}/delete", theirs.id)));
        assert!(html.contains(&format!("/room/{}", theirs.id)));
        assert_eq!(html.matches("🔒").count(), 1);
    }

    #[test]
    fn names_are_escaped() {
        let html = room_items(&[&room("<img src=x>", "bob", None)], &user("ada"));
        assert!(html.contains("&lt;img src=x&gt;"));
        assert!(!html.contains("<img src=x>"));
    }

    #[test]
    fn room_names_cannot_inject_template_fields() {
        let sneaky = room("{delete}{lock}/room/{id}", "bob", None);
        let html = room_items(&[&sneaky], &user("ada"));
        assert!(html.contains("<span>{delete}{lock}/room/{id}</span>"));
        assert!(!html.contains("/delete"));
        assert!(!html.contains("🔒"));
    }

    #[test]
    fn empty_list_says_so() {
        assert!(room_items(&[], &user("ada")).contains("No rooms were found."));
    }
}
