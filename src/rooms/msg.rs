use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::User,
    include_res, res,
    store::{now_millis, parse_id, LiveQuery, Store, Subscription, Topic},
    AppError, AppResult,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub id: String,
    pub name: Option<String>,
    pub photo: Option<String>,
}

impl From<&User> for Author {
    fn from(user: &User) -> Self {
        Author {
            id: user.id.clone(),
            name: user.display_name.clone(),
            photo: user.photo_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub text: String,
    pub created_at: i64,
    pub deleted: bool,
    pub user: Author,
}

type MessageRow = (String, String, i64, bool, String, Option<String>, Option<String>);

fn message_from_row((id, text, created_at, deleted, user_id, user_name, user_photo): MessageRow) -> AppResult<Message> {
    Ok(Message {
        id: parse_id(&id)?,
        text,
        created_at,
        deleted,
        user: Author { id: user_id, name: user_name, photo: user_photo },
    })
}

/// A room's messages, oldest first.
pub struct MessagesQuery {
    pub room_id: Uuid,
}

impl LiveQuery for MessagesQuery {
    type Snapshot = Vec<Message>;

    fn topic(&self) -> Topic {
        Topic::Messages(self.room_id)
    }

    async fn load(&self, store: &Store) -> AppResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id,text,created_at,deleted,user_id,user_name,user_photo FROM messages
             WHERE room_id=? ORDER BY created_at, rowid",
        )
        .bind(self.room_id.to_string())
        .fetch_all(&store.db_pool)
        .await?;
        rows.into_iter().map(message_from_row).collect()
    }
}

impl Store {
    pub fn subscribe_messages(&self, room_id: Uuid) -> Subscription<MessagesQuery> {
        self.subscribe(MessagesQuery { room_id })
    }

    /// Appends a message. `Ok(None)` for blank text or nobody signed in.
    pub async fn send_message(&self, room_id: Uuid, author: Option<&User>, text: &str) -> AppResult<Option<Message>> {
        let text = text.trim();
        let Some(author) = author else {
            return Ok(None);
        };
        if text.is_empty() {
            return Ok(None);
        }

        let msg = Message {
            id: Uuid::now_v7(),
            text: text.to_owned(),
            created_at: now_millis(),
            deleted: false,
            user: author.into(),
        };

        sqlx::query(
            "INSERT INTO messages (id,room_id,text,created_at,deleted,user_id,user_name,user_photo)
             VALUES (?,?,?,?,FALSE,?,?,?)",
        )
        .bind(msg.id.to_string())
        .bind(room_id.to_string())
        .bind(&msg.text)
        .bind(msg.created_at)
        .bind(&msg.user.id)
        .bind(&msg.user.name)
        .bind(&msg.user.photo)
        .execute(&self.db_pool)
        .await?;
        self.publish(Topic::Messages(room_id));

        Ok(Some(msg))
    }

    /// Flags a message as deleted. Only its author may do so.
    pub async fn soft_delete_message(&self, room_id: Uuid, message_id: Uuid, requester: &User) -> AppResult<()> {
        let author: Option<(String,)> = sqlx::query_as("SELECT user_id FROM messages WHERE id=? AND room_id=?")
            .bind(message_id.to_string())
            .bind(room_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;

        match author {
            None => return Err(AppError::NotFound("message")),
            Some((author,)) if author != requester.id => {
                return Err(AppError::Forbidden("only the author can delete a message"));
            }
            Some(_) => {}
        }

        sqlx::query("UPDATE messages SET deleted=TRUE WHERE id=? AND room_id=?")
            .bind(message_id.to_string())
            .bind(room_id.to_string())
            .execute(&self.db_pool)
            .await?;
        self.publish(Topic::Messages(room_id));

        tracing::debug!(%room_id, %message_id, "message deleted");
        Ok(())
    }
}

pub(crate) fn msg_to_html(msg: &Message, viewer: &User) -> String {
    let name = res::escape(msg.user.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("Anonymous"));

    let avatar = match &msg.user.photo {
        Some(photo) => res::fill(
            include_res!(str, "/pages/rooms/avatar_photo.html"),
            &[("photo", &res::escape(photo)), ("name", &name)],
        ),
        None => {
            let letter = msg.user.name.as_deref().and_then(|n| n.chars().next()).unwrap_or('A');
            res::fill(
                include_res!(str, "/pages/rooms/avatar_letter.html"),
                &[("letter", &res::escape(&letter.to_string()))],
            )
        }
    };

    let body = if msg.deleted {
        include_res!(str, "/pages/rooms/tombstone.html").to_owned()
    } else {
        res::fill(
            include_res!(str, "/pages/rooms/text.html"),
            &[("name", &name), ("content", &res::markdown(&msg.text))],
        )
    };

    let delete = if !msg.deleted && msg.user.id == viewer.id {
        include_res!(str, "/pages/rooms/delete_message.html")
    } else {
        ""
    };

    // the delete button carries its own {id}, so it is filled before the outer template
    let id = msg.id.to_string();
    let delete = res::fill(delete, &[("id", &id)]);
    res::fill(
        include_res!(str, "/pages/rooms/message.html"),
        &[("delete", &delete), ("id", &id), ("avatar", &avatar), ("body", &body)],
    )
}

pub(crate) fn message_list(msgs: &[Message], viewer: &User) -> String {
    if msgs.is_empty() {
        return include_res!(str, "/pages/rooms/no_messages.html").to_owned();
    }
    msgs.iter().map(|msg| msg_to_html(msg, viewer)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: Option<&str>) -> User {
        User { id: id.into(), display_name: name.map(str::to_owned), photo_url: None }
    }

    async fn room_with(store: &Store, owner: &User) -> Uuid {
        store.create_room("general", None, owner).await.unwrap().unwrap().id
    }

    #[tokio::test]
    async fn blank_text_is_a_noop() {
        let store = Store::in_memory().await.unwrap();
        let ada = user("ada", Some("Ada"));
        let room_id = room_with(&store, &ada).await;

        assert_eq!(store.send_message(room_id, Some(&ada), "  \n\t ").await.unwrap(), None);
        assert_eq!(store.send_message(room_id, None, "hello").await.unwrap(), None);
        assert!(store.subscribe_messages(room_id).next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn messages_keep_send_order_and_trimmed_text() {
        let store = Store::in_memory().await.unwrap();
        let ada = user("ada", Some("Ada"));
        let room_id = room_with(&store, &ada).await;

        for text in ["one", " two ", "three"] {
            store.send_message(room_id, Some(&ada), text).await.unwrap().unwrap();
        }

        let msgs = store.subscribe_messages(room_id).next().await.unwrap().unwrap();
        let texts: Vec<_> = msgs.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(msgs.iter().all(|m| !m.deleted && m.user.id == "ada"));
    }

    #[tokio::test]
    async fn soft_delete_keeps_everything_else() {
        let store = Store::in_memory().await.unwrap();
        let (ada, bob) = (user("ada", Some("Ada")), user("bob", None));
        let room_id = room_with(&store, &ada).await;

        let first = store.send_message(room_id, Some(&ada), "first").await.unwrap().unwrap();
        let second = store.send_message(room_id, Some(&bob), "second").await.unwrap().unwrap();

        assert!(matches!(
            store.soft_delete_message(room_id, first.id, &bob).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            store.soft_delete_message(room_id, Uuid::now_v7(), &ada).await,
            Err(AppError::NotFound(_))
        ));

        store.soft_delete_message(room_id, first.id, &ada).await.unwrap();

        let msgs = store.subscribe_messages(room_id).next().await.unwrap().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0], Message { deleted: true, ..first });
        assert_eq!(msgs[1], second);
    }

    #[tokio::test]
    async fn deleting_a_room_takes_its_messages() {
        let store = Store::in_memory().await.unwrap();
        let ada = user("ada", Some("Ada"));
        let room_id = room_with(&store, &ada).await;
        store.send_message(room_id, Some(&ada), "bye").await.unwrap();

        store.delete_room(room_id, &ada).await.unwrap();
        assert!(store.subscribe_messages(room_id).next().await.unwrap().unwrap().is_empty());
    }

    #[test]
    fn tombstone_hides_text_and_delete_button() {
        let ada = user("ada", Some("Ada"));
        let mut msg = Message {
            id: Uuid::now_v7(),
            text: "secret".into(),
            created_at: 1,
            deleted: false,
            user: Author::from(&ada),
        };

        let html = msg_to_html(&msg, &ada);
        assert!(html.contains("secret"));
        assert!(html.contains("data-delete"));
        assert!(!msg_to_html(&msg, &user("bob", None)).contains("data-delete"));

        msg.deleted = true;
        let html = msg_to_html(&msg, &ada);
        assert!(!html.contains("secret"));
        assert!(html.contains("Deleted"));
        assert!(!html.contains("data-delete"));
    }

    #[test]
    fn avatar_falls_back_to_initial() {
        let anon = user("x", None);
        let msg = Message {
            id: Uuid::now_v7(),
            text: "hi".into(),
            created_at: 1,
            deleted: false,
            user: Author::from(&anon),
        };
        let html = msg_to_html(&msg, &anon);
        assert!(html.contains(">A<"));
        assert!(html.contains("Anonymous"));
        assert!(message_list(&[], &anon).contains("No messages"));
    }

    #[test]
    fn placeholders_in_user_values_stay_literal() {
        let author = User {
            id: "mallory".into(),
            display_name: Some("{body}{content}{id}".into()),
            photo_url: Some("https://example.com/{name}.png".into()),
        };
        let msg = Message {
            id: Uuid::now_v7(),
            text: "\" onerror=\"alert(1)".into(),
            created_at: 1,
            deleted: false,
            user: Author::from(&author),
        };

        let html = msg_to_html(&msg, &author);
        assert!(!html.contains("onerror=\"alert(1)"));
        assert!(html.contains(r#"alt="{body}{content}{id}""#));
        assert!(html.contains("https://example.com/{name}.png"));
        assert!(html.contains(&format!(r#"data-delete="{}""#, msg.id)));
    }
}
