use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::User,
    include_res, res,
    store::{now_millis, LiveQuery, Store, Subscription, Topic},
    AppResult,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    pub user_id: String,
    pub name: Option<String>,
    pub joined_at: i64,
}

pub struct PresenceQuery {
    pub room_id: Uuid,
}

impl LiveQuery for PresenceQuery {
    type Snapshot = Vec<PresenceEntry>;

    fn topic(&self) -> Topic {
        Topic::Presence(self.room_id)
    }

    async fn load(&self, store: &Store) -> AppResult<Vec<PresenceEntry>> {
        let rows: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            "SELECT user_id,name,joined_at FROM active_users WHERE room_id=? ORDER BY joined_at, user_id",
        )
        .bind(self.room_id.to_string())
        .fetch_all(&store.db_pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, name, joined_at)| PresenceEntry { user_id, name, joined_at })
            .collect())
    }
}

impl Store {
    pub fn subscribe_presence(&self, room_id: Uuid) -> Subscription<PresenceQuery> {
        self.subscribe(PresenceQuery { room_id })
    }

    /// Registers `user` in the room, replacing an earlier entry of theirs.
    pub async fn join_room(&self, room_id: Uuid, user: &User) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO active_users (room_id,user_id,name,joined_at) VALUES (?,?,?,?)
             ON CONFLICT (room_id,user_id) DO UPDATE SET name=excluded.name, joined_at=excluded.joined_at",
        )
        .bind(room_id.to_string())
        .bind(&user.id)
        .bind(&user.display_name)
        .bind(now_millis())
        .execute(&self.db_pool)
        .await?;
        self.publish(Topic::Presence(room_id));
        Ok(())
    }

    pub async fn leave_room(&self, room_id: Uuid, user_id: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM active_users WHERE room_id=? AND user_id=?")
            .bind(room_id.to_string())
            .bind(user_id)
            .execute(&self.db_pool)
            .await?;
        if result.rows_affected() > 0 {
            self.publish(Topic::Presence(room_id));
        }
        Ok(())
    }
}

pub(crate) fn presence_list(entries: &[PresenceEntry]) -> String {
    let names = entries
        .iter()
        .map(|entry| res::escape(entry.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("Anonymous")))
        .collect::<Vec<_>>()
        .join(", ");

    res::fill(
        include_res!(str, "/pages/rooms/presence.html"),
        &[("count", &entries.len().to_string()), ("names", &names)],
    )
}
