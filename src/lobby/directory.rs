use serde::Serialize;
use uuid::Uuid;

use crate::{
    auth::User,
    store::{now_millis, parse_id, LiveQuery, Store, Subscription, Topic},
    AppError, AppResult,
};

/// Advisory cap: the create form disappears once this many rooms are seen.
pub const ROOMS_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub created_by: String,
    pub created_at: i64,
    pub password: Option<String>,
}

impl Room {
    pub fn is_locked(&self) -> bool {
        self.password.is_some()
    }
}

type RoomRow = (String, String, String, i64, Option<String>);

fn room_from_row((id, name, created_by, created_at, password): RoomRow) -> AppResult<Room> {
    Ok(Room { id: parse_id(&id)?, name, created_by, created_at, password })
}

/// All rooms, newest first.
pub struct RoomsQuery;

impl LiveQuery for RoomsQuery {
    type Snapshot = Vec<Room>;

    fn topic(&self) -> Topic {
        Topic::Rooms
    }

    async fn load(&self, store: &Store) -> AppResult<Vec<Room>> {
        let rows: Vec<RoomRow> = sqlx::query_as(
            "SELECT id,name,created_by,created_at,password FROM rooms ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&store.db_pool)
        .await?;
        rows.into_iter().map(room_from_row).collect()
    }
}

impl Store {
    pub fn subscribe_rooms(&self) -> Subscription<RoomsQuery> {
        self.subscribe(RoomsQuery)
    }

    pub async fn get_room(&self, room_id: Uuid) -> AppResult<Option<Room>> {
        let row: Option<RoomRow> =
            sqlx::query_as("SELECT id,name,created_by,created_at,password FROM rooms WHERE id=?")
                .bind(room_id.to_string())
                .fetch_optional(&self.db_pool)
                .await?;
        row.map(room_from_row).transpose()
    }

    /// `Ok(None)` when the name is blank. An empty password means an open room.
    pub async fn create_room(&self, name: &str, password: Option<&str>, creator: &User) -> AppResult<Option<Room>> {
        if name.trim().is_empty() {
            return Ok(None);
        }

        let room = Room {
            id: Uuid::now_v7(),
            name: name.to_owned(),
            created_by: creator.id.clone(),
            created_at: now_millis(),
            password: password.filter(|p| !p.is_empty()).map(str::to_owned),
        };

        sqlx::query("INSERT INTO rooms (id,name,created_by,created_at,password) VALUES (?,?,?,?,?)")
            .bind(room.id.to_string())
            .bind(&room.name)
            .bind(&room.created_by)
            .bind(room.created_at)
            .bind(&room.password)
            .execute(&self.db_pool)
            .await?;
        self.publish(Topic::Rooms);

        tracing::info!(room_id = %room.id, name = %room.name, locked = room.is_locked(), "room created");
        Ok(Some(room))
    }

    /// Hard delete, creator only. Presence and messages go with the room.
    pub async fn delete_room(&self, room_id: Uuid, requester: &User) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM rooms WHERE id=? AND created_by=?")
            .bind(room_id.to_string())
            .bind(&requester.id)
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return match self.get_room(room_id).await? {
                Some(_) => Err(AppError::Forbidden("only the creator can delete a room")),
                None => Err(AppError::NotFound("room")),
            };
        }

        self.publish(Topic::Rooms);
        self.publish(Topic::Presence(room_id));
        self.publish(Topic::Messages(room_id));
        tracing::info!(%room_id, user_id = %requester.id, "room deleted");
        Ok(())
    }
}

/// Rooms whose name contains `text`, ignoring case, in snapshot order.
pub fn filter<'a>(rooms: &'a [Room], text: &str) -> Vec<&'a Room> {
    let needle = text.to_lowercase();
    rooms
        .iter()
        .filter(|room| room.name.to_lowercase().contains(&needle))
        .collect()
}

pub fn limit_reached(rooms: &[Room]) -> bool {
    rooms.len() >= ROOMS_LIMIT
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn user(id: &str) -> User {
        User { id: id.into(), display_name: Some(id.to_uppercase()), photo_url: None }
    }

    fn room(name: &str) -> Room {
        Room {
            id: Uuid::now_v7(),
            name: name.into(),
            created_by: "u".into(),
            created_at: 0,
            password: None,
        }
    }

    #[tokio::test]
    async fn blank_names_are_ignored() {
        let store = Store::in_memory().await.unwrap();
        assert_eq!(store.create_room("   ", None, &user("ada")).await.unwrap(), None);
        assert!(store.subscribe_rooms().next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn newest_room_comes_first() {
        let store = Store::in_memory().await.unwrap();
        let ada = user("ada");
        let first = store.create_room("first", None, &ada).await.unwrap().unwrap();
        let second = store.create_room("second", Some(""), &ada).await.unwrap().unwrap();
        let locked = store.create_room("locked", Some("pw"), &ada).await.unwrap().unwrap();

        assert_eq!(second.password, None);
        assert!(locked.is_locked());

        let rooms = store.subscribe_rooms().next().await.unwrap().unwrap();
        let ids: Vec<_> = rooms.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![locked.id, second.id, first.id]);
    }

    #[tokio::test]
    async fn subscription_sees_creates_and_deletes() {
        let store = Store::in_memory().await.unwrap();
        let ada = user("ada");
        let mut rooms = store.subscribe_rooms();
        assert!(rooms.next().await.unwrap().unwrap().is_empty());

        let general = store.create_room("general", None, &ada).await.unwrap().unwrap();
        assert_eq!(rooms.next().await.unwrap().unwrap(), vec![general.clone()]);

        store.delete_room(general.id, &ada).await.unwrap();
        assert!(rooms.next().await.unwrap().unwrap().is_empty());

        rooms.unsubscribe();
        rooms.unsubscribe();
        assert!(rooms.next().await.is_none());
    }

    #[tokio::test]
    async fn only_the_creator_deletes() {
        let store = Store::in_memory().await.unwrap();
        let (ada, bob) = (user("ada"), user("bob"));
        let general = store.create_room("general", None, &ada).await.unwrap().unwrap();

        assert!(matches!(store.delete_room(general.id, &bob).await, Err(AppError::Forbidden(_))));
        assert!(store.get_room(general.id).await.unwrap().is_some());

        store.delete_room(general.id, &ada).await.unwrap();
        assert!(matches!(store.delete_room(general.id, &ada).await, Err(AppError::NotFound(_))));
    }

    #[test]
    fn filter_ignores_case() {
        let rooms = vec![room("General"), room("random"), room("GENERATORS")];
        let names: Vec<_> = filter(&rooms, "gEnEr").iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["General", "GENERATORS"]);
        assert!(filter(&rooms, "nope").is_empty());
    }

    #[test]
    fn limit() {
        let rooms: Vec<_> = (0..ROOMS_LIMIT - 1).map(|i| room(&i.to_string())).collect();
        assert!(!limit_reached(&rooms));
        let mut rooms = rooms;
        rooms.push(room("last"));
        assert!(limit_reached(&rooms));
    }

    proptest! {
        #[test]
        fn empty_filter_is_identity(names in prop::collection::vec("[a-zA-Z ]{0,12}", 0..30)) {
            let rooms: Vec<_> = names.iter().map(|n| room(n)).collect();
            let filtered = filter(&rooms, "");
            prop_assert_eq!(filtered.len(), rooms.len());
            for (a, b) in filtered.iter().zip(&rooms) {
                prop_assert_eq!(a.id, b.id);
            }
        }

        #[test]
        fn filter_is_the_matching_subsequence(
            names in prop::collection::vec("[a-cA-C]{0,6}", 0..30),
            text in "[a-cA-C]{0,3}",
        ) {
            let rooms: Vec<_> = names.iter().map(|n| room(n)).collect();
            let expected: Vec<_> = rooms
                .iter()
                .filter(|r| r.name.to_lowercase().contains(&text.to_lowercase()))
                .map(|r| r.id)
                .collect();
            let actual: Vec<_> = filter(&rooms, &text).iter().map(|r| r.id).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
