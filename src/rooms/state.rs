//! One visit to a room, from metadata lookup to leaving.

use uuid::Uuid;

use crate::{
    auth::User,
    lobby::directory::Room,
    store::{Store, Subscription},
    AppError, AppResult,
};

use super::{msg::{Message, MessagesQuery}, presence::{PresenceEntry, PresenceQuery}};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Resolving,
    PasswordPrompt,
    Granted,
    Denied,
    Active,
    Closed,
    /// The room could not be resolved. Terminal.
    Failed(String),
}

#[derive(Debug)]
pub enum SessionEvent {
    Presence(AppResult<Vec<PresenceEntry>>),
    Messages(AppResult<Vec<Message>>),
}

pub struct RoomSession {
    store: Store,
    room_id: Uuid,
    user: User,
    room: Option<Room>,
    state: SessionState,
    presence: Option<Subscription<PresenceQuery>>,
    messages: Option<Subscription<MessagesQuery>>,
}

impl RoomSession {
    pub fn new(store: Store, room_id: Uuid, user: User) -> Self {
        RoomSession {
            store,
            room_id,
            user,
            room: None,
            state: SessionState::Resolving,
            presence: None,
            messages: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(room_id = %self.room_id, user_id = %self.user.id, from = ?self.state, to = ?next, "room session");
        self.state = next;
    }

    /// Looks the room up once. Unknown rooms and read errors end in `Failed`.
    pub async fn resolve(&mut self) -> AppResult<&SessionState> {
        if self.state != SessionState::Resolving {
            return Ok(&self.state);
        }

        match self.store.get_room(self.room_id).await {
            Ok(Some(room)) => {
                let next = if room.is_locked() {
                    SessionState::PasswordPrompt
                } else {
                    SessionState::Granted
                };
                self.room = Some(room);
                self.transition(next);
            }
            Ok(None) => self.transition(SessionState::Failed("room not found".to_owned())),
            Err(e) => {
                self.transition(SessionState::Failed(e.to_string()));
                return Err(e);
            }
        }
        Ok(&self.state)
    }

    /// Compares `input` with the room's password, exactly.
    pub fn submit_password(&mut self, input: &str) -> &SessionState {
        if self.state != SessionState::PasswordPrompt {
            return &self.state;
        }

        let matches = self
            .room
            .as_ref()
            .and_then(|room| room.password.as_deref())
            .is_some_and(|password| password == input);

        if matches {
            self.transition(SessionState::Granted);
        } else {
            tracing::info!(room_id = %self.room_id, user_id = %self.user.id, "wrong room password");
            self.transition(SessionState::Denied);
        }
        &self.state
    }

    /// Registers presence and opens the live queries.
    pub async fn activate(&mut self) -> AppResult<()> {
        if self.state != SessionState::Granted {
            return Err(AppError::Forbidden("room session is not granted"));
        }

        self.store.join_room(self.room_id, &self.user).await?;
        self.presence = Some(self.store.subscribe_presence(self.room_id));
        self.messages = Some(self.store.subscribe_messages(self.room_id));
        self.transition(SessionState::Active);
        Ok(())
    }

    /// Next update from either live query. `None` when both are done.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let (Some(presence), Some(messages)) = (self.presence.as_mut(), self.messages.as_mut()) else {
            return None;
        };

        tokio::select! {
            Some(snapshot) = presence.next() => Some(SessionEvent::Presence(snapshot)),
            Some(snapshot) = messages.next() => Some(SessionEvent::Messages(snapshot)),
            else => None,
        }
    }

    pub async fn send(&self, text: &str) -> AppResult<Option<Message>> {
        if self.state != SessionState::Active {
            return Err(AppError::Forbidden("room session is not active"));
        }
        self.store.send_message(self.room_id, Some(&self.user), text).await
    }

    pub async fn delete(&self, message_id: Uuid) -> AppResult<()> {
        if self.state != SessionState::Active {
            return Err(AppError::Forbidden("room session is not active"));
        }
        self.store.soft_delete_message(self.room_id, message_id, &self.user).await
    }

    /// Leaves the room. Does nothing the second time.
    pub async fn close(&mut self) -> AppResult<()> {
        let was_active = self.state == SessionState::Active;
        self.unsubscribe();
        if matches!(self.state, SessionState::Closed | SessionState::Failed(_)) {
            return Ok(());
        }
        self.transition(SessionState::Closed);

        if was_active {
            self.store.leave_room(self.room_id, &self.user.id).await?;
        }
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(mut presence) = self.presence.take() {
            presence.unsubscribe();
        }
        if let Some(mut messages) = self.messages.take() {
            messages.unsubscribe();
        }
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        self.unsubscribe();

        // best effort, there may be no runtime left to run it on
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let room_id = self.room_id;
        let user_id = self.user.id.clone();
        handle.spawn(async move {
            if let Err(e) = store.leave_room(room_id, &user_id).await {
                tracing::warn!(%room_id, %user_id, error = %e, "could not clear presence");
            }
        });
    }
}
