//! Keys of the values kept in the cookie session.

pub const USER: &str = "user";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";

/// Password typed for a room, checked again on every entry.
pub fn room_password(room_id: &uuid::Uuid) -> String {
    format!("room_password:{room_id}")
}
