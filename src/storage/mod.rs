use crate::models::Session;
use serde::{Deserialize, Serialize};

pub(crate) const SESSION_KEY: &str = "bookmarks_session";

fn local_storage() -> Option<web_sys::Storage> {
    web_sys::window().and_then(|w| w.local_storage().ok().flatten())
}

pub(crate) fn load_json_from_storage<T: for<'de> Deserialize<'de>>(key: &str) -> Option<T> {
    let storage = local_storage()?;
    let json = storage.get_item(key).ok().flatten()?;
    match serde_json::from_str(&json) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(%key, error = %e, "discarding unreadable stored value");
            let _ = storage.remove_item(key);
            None
        }
    }
}

pub(crate) fn save_json_to_storage<T: Serialize>(key: &str, value: &T) {
    if let Ok(json) = serde_json::to_string(value) {
        if let Some(storage) = local_storage() {
            let _ = storage.set_item(key, &json);
        }
    }
}

pub(crate) fn remove_from_storage(key: &str) {
    if let Some(storage) = local_storage() {
        let _ = storage.remove_item(key);
    }
}

/// Stored session, unless it has expired at `now_secs` with no refresh token
/// left to renew it.
pub(crate) fn load_session(now_secs: i64) -> Option<Session> {
    let session: Session = load_json_from_storage(SESSION_KEY)?;
    if session.is_expired_at(now_secs) && !session.can_refresh() {
        tracing::info!("stored session expired");
        remove_from_storage(SESSION_KEY);
        return None;
    }
    Some(session)
}

pub(crate) fn save_session(session: &Session) {
    save_json_to_storage(SESSION_KEY, session);
}

pub(crate) fn clear_session() {
    remove_from_storage(SESSION_KEY);
}
