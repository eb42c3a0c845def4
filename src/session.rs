//! Session creation and storage-path derivation.
//!
//! Paths are fixed at creation time: signing in or out later never
//! migrates an existing session to the other prefix.

use anyhow::Result;
use serde_json::json;

use crate::scope::UserScope;
use crate::store::Store;

/// Where a freshly created session lives. `messages_path` is what the
/// controller caches for the lifetime of the active chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub session_id: String,
    pub session_path: String,
    pub messages_path: String,
    pub date_key: String,
}

/// Today's calendar day in the viewer's local timezone, not UTC, so a
/// chat started just before midnight lands in the right bucket.
pub fn today_key() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Day bucket for a scope: `users/{uid}/chats/{dateKey}` when signed in,
/// `guestChats/{dateKey}` otherwise.
pub fn base_path(scope: &UserScope, date_key: &str) -> String {
    match scope {
        UserScope::User(p) => format!("users/{}/chats/{date_key}", p.uid),
        UserScope::Guest => format!("guestChats/{date_key}"),
    }
}

/// Create a session bucket for today and return its paths.
pub async fn create_session(store: &Store, scope: &UserScope, title: &str) -> Result<SessionPaths> {
    create_session_on(store, scope, &today_key(), title).await
}

/// Create a session under an explicit date key. The session id comes from
/// the store's push-id generator; the caller never supplies it. Metadata
/// is one transactional write: other readers see the session with its
/// meta or not at all.
pub async fn create_session_on(
    store: &Store,
    scope: &UserScope,
    date_key: &str,
    title: &str,
) -> Result<SessionPaths> {
    let base = base_path(scope, date_key);
    let session_id = store.push_id();
    let session_path = format!("{base}/{session_id}");

    store
        .set(
            &format!("{session_path}/meta"),
            &json!({
                "title": title,
                "startedAt": chrono::Utc::now().timestamp_millis(),
            }),
        )
        .await?;

    Ok(SessionPaths {
        messages_path: format!("{session_path}/messages"),
        session_id,
        session_path,
        date_key: date_key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Principal;

    async fn store() -> Store {
        let store = Store::in_memory().await.unwrap();
        store.init().await.unwrap();
        store
    }

    #[test]
    fn base_path_branches_on_scope() {
        let user = UserScope::User(Principal::new("u1", "Omma"));
        assert_eq!(base_path(&user, "2025-09-04"), "users/u1/chats/2025-09-04");
        assert_eq!(base_path(&UserScope::Guest, "2025-09-04"), "guestChats/2025-09-04");
    }

    #[test]
    fn today_key_is_calendar_shaped() {
        let key = today_key();
        assert_eq!(key.len(), 10);
        assert_eq!(key.as_bytes()[4], b'-');
        assert_eq!(key.as_bytes()[7], b'-');
    }

    #[tokio::test]
    async fn created_session_path_matches_the_contract() {
        let store = store().await;
        let user = UserScope::User(Principal::new("u1", "Omma"));

        let paths = create_session_on(&store, &user, "2025-09-04", "New Chat")
            .await
            .unwrap();

        assert_eq!(
            paths.session_path,
            format!("users/u1/chats/2025-09-04/{}", paths.session_id)
        );
        assert_eq!(paths.messages_path, format!("{}/messages", paths.session_path));

        let guest = create_session_on(&store, &UserScope::Guest, "2025-09-04", "New Chat")
            .await
            .unwrap();
        assert_eq!(
            guest.session_path,
            format!("guestChats/2025-09-04/{}", guest.session_id)
        );
    }

    #[tokio::test]
    async fn meta_is_written_with_title_and_start_time() {
        let store = store().await;
        let paths = create_session_on(&store, &UserScope::Guest, "2025-09-04", "New Chat")
            .await
            .unwrap();

        let meta = store
            .get(&format!("{}/meta", paths.session_path))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta["title"], "New Chat");
        assert!(meta["startedAt"].is_i64());
    }
}
