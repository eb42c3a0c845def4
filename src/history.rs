//! History reconciliation: turns a day-bucket snapshot into the ordered
//! sidebar list of sessions with derived titles.

use serde_json::Value;

use crate::chat::HistoryItem;
use crate::scope::UserScope;
use crate::session::base_path;
use crate::store::{Store, Subscription};

/// Contents longer than this are truncated for the title.
const TITLE_CONTENT_MAX: usize = 30;
const TITLE_TRUNCATE_AT: usize = 27;
/// How many leading messages contribute to a session title.
const TITLE_MESSAGE_COUNT: usize = 3;

/// Normalize a stored timestamp to comparable epoch millis. Numbers are
/// taken as-is; strings are tried as RFC 3339, RFC 2822, then a bare
/// number. Anything unparseable or missing sorts to the floor.
pub fn normalize_timestamp(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(|f| f as i64).unwrap_or(0),
        Some(Value::String(s)) => {
            if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                dt.timestamp_millis()
            } else if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(s) {
                dt.timestamp_millis()
            } else {
                s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0)
            }
        }
        _ => 0,
    }
}

fn truncate_content(content: &str) -> String {
    if content.chars().count() > TITLE_CONTENT_MAX {
        let head: String = content.chars().take(TITLE_TRUNCATE_AT).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

/// A message counts toward the title only with a non-empty role and
/// non-empty string content.
fn is_valid(msg: &Value) -> bool {
    let role_ok = msg
        .get("role")
        .and_then(Value::as_str)
        .is_some_and(|r| !r.is_empty());
    let content_ok = msg
        .get("content")
        .and_then(Value::as_str)
        .is_some_and(|c| !c.trim().is_empty());
    role_ok && content_ok
}

/// Locate a session's message map. Legacy records were double-wrapped as
/// `messages/messages` by a write-path bug that is fixed in this
/// codebase; the extra level is still unwrapped here so old sessions
/// keep showing up.
fn message_map(session: &Value) -> Option<&serde_json::Map<String, Value>> {
    let messages = session.get("messages")?.as_object()?;
    if let Some(inner) = messages.get("messages").and_then(Value::as_object) {
        return Some(inner);
    }
    Some(messages)
}

/// Recompute the full sidebar list from a day-bucket snapshot. Sessions
/// without a usable message map are silently excluded.
pub fn reconcile(snapshot: &Value) -> Vec<HistoryItem> {
    let Some(sessions) = snapshot.as_object() else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for (session_id, session) in sessions {
        let Some(map) = message_map(session) else {
            continue;
        };

        let mut valid: Vec<&Value> = map.values().filter(|m| is_valid(m)).collect();
        if valid.is_empty() {
            continue;
        }
        valid.sort_by_key(|m| normalize_timestamp(m.get("timestamp")));

        let title = valid
            .iter()
            .take(TITLE_MESSAGE_COUNT)
            .map(|m| truncate_content(m["content"].as_str().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("  ");

        items.push(HistoryItem {
            id: session_id.clone(),
            title,
        });
    }
    items
}

/// Live sidebar feed for one scope and day. Every delivery is the full
/// recomputed list; consumers replace their view state wholesale.
/// Dropping the feed stops all further deliveries.
pub struct HistoryFeed {
    sub: Subscription,
}

impl HistoryFeed {
    pub fn open(store: &Store, scope: &UserScope, date_key: &str) -> Self {
        Self {
            sub: store.watch(&base_path(scope, date_key)),
        }
    }

    pub async fn recv(&mut self) -> Option<Vec<HistoryItem>> {
        self.sub
            .recv()
            .await
            .map(|snapshot| snapshot.as_ref().map(reconcile).unwrap_or_default())
    }

    /// Non-blocking: the most recent pending list, if any.
    pub fn try_latest(&mut self) -> Option<Vec<HistoryItem>> {
        self.sub
            .try_latest()
            .map(|snapshot| snapshot.as_ref().map(reconcile).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Principal;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn title_uses_first_three_valid_messages_with_truncation() {
        let snapshot = json!({
            "s1": {
                "messages": {
                    "a": { "role": "user", "content": "Hello there this is a very long message exceeding limit", "timestamp": 1 },
                    "b": { "role": "bot", "content": "Hi", "timestamp": 2 },
                    "c": { "role": "bot", "content": "", "timestamp": 3 },
                }
            }
        });

        let items = reconcile(&snapshot);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "s1");
        assert_eq!(items[0].title, "Hello there this is a very ...  Hi");
    }

    #[test]
    fn legacy_double_nested_messages_are_unwrapped() {
        let snapshot = json!({
            "s1": {
                "messages": {
                    "messages": {
                        "a": { "role": "user", "content": "hey", "timestamp": 1 },
                    }
                }
            }
        });

        let items = reconcile(&snapshot);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "hey");
    }

    #[test]
    fn sessions_without_messages_are_skipped() {
        let snapshot = json!({
            "s1": { "meta": { "title": "empty" } },
            "s2": { "messages": {
                "a": { "role": "", "content": "no role" },
                "b": { "role": "user", "content": 42 },
            }},
            "s3": { "messages": {
                "a": { "role": "user", "content": "kept", "timestamp": 1 },
            }},
        });

        let items = reconcile(&snapshot);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "s3");
    }

    #[test]
    fn timestamps_normalize_across_numbers_strings_and_absence() {
        assert_eq!(normalize_timestamp(Some(&json!(1500))), 1500);
        assert_eq!(
            normalize_timestamp(Some(&json!("1970-01-01T00:00:02Z"))),
            2000
        );
        assert_eq!(normalize_timestamp(Some(&json!("250"))), 250);
        assert_eq!(normalize_timestamp(Some(&json!("not a date"))), 0);
        assert_eq!(normalize_timestamp(None), 0);
    }

    #[test]
    fn missing_timestamps_sort_first() {
        let snapshot = json!({
            "s1": {
                "messages": {
                    "a": { "role": "bot", "content": "second", "timestamp": 10 },
                    "b": { "role": "user", "content": "first" },
                }
            }
        });

        let items = reconcile(&snapshot);
        assert_eq!(items[0].title, "first  second");
    }

    #[tokio::test]
    async fn feed_tracks_writes_for_the_scope_and_day() {
        let store = Store::in_memory().await.unwrap();
        store.init().await.unwrap();
        let scope = UserScope::User(Principal::new("u1", "Omma"));

        let mut feed = HistoryFeed::open(&store, &scope, "2025-09-04");
        assert_eq!(feed.recv().await.unwrap(), Vec::new());

        store
            .set(
                "users/u1/chats/2025-09-04/s1/messages/a",
                &json!({ "role": "user", "content": "hello", "timestamp": 1 }),
            )
            .await
            .unwrap();

        let items = timeout(Duration::from_secs(1), feed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            items,
            vec![HistoryItem {
                id: "s1".to_string(),
                title: "hello".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn dropped_feed_stops_delivering() {
        let store = Store::in_memory().await.unwrap();
        store.init().await.unwrap();

        let mut feed = HistoryFeed::open(&store, &UserScope::Guest, "2025-09-04");
        assert_eq!(feed.recv().await.unwrap(), Vec::new());
        drop(feed);

        store
            .set(
                "guestChats/2025-09-04/s1/messages/a",
                &json!({ "role": "user", "content": "late", "timestamp": 1 }),
            )
            .await
            .unwrap();

        for _ in 0..100 {
            if store.watcher_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("feed watcher still registered after drop");
    }
}
