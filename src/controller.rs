//! Message stream controller: the send → respond → persist → display
//! cycle for one active session, plus the live remote subscription that
//! keeps the local list authoritative with the store.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::ChatBackend;
use crate::chat::{Message, Sender};
use crate::history::normalize_timestamp;
use crate::scope::UserScope;
use crate::session::{self, base_path};
use crate::store::{server_timestamp, Store, Subscription};

/// Shown when the endpoint answered without anything usable.
pub const NO_RESPONSE_TEXT: &str = "⚠️ No response from server.";
/// Shown when the endpoint could not be reached or parsed.
pub const CONNECTION_TROUBLE_TEXT: &str = "❌ Sorry, I'm having trouble connecting.";

const DEFAULT_TITLE: &str = "New Chat";

pub struct ChatController<B: ChatBackend> {
    store: Store,
    backend: B,
    scope: UserScope,
    messages: Vec<Message>,
    /// Cached for the lifetime of the active chat; never recomputed for
    /// the same session.
    messages_path: Option<String>,
    remote: Option<Subscription>,
    responding: bool,
    notice: Option<String>,
    next_local_id: u64,
}

impl<B: ChatBackend> ChatController<B> {
    pub fn new(store: Store, backend: B, scope: UserScope) -> Self {
        Self {
            store,
            backend,
            scope,
            messages: Vec::new(),
            messages_path: None,
            remote: None,
            responding: false,
            notice: None,
            next_local_id: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_responding(&self) -> bool {
        self.responding
    }

    pub fn scope(&self) -> &UserScope {
        &self.scope
    }

    pub fn session_path(&self) -> Option<&str> {
        self.messages_path.as_deref()
    }

    /// The pending non-blocking notice (e.g. a failed persistence after a
    /// successful reply), cleared on read.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// Reset the view and eagerly open a fresh session.
    pub async fn new_chat(&mut self) -> Result<()> {
        self.messages.clear();
        self.next_local_id = 0;
        self.messages_path = None;
        self.remote = None;
        self.ensure_session().await?;
        Ok(())
    }

    /// Point the view at an existing session picked from the sidebar.
    pub fn open_session(&mut self, date_key: &str, session_id: &str) {
        let path = format!("{}/{session_id}/messages", base_path(&self.scope, date_key));
        self.messages.clear();
        self.remote = Some(self.store.watch(&path));
        self.messages_path = Some(path);
    }

    /// Run one full send cycle. Empty input and double-submits are
    /// no-ops. A failed send is terminal for the turn; there is no retry.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if self.responding {
            debug!("send ignored: a turn is already in flight");
            return Ok(());
        }

        let path = self.ensure_session().await?;

        // Optimistic append, before any network await. The remote
        // snapshot is authoritative and will replace this once it lands.
        let id = self.next_local_id();
        self.messages.push(Message::new(id, text, Sender::User));

        self.responding = true;
        match self.backend.ask(text).await {
            Ok(Some(reply)) => {
                let id = self.next_local_id();
                self.messages
                    .push(Message::new(id, reply.clone(), Sender::Bot));
                if let Err(e) = self.persist_turn(&path, text, &reply).await {
                    warn!("failed to persist turn at {path}: {e:#}");
                    self.notice = Some("Your last exchange could not be saved.".to_string());
                }
            }
            Ok(None) => {
                let id = self.next_local_id();
                self.messages
                    .push(Message::new(id, NO_RESPONSE_TEXT, Sender::Bot));
            }
            Err(e) => {
                warn!("chat endpoint unreachable: {e:#}");
                let id = self.next_local_id();
                self.messages
                    .push(Message::new(id, CONNECTION_TROUBLE_TEXT, Sender::Bot));
            }
        }
        self.responding = false;

        Ok(())
    }

    /// Apply any pending remote snapshot to the local list.
    pub fn poll_remote(&mut self) {
        let Some(remote) = self.remote.as_mut() else {
            return;
        };
        if let Some(snapshot) = remote.try_latest() {
            let next = map_snapshot(snapshot.as_ref());
            self.apply_snapshot(next);
        }
    }

    /// Await the next remote snapshot and apply it.
    pub async fn next_remote(&mut self) -> Option<()> {
        let remote = self.remote.as_mut()?;
        let snapshot = remote.recv().await?;
        let next = map_snapshot(snapshot.as_ref());
        self.apply_snapshot(next);
        Some(())
    }

    fn apply_snapshot(&mut self, next: Vec<Message>) {
        // Last writer wins; the optimistic entries go away wholesale.
        self.messages = next;
    }

    async fn ensure_session(&mut self) -> Result<String> {
        if let Some(path) = &self.messages_path {
            return Ok(path.clone());
        }
        let paths = session::create_session(&self.store, &self.scope, DEFAULT_TITLE).await?;
        self.remote = Some(self.store.watch(&paths.messages_path));
        self.messages_path = Some(paths.messages_path.clone());
        Ok(paths.messages_path)
    }

    /// User record first, then the bot record, each with a
    /// store-assigned timestamp. Written singly nested under the cached
    /// messages path.
    async fn persist_turn(&self, path: &str, user_text: &str, bot_text: &str) -> Result<()> {
        self.store
            .push(
                path,
                &json!({
                    "role": "user",
                    "content": user_text,
                    "timestamp": server_timestamp(),
                }),
            )
            .await?;
        self.store
            .push(
                path,
                &json!({
                    "role": "bot",
                    "content": bot_text,
                    "timestamp": server_timestamp(),
                }),
            )
            .await?;
        Ok(())
    }

    fn next_local_id(&mut self) -> String {
        self.next_local_id += 1;
        format!("local-{}", self.next_local_id)
    }
}

/// Map a remote messages snapshot into display records: id = remote key,
/// sender defaults to bot unless the role is exactly `user` or `bot`,
/// timestamp falls back to now when absent.
fn map_snapshot(snapshot: Option<&Value>) -> Vec<Message> {
    let Some(map) = snapshot.and_then(Value::as_object) else {
        return Vec::new();
    };

    map.iter()
        .map(|(key, value)| {
            let text = value
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let sender = match value.get("role").and_then(Value::as_str) {
                Some("user") => Sender::User,
                Some("bot") => Sender::Bot,
                _ => Sender::Bot,
            };
            let timestamp = match value.get("timestamp") {
                Some(ts) => Utc
                    .timestamp_millis_opt(normalize_timestamp(Some(ts)))
                    .single()
                    .unwrap_or_else(Utc::now),
                None => Utc::now(),
            };
            Message {
                id: key.clone(),
                text: text.to_string(),
                sender,
                timestamp,
            }
        })
        .collect()
}
