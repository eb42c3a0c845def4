//! Hierarchical realtime store backed by SQLite.
//!
//! The contract mirrors the remote database the chat pipeline was built
//! against: slash-separated paths, JSON values, push-id generation,
//! server-assigned timestamps, and push-based value listeners that fire
//! with a full snapshot on every change under the watched path.
//!
//! Leaves are stored as `(path, value-json)` rows; a snapshot is the
//! subtree assembled from a prefix scan ordered by path, so map keys come
//! back in push-id (chronological) order.

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::{path::Path, str::FromStr};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

/// Leaf sentinel replaced with the current epoch millis at write time.
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp"))
}

#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
    changes: broadcast::Sender<String>,
    /// Millis component of the last issued push id; keeps ids strictly
    /// increasing even within one millisecond.
    last_push_millis: Arc<AtomicI64>,
}

impl Store {
    /// Open (and create if missing) the database file at `db_path`.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let db_url = format!("sqlite://{}", db_path.to_string_lossy());
        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        Ok(Self::with_pool(pool))
    }

    /// An in-memory store for tests. Single connection so every query
    /// sees the same memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;
        Ok(Self::with_pool(pool))
    }

    fn with_pool(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            pool,
            changes,
            last_push_millis: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Initialize the schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                path TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize store schema")?;

        Ok(())
    }

    /// Generate a chronologically sortable key: fixed-width base36 epoch
    /// millis, then a random suffix. The millis component is bumped past
    /// the previous id when two pushes land in the same millisecond, so
    /// ids from one store sort in issue order.
    pub fn push_id(&self) -> String {
        let now = chrono::Utc::now().timestamp_millis().max(0);
        let millis = self
            .last_push_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .map(|last| now.max(last + 1))
            .unwrap_or(now);
        format!("{}-{}", base36(millis as u64), uuid::Uuid::new_v4().simple())
    }

    /// Replace the subtree at `path` with `value` in one transaction,
    /// then notify watchers. Server-timestamp sentinels become epoch
    /// millis assigned here, not by the caller.
    pub async fn set(&self, path: &str, value: &Value) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut leaves = Vec::new();
        flatten(path, value, now, &mut leaves);

        let mut tx = self.pool.begin().await.context("Failed to begin write")?;

        sqlx::query("DELETE FROM nodes WHERE path = ? OR path LIKE ? || '/%'")
            .bind(path)
            .bind(path)
            .execute(&mut *tx)
            .await
            .context("Failed to clear subtree")?;

        for (leaf_path, leaf_value) in &leaves {
            sqlx::query("INSERT OR REPLACE INTO nodes (path, value) VALUES (?, ?)")
                .bind(leaf_path)
                .bind(leaf_value.to_string())
                .execute(&mut *tx)
                .await
                .context("Failed to write leaf")?;
        }

        tx.commit().await.context("Failed to commit write")?;

        debug!(path, leaves = leaves.len(), "store write");
        let _ = self.changes.send(path.to_string());
        Ok(())
    }

    /// Append `value` under a fresh push id at `path`; returns the id.
    pub async fn push(&self, path: &str, value: &Value) -> Result<String> {
        let id = self.push_id();
        self.set(&format!("{path}/{id}"), value).await?;
        Ok(id)
    }

    /// Assemble the current snapshot of the subtree at `path`.
    pub async fn get(&self, path: &str) -> Result<Option<Value>> {
        let rows = sqlx::query("SELECT path, value FROM nodes WHERE path = ? OR path LIKE ? || '/%' ORDER BY path")
            .bind(path)
            .bind(path)
            .fetch_all(&self.pool)
            .await
            .context("Failed to read subtree")?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut root = Value::Null;
        for row in rows {
            let leaf_path: String = row.try_get("path")?;
            let raw: String = row.try_get("value")?;
            let leaf: Value = serde_json::from_str(&raw).context("Corrupt leaf value")?;

            if leaf_path == path {
                return Ok(Some(leaf));
            }
            let relative = &leaf_path[path.len() + 1..];
            insert_at(&mut root, relative, leaf);
        }

        Ok(Some(root))
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Subscribe to the subtree at `path`. The current snapshot is
    /// delivered immediately, then a fresh one after every write at,
    /// above, or below the path. Dropping the subscription stops all
    /// further deliveries.
    pub fn watch(&self, path: &str) -> Subscription {
        let store = self.clone();
        let watched = path.to_string();
        // Subscribe before the initial read so no write is missed.
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::channel(16);

        let task = tokio::spawn(async move {
            match store.get(&watched).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        return;
                    }
                }
                Err(e) => debug!(path = %watched, "initial snapshot failed: {e:#}"),
            }

            loop {
                match changes.recv().await {
                    Ok(changed) => {
                        if !overlaps(&watched, &changed) {
                            continue;
                        }
                    }
                    // A lagged notifier still means something changed;
                    // re-reading yields a correct snapshot either way.
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                match store.get(&watched).await {
                    Ok(snapshot) => {
                        if tx.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!(path = %watched, "snapshot read failed: {e:#}"),
                }
            }
        });

        Subscription { rx, task }
    }
}

/// A live value listener. `recv` yields full snapshots (`None` when the
/// path holds no data). Dropping the handle tears the listener down.
pub struct Subscription {
    rx: mpsc::Receiver<Option<Value>>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Option<Value>> {
        self.rx.recv().await
    }

    /// Non-blocking drain; returns the most recent pending snapshot.
    pub fn try_latest(&mut self) -> Option<Option<Value>> {
        let mut latest = None;
        while let Ok(snapshot) = self.rx.try_recv() {
            latest = Some(snapshot);
        }
        latest
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn overlaps(watched: &str, changed: &str) -> bool {
    watched == changed
        || changed.starts_with(&format!("{watched}/"))
        || watched.starts_with(&format!("{changed}/"))
}

fn flatten(path: &str, value: &Value, now: i64, out: &mut Vec<(String, Value)>) {
    if is_server_timestamp(value) {
        out.push((path.to_string(), json!(now)));
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&format!("{path}/{key}"), child, now, out);
            }
        }
        Value::Null => {}
        leaf => out.push((path.to_string(), leaf.clone())),
    }
}

fn insert_at(root: &mut Value, relative: &str, leaf: Value) {
    let mut node = root;
    let mut parts = relative.split('/').peekable();
    while let Some(part) = parts.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), leaf);
            return;
        }
        node = map.entry(part.to_string()).or_insert(Value::Null);
    }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut buf = [b'0'; 9];
    let mut i = buf.len();
    while n > 0 && i > 0 {
        i -= 1;
        buf[i] = DIGITS[(n % 36) as usize];
        n /= 36;
    }
    String::from_utf8_lossy(&buf).into_owned()
}
