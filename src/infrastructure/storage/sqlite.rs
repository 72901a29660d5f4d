//! SQLite key/value store

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::watch;

use super::hub::SubscriptionHub;
use crate::application::errors::StorageError;
use crate::domain::traits::{ChangeHandler, DataStore, Subscription};

#[derive(Clone)]
enum ConnState {
    Connecting,
    Ready(Arc<Mutex<Connection>>),
    Failed(String),
}

/// SQLite-backed store.
///
/// The connection opens on a blocking thread; operations issued before it is
/// ready wait for it instead of failing.
pub struct SqliteStore {
    path: PathBuf,
    state: watch::Receiver<ConnState>,
    hub: SubscriptionHub,
    // serializes write + publish so subscribers see store order
    writes: tokio::sync::Mutex<()>,
}

impl SqliteStore {
    /// Start connecting to the database at `path`. Must be called within a tokio runtime.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, rx) = watch::channel(ConnState::Connecting);

        let db_path = path.clone();
        tokio::task::spawn_blocking(move || {
            let state = match Self::connect(&db_path) {
                Ok(conn) => {
                    tracing::info!("SQLite store ready at {}", db_path.display());
                    ConnState::Ready(Arc::new(Mutex::new(conn)))
                }
                Err(e) => {
                    tracing::error!("Failed to open SQLite store at {}: {}", db_path.display(), e);
                    ConnState::Failed(e.to_string())
                }
            };
            let _ = tx.send(state);
        });

        Self {
            path,
            state: rx,
            hub: SubscriptionHub::new(),
            writes: tokio::sync::Mutex::new(()),
        }
    }

    fn connect(path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;
        Ok(conn)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn ensure_ready(&self) -> Result<Arc<Mutex<Connection>>, StorageError> {
        let mut state = self.state.clone();
        let ready = state
            .wait_for(|s| !matches!(s, ConnState::Connecting))
            .await
            .map_err(|_| StorageError::BackendUnavailable("connection task ended early".to_string()))?
            .clone();

        match ready {
            ConnState::Ready(conn) => Ok(conn),
            ConnState::Failed(reason) => Err(StorageError::BackendUnavailable(reason)),
            ConnState::Connecting => Err(StorageError::BackendUnavailable("still connecting".to_string())),
        }
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.ensure_ready().await?;
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&conn)
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .map_err(StorageError::from)
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let key = key.to_string();
        let raw: Option<String> = self
            .with_conn(move |conn| {
                conn.query_row("SELECT value FROM kv WHERE key = ?1", [&key], |row| row.get(0))
                    .optional()
            })
            .await?;

        raw.map(|text| serde_json::from_str(&text).map_err(StorageError::from))
            .transpose()
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let text = serde_json::to_string(&value)?;
        let _guard = self.writes.lock().await;

        let db_key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
                rusqlite::params![db_key, text],
            )
        })
        .await?;

        self.hub.publish(key, Some(value));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.writes.lock().await;

        let db_key = key.to_string();
        let removed = self
            .with_conn(move |conn| conn.execute("DELETE FROM kv WHERE key = ?1", [&db_key]))
            .await?;

        if removed > 0 {
            self.hub.publish(key, None);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str, handler: ChangeHandler) -> Result<Subscription, StorageError> {
        Ok(self.hub.subscribe(channel, handler))
    }

    fn subscriber_count(&self, channel: &str) -> usize {
        self.hub.subscriber_count(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handler::listener;
    use crate::domain::entities::DataChange;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    async fn recorder(store: &SqliteStore, channel: &str) -> (Subscription, mpsc::UnboundedReceiver<DataChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = store
            .subscribe(
                channel,
                listener(move |change: DataChange| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(change);
                        Ok(())
                    }
                }),
            )
            .await
            .unwrap();
        (sub, rx)
    }

    #[tokio::test]
    async fn test_operations_wait_for_connection() {
        // issued immediately after open, before the blocking connect finishes
        let store = SqliteStore::open(":memory:");
        store.set("guild:1:prefix", json!("!")).await.unwrap();
        assert_eq!(store.get("guild:1:prefix").await.unwrap(), Some(json!("!")));

        store.set("guild:1:prefix", json!("?")).await.unwrap();
        assert_eq!(store.get("guild:1:prefix").await.unwrap(), Some(json!("?")));

        store.del("guild:1:prefix").await.unwrap();
        assert_eq!(store.get("guild:1:prefix").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_database_is_backend_unavailable() {
        let store = SqliteStore::open("/nonexistent-dir/botcore/db.sqlite");
        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, StorageError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_subscription_delivers_in_order_until_cancelled() {
        let store = SqliteStore::open(":memory:");
        let (sub, mut rx) = recorder(&store, "k").await;
        assert_eq!(store.subscriber_count("k"), 1);

        store.set("other", json!(0)).await.unwrap();
        store.set("k", json!(1)).await.unwrap();
        store.set("k", json!(2)).await.unwrap();
        store.del("k").await.unwrap();

        for expected in [Some(json!(1)), Some(json!(2)), None] {
            let change = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(change.key, "k");
            assert_eq!(change.value, expected);
        }

        // removing a key that is already gone publishes nothing
        store.del("k").await.unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(quiet, Ok(Some(_))), "delete of a missing key notified");

        sub.cancel();
        assert_eq!(store.subscriber_count("k"), 0);
        store.set("k", json!(3)).await.unwrap();
        let late = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(late, Ok(Some(_))), "handler fired after cancel");
    }
}
