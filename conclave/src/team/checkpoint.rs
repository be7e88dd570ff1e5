//! Checkpoint Store (spec §4.1, C1).
//!
//! Narrower than the generic [`crate::memory::Checkpointer`] (which
//! tracks per-channel versions for an arbitrary state graph): this store keys
//! on thread id alone and snapshots the whole [`ConversationState`] plus an
//! optional pending [`PendingApproval`], exactly the shape spec §4.1/§6.3
//! describe. `save` serializes per thread id via an internal per-thread lock
//! so concurrent saves on one thread never fork the log (spec §4.1, §5
//! "Ordering guarantees").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::team::approval::PendingApproval;
use crate::team::state::ConversationState;

/// Immutable snapshot (spec §3 "Checkpoint"): thread id, parent checkpoint
/// id, state, pending interrupt or none, monotonic version, creation time.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub thread_id: String,
    pub parent_checkpoint_id: Option<String>,
    pub checkpoint_id: String,
    pub state: ConversationState,
    pub pending: Option<PendingApproval>,
    pub version: u64,
    pub created_at_unix_ms: u128,
}

/// Error saving/loading a checkpoint (spec §7 "Checkpoint store failure").
#[derive(Debug, Error, Clone)]
pub enum CheckpointStoreError {
    #[error("checkpoint store unavailable: {0}")]
    Storage(String),
}

/// `save`/`load_latest`/`load_at` (spec §4.1). `save` is atomic w.r.t. a given
/// thread id and returns a version strictly greater than the parent's.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(
        &self,
        thread_id: &str,
        state: ConversationState,
        pending: Option<PendingApproval>,
    ) -> Result<Checkpoint, CheckpointStoreError>;

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointStoreError>;

    async fn load_at(
        &self,
        thread_id: &str,
        version: u64,
    ) -> Result<Option<Checkpoint>, CheckpointStoreError>;
}

/// In-process map, acceptable only in single-process mode (spec §4.1). Each
/// thread id gets its own async mutex so concurrent saves on that thread
/// serialize without blocking unrelated threads (spec §5 "Ordering
/// guarantees").
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    threads: Mutex<HashMap<String, Arc<Mutex<Vec<Checkpoint>>>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<Vec<Checkpoint>>> {
        let mut threads = self.threads.lock().await;
        threads
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(
        &self,
        thread_id: &str,
        state: ConversationState,
        pending: Option<PendingApproval>,
    ) -> Result<Checkpoint, CheckpointStoreError> {
        let lock = self.thread_lock(thread_id).await;
        let mut history = lock.lock().await;
        let parent = history.last();
        let version = parent.map(|c| c.version + 1).unwrap_or(0);
        let parent_checkpoint_id = parent.map(|c| c.checkpoint_id.clone());
        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            parent_checkpoint_id,
            checkpoint_id: format!("{}-{}", thread_id, version),
            state,
            pending,
            version,
            created_at_unix_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
        };
        history.push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointStoreError> {
        let lock = self.thread_lock(thread_id).await;
        let history = lock.lock().await;
        Ok(history.last().cloned())
    }

    async fn load_at(
        &self,
        thread_id: &str,
        version: u64,
    ) -> Result<Option<Checkpoint>, CheckpointStoreError> {
        let lock = self.thread_lock(thread_id).await;
        let history = lock.lock().await;
        Ok(history.iter().find(|c| c.version == version).cloned())
    }
}

/// SQLite-backed store (spec §6.3: "records must survive restart"). Keeps
/// only the latest row per thread id plus its full history, so `load_at`
/// still works without a separate history table, mirroring
/// [`crate::memory::SqliteSaver`]'s one-connection-per-call, `spawn_blocking`
/// style but keyed on thread id alone, matching [`InMemoryCheckpointStore`]'s
/// narrower shape rather than the generic `Checkpointer<S>` contract.
///
/// Each thread id gets its own async mutex, the same pattern
/// [`InMemoryCheckpointStore`] uses, so that two concurrent `save()` calls on
/// one thread id serialize (spec §5 "Ordering guarantees") instead of reading
/// the same max version and racing on the `(thread_id, version)` primary key.
pub struct SqliteCheckpointStore {
    db_path: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SqliteCheckpointStore {
    /// Opens (creating if needed) the checkpoints table at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, CheckpointStoreError> {
        let db_path = path.into();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                checkpoint_id TEXT NOT NULL,
                parent_checkpoint_id TEXT,
                state TEXT NOT NULL,
                pending TEXT,
                created_at_unix_ms INTEGER NOT NULL,
                PRIMARY KEY (thread_id, version)
            )
            "#,
            [],
        )
        .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?;
        Ok(Self {
            db_path,
            locks: Mutex::new(HashMap::new()),
        })
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<Checkpoint> {
        let thread_id: String = row.get(0)?;
        let version: i64 = row.get(1)?;
        let checkpoint_id: String = row.get(2)?;
        let parent_checkpoint_id: Option<String> = row.get(3)?;
        let state_json: String = row.get(4)?;
        let pending_json: Option<String> = row.get(5)?;
        let created_at_unix_ms: i64 = row.get(6)?;

        let state: ConversationState = serde_json::from_str(&state_json).unwrap_or_default();
        let pending: Option<PendingApproval> = pending_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());

        Ok(Checkpoint {
            thread_id,
            parent_checkpoint_id,
            checkpoint_id,
            state,
            pending,
            version: version as u64,
            created_at_unix_ms: created_at_unix_ms as u128,
        })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(
        &self,
        thread_id: &str,
        state: ConversationState,
        pending: Option<PendingApproval>,
    ) -> Result<Checkpoint, CheckpointStoreError> {
        let lock = self.thread_lock(thread_id).await;
        let _guard = lock.lock().await;

        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?;

            let parent: Option<(i64, String)> = conn
                .query_row(
                    "SELECT version, checkpoint_id FROM checkpoints WHERE thread_id = ?1 ORDER BY version DESC LIMIT 1",
                    params![thread_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .ok();
            let version = parent.as_ref().map(|(v, _)| v + 1).unwrap_or(0);
            let parent_checkpoint_id = parent.map(|(_, id)| id);
            let checkpoint_id = format!("{}-{}", thread_id, version);
            let created_at_unix_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default();

            let state_json = serde_json::to_string(&state)
                .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?;
            let pending_json = pending
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?;

            conn.execute(
                r#"
                INSERT INTO checkpoints
                (thread_id, version, checkpoint_id, parent_checkpoint_id, state, pending, created_at_unix_ms)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    thread_id,
                    version,
                    checkpoint_id,
                    parent_checkpoint_id,
                    state_json,
                    pending_json,
                    created_at_unix_ms as i64,
                ],
            )
            .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?;

            Ok(Checkpoint {
                thread_id,
                parent_checkpoint_id,
                checkpoint_id,
                state,
                pending,
                version: version as u64,
                created_at_unix_ms,
            })
        })
        .await
        .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointStoreError> {
        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?;
            conn.query_row(
                "SELECT thread_id, version, checkpoint_id, parent_checkpoint_id, state, pending, created_at_unix_ms
                 FROM checkpoints WHERE thread_id = ?1 ORDER BY version DESC LIMIT 1",
                params![thread_id],
                Self::row_to_checkpoint,
            )
            .optional()
            .map_err(|e| CheckpointStoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?
    }

    async fn load_at(
        &self,
        thread_id: &str,
        version: u64,
    ) -> Result<Option<Checkpoint>, CheckpointStoreError> {
        let db_path = self.db_path.clone();
        let thread_id = thread_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?;
            conn.query_row(
                "SELECT thread_id, version, checkpoint_id, parent_checkpoint_id, state, pending, created_at_unix_ms
                 FROM checkpoints WHERE thread_id = ?1 AND version = ?2",
                params![thread_id, version as i64],
                Self::row_to_checkpoint,
            )
            .optional()
            .map_err(|e| CheckpointStoreError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| CheckpointStoreError::Storage(e.to_string()))?
    }
}
