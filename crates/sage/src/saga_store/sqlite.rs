//! SQLite-backed saga store.
//!
//! Single-file storage with WAL mode for concurrent reads and a
//! `schema_version` table driving migrations. `rusqlite::Connection` is not
//! `Send`, so the connection lives behind `Arc<Mutex<..>>` and every call
//! runs under `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{now_secs, SagaStore};
use crate::domain::{Document, IngestSaga, SagaStatus, SagaStep, StepName};
use crate::error::{Error, Result};

/// Durable saga store over a single SQLite file.
pub struct SqliteSagaStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSagaStore {
    /// Open (or create) the store at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::store(format!("failed to open saga db: {e}")))?;
        Self::setup_connection(conn)
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::store(format!("failed to open in-memory saga db: {e}")))?;
        Self::setup_connection(conn)
    }

    fn setup_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::store(format!("failed to set WAL mode: {e}")))?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )
        .map_err(|e| Error::store(format!("failed to create schema_version: {e}")))?;

        let current: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current < 1 {
            Self::migrate_v1(conn)?;
        }
        Ok(())
    }

    fn migrate_v1(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_hash TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT '',
                file_path TEXT NOT NULL DEFAULT '',
                file_size INTEGER NOT NULL DEFAULT 0,
                mime_type TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ingest_sagas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL REFERENCES documents(id),
                status INTEGER NOT NULL,
                version INTEGER NOT NULL,
                current_step INTEGER NOT NULL,
                error_message TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ingest_sagas_document
            ON ingest_sagas(document_id, created_at DESC);

            CREATE TABLE IF NOT EXISTS saga_steps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                saga_id INTEGER NOT NULL REFERENCES ingest_sagas(id),
                name INTEGER NOT NULL,
                status INTEGER NOT NULL,
                metadata TEXT NOT NULL DEFAULT '',
                error_log TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (saga_id, name)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )
        .map_err(|e| Error::store(format!("failed to apply v1 migration: {e}")))
    }

    fn with_conn<T, F>(&self, op: F) -> impl std::future::Future<Output = Result<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        async move {
            tokio::task::spawn_blocking(move || {
                let conn = conn
                    .lock()
                    .map_err(|e| Error::store(format!("saga db lock poisoned: {e}")))?;
                op(&conn)
            })
            .await
            .map_err(|e| Error::store(format!("saga db task join error: {e}")))?
        }
    }
}

fn row_to_saga(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, i64, i64, i64, i64, String, i64, i64)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode_saga(
    (id, document_id, status, version, current_step, error_message, created_at, updated_at): (
        i64,
        i64,
        i64,
        i64,
        i64,
        String,
        i64,
        i64,
    ),
) -> Result<IngestSaga> {
    Ok(IngestSaga {
        id,
        document_id,
        status: SagaStatus::from_code(status)
            .ok_or_else(|| Error::store(format!("unknown saga status code {status}")))?,
        version,
        current_step: StepName::from_code(current_step)
            .ok_or_else(|| Error::store(format!("unknown step code {current_step}")))?,
        error_message,
        created_at,
        updated_at,
    })
}

const SAGA_COLUMNS: &str =
    "id, document_id, status, version, current_step, error_message, created_at, updated_at";

#[async_trait]
impl SagaStore for SqliteSagaStore {
    async fn create_document(&self, doc: &Document) -> Result<i64> {
        let doc = doc.clone();
        self.with_conn(move |conn| {
            let now = now_secs();
            conn.execute(
                "INSERT INTO documents (file_hash, title, author, file_path, file_size, mime_type, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    doc.file_hash,
                    doc.title,
                    doc.author,
                    doc.file_path,
                    doc.file_size,
                    doc.mime_type,
                    now,
                    now
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Error::store(format!("document hash already exists: {}", doc.file_hash))
                }
                other => Error::store(format!("failed to insert document: {other}")),
            })?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_document_by_hash(&self, hash: &str) -> Result<Option<Document>> {
        let hash = hash.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, file_hash, title, author, file_path, file_size, mime_type, created_at, updated_at
                 FROM documents WHERE file_hash = ?1",
                params![hash],
                |row| {
                    Ok(Document {
                        id: row.get(0)?,
                        file_hash: row.get(1)?,
                        title: row.get(2)?,
                        author: row.get(3)?,
                        file_path: row.get(4)?,
                        file_size: row.get(5)?,
                        mime_type: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                    })
                },
            )
            .optional()
            .map_err(|e| Error::store(format!("failed to load document: {e}")))
        })
        .await
    }

    async fn get_document(&self, document_id: i64) -> Result<Option<Document>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, file_hash, title, author, file_path, file_size, mime_type, created_at, updated_at
                 FROM documents WHERE id = ?1",
                params![document_id],
                |row| {
                    Ok(Document {
                        id: row.get(0)?,
                        file_hash: row.get(1)?,
                        title: row.get(2)?,
                        author: row.get(3)?,
                        file_path: row.get(4)?,
                        file_size: row.get(5)?,
                        mime_type: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                    })
                },
            )
            .optional()
            .map_err(|e| Error::store(format!("failed to load document: {e}")))
        })
        .await
    }

    async fn create_saga(&self, saga: &IngestSaga) -> Result<i64> {
        let saga = saga.clone();
        self.with_conn(move |conn| {
            let now = now_secs();
            conn.execute(
                "INSERT INTO ingest_sagas (document_id, status, version, current_step, error_message, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, '', ?4, ?5)",
                params![
                    saga.document_id,
                    saga.status.code(),
                    saga.current_step.code(),
                    now,
                    now
                ],
            )
            .map_err(|e| Error::store(format!("failed to insert saga: {e}")))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_saga(&self, saga_id: i64) -> Result<Option<IngestSaga>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {SAGA_COLUMNS} FROM ingest_sagas WHERE id = ?1"),
                    params![saga_id],
                    row_to_saga,
                )
                .optional()
                .map_err(|e| Error::store(format!("failed to load saga: {e}")))?;
            row.map(decode_saga).transpose()
        })
        .await
    }

    async fn latest_saga_for_document(&self, document_id: i64) -> Result<Option<IngestSaga>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {SAGA_COLUMNS} FROM ingest_sagas
                         WHERE document_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1"
                    ),
                    params![document_id],
                    row_to_saga,
                )
                .optional()
                .map_err(|e| Error::store(format!("failed to load latest saga: {e}")))?;
            row.map(decode_saga).transpose()
        })
        .await
    }

    async fn update_saga_status(
        &self,
        saga_id: i64,
        observed_version: i64,
        status: SagaStatus,
        step: StepName,
        error_message: &str,
    ) -> Result<()> {
        let error_message = error_message.to_string();
        self.with_conn(move |conn| {
            let now = now_secs();
            let updated = conn
                .execute(
                    "UPDATE ingest_sagas
                     SET status = ?1, current_step = ?2, error_message = ?3,
                         version = version + 1, updated_at = ?4
                     WHERE id = ?5 AND version = ?6",
                    params![
                        status.code(),
                        step.code(),
                        error_message,
                        now,
                        saga_id,
                        observed_version
                    ],
                )
                .map_err(|e| Error::store(format!("failed to update saga: {e}")))?;

            if updated == 1 {
                return Ok(());
            }

            // Distinguish a stale version from a missing row.
            let found: Option<i64> = conn
                .query_row(
                    "SELECT version FROM ingest_sagas WHERE id = ?1",
                    params![saga_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::store(format!("failed to re-read saga: {e}")))?;

            match found {
                Some(found) => Err(Error::ConcurrentUpdate {
                    expected: observed_version,
                    found,
                }),
                None => Err(Error::not_found(format!("saga {saga_id}"))),
            }
        })
        .await
    }

    async fn upsert_saga_step(&self, step: &SagaStep) -> Result<i64> {
        let step = step.clone();
        self.with_conn(move |conn| {
            let now = now_secs();
            conn.execute(
                "INSERT INTO saga_steps (saga_id, name, status, metadata, error_log, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (saga_id, name) DO UPDATE SET
                     status = excluded.status,
                     metadata = excluded.metadata,
                     error_log = excluded.error_log,
                     updated_at = excluded.updated_at",
                params![
                    step.saga_id,
                    step.name.code(),
                    step.status.code(),
                    step.metadata,
                    step.error_log,
                    now,
                    now
                ],
            )
            .map_err(|e| Error::store(format!("failed to upsert saga step: {e}")))?;

            conn.query_row(
                "SELECT id FROM saga_steps WHERE saga_id = ?1 AND name = ?2",
                params![step.saga_id, step.name.code()],
                |row| row.get(0),
            )
            .map_err(|e| Error::store(format!("failed to read saga step id: {e}")))
        })
        .await
    }

    async fn list_saga_steps(&self, saga_id: i64) -> Result<Vec<SagaStep>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, saga_id, name, status, metadata, error_log
                     FROM saga_steps WHERE saga_id = ?1 ORDER BY id",
                )
                .map_err(|e| Error::store(format!("failed to prepare step query: {e}")))?;

            let rows = stmt
                .query_map(params![saga_id], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })
                .map_err(|e| Error::store(format!("failed to query steps: {e}")))?;

            let mut steps = Vec::new();
            for row in rows {
                let (id, saga_id, name, status, metadata, error_log) =
                    row.map_err(|e| Error::store(format!("failed to read step row: {e}")))?;
                steps.push(SagaStep {
                    id,
                    saga_id,
                    name: StepName::from_code(name)
                        .ok_or_else(|| Error::store(format!("unknown step code {name}")))?,
                    status: SagaStatus::from_code(status)
                        .ok_or_else(|| Error::store(format!("unknown status code {status}")))?,
                    metadata,
                    error_log,
                });
            }
            Ok(steps)
        })
        .await
    }
}
