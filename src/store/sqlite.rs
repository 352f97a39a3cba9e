//! SQLite-backed result store with sqlite-vec similarity search.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::{ffi, Connection, OptionalExtension};

use super::{validate_record, NewRecord, ResultStore, StoreError, StoredRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS validations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider_id INTEGER NOT NULL,
    npi TEXT NOT NULL CHECK (length(npi) <= 10),
    embedding TEXT NOT NULL,
    trust_score REAL NOT NULL,
    validation_stage TEXT NOT NULL CHECK (length(validation_stage) <= 50),
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_validations_provider ON validations (provider_id);
";

const SELECT_COLUMNS: &str =
    "id, provider_id, npi, embedding, trust_score, validation_stage, created_at";

/// Append-only SQLite store. The connection is cloneable and safe to
/// share across concurrently running jobs.
#[derive(Clone)]
pub struct SqliteResultStore {
    conn: Connection,
}

impl SqliteResultStore {
    /// Open (and create if needed) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] when the sqlite-vec extension
    /// cannot be registered or the schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))?;

        conn.call(|conn| {
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            conn.execute_batch(SCHEMA)
                .map_err(tokio_rusqlite::Error::Rusqlite)?;
            Ok(())
        })
        .await
        .map_err(|err| StoreError::Storage(err.to_string()))?;

        Ok(Self { conn })
    }
}

/// sqlite-vec must be registered as an auto extension before the first
/// connection opens; registration is process-wide and happens once.
fn register_sqlite_vec() -> Result<(), StoreError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *const c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!(
                    "failed to register sqlite-vec extension (code {rc})"
                ))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(StoreError::Storage)
}

/// Raw column values for one `validations` row, in `SELECT_COLUMNS` order.
type RowParts = (i64, i64, String, String, f64, String, String);

fn corrupt_row(detail: String) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(detail.into())
}

fn record_from_parts(parts: RowParts) -> Result<StoredRecord, tokio_rusqlite::Error> {
    let (id, provider_id, npi, embedding_json, trust_score, validation_stage, created_raw) = parts;
    let embedding = serde_json::from_str(&embedding_json)
        .map_err(|err| corrupt_row(format!("corrupt embedding in record {id}: {err}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| corrupt_row(format!("corrupt created_at in record {id}: {err}")))?;

    Ok(StoredRecord {
        id,
        provider_id,
        npi,
        embedding,
        trust_score,
        validation_stage,
        created_at,
    })
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn insert(&self, record: NewRecord) -> Result<StoredRecord, StoreError> {
        validate_record(&record)?;

        let embedding_json = serde_json::to_string(&record.embedding)
            .map_err(|err| StoreError::Storage(err.to_string()))?;
        let created_at = Utc::now();
        let created_raw = created_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO validations \
                     (provider_id, npi, embedding, trust_score, validation_stage, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    (
                        record.provider_id,
                        &record.npi,
                        &embedding_json,
                        record.trust_score,
                        &record.validation_stage,
                        &created_raw,
                    ),
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;

                Ok(StoredRecord {
                    id: conn.last_insert_rowid(),
                    provider_id: record.provider_id,
                    npi: record.npi,
                    embedding: record.embedding,
                    trust_score: record.trust_score,
                    validation_stage: record.validation_stage,
                    created_at,
                })
            })
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))
    }

    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(StoredRecord, f32)>, StoreError> {
        let query_json = serde_json::to_string(query_embedding)
            .map_err(|err| StoreError::Storage(err.to_string()))?;

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {SELECT_COLUMNS}, \
                         vec_distance_cosine(vec_f32(embedding), vec_f32(?1)) AS distance \
                         FROM validations \
                         ORDER BY distance ASC \
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([&query_json], |row| {
                        let parts: RowParts = (
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        );
                        let distance: f32 = row.get(7)?;
                        Ok((parts, distance))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut results = Vec::new();
                for row in rows {
                    let (parts, distance) = row.map_err(tokio_rusqlite::Error::Rusqlite)?;
                    // Cosine distance to similarity.
                    results.push((record_from_parts(parts)?, 1.0 - distance));
                }
                Ok(results)
            })
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))
    }

    async fn find_by_provider(&self, provider_id: i64) -> Result<Option<StoredRecord>, StoreError> {
        self.conn
            .call(move |conn| {
                let parts: Option<RowParts> = conn
                    .query_row(
                        &format!(
                            "SELECT {SELECT_COLUMNS} FROM validations \
                             WHERE provider_id = ?1 \
                             ORDER BY id DESC LIMIT 1"
                        ),
                        [provider_id],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                                row.get(6)?,
                            ))
                        },
                    )
                    .optional()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                parts.map(record_from_parts).transpose()
            })
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))
    }

    async fn history(&self, provider_id: i64) -> Result<Vec<StoredRecord>, StoreError> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM validations \
                         WHERE provider_id = ?1 \
                         ORDER BY id DESC"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([provider_id], |row| {
                        let parts: RowParts = (
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        );
                        Ok(parts)
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(record_from_parts(
                        row.map_err(tokio_rusqlite::Error::Rusqlite)?,
                    )?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM validations", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))
    }
}
