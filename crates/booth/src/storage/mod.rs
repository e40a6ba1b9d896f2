//! Storage layer for the confession booth.
//!
//! This module provides `SQLite`-based persistent storage for the crime
//! ledger, the per-identity quota counters and a small key-value metadata
//! table.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::quota::DailyQuotaState;
use crate::record::{timestamp_key, CrimeReport, Identity, SubmissionRecord, TranscriptEntry};

/// Storage handle shared between the rate limiter and the ledger.
pub type SharedStorage = Arc<Mutex<Storage>>;

/// Wrap a storage engine for sharing.
#[must_use]
pub fn shared(storage: Storage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Lock a shared storage handle.
///
/// Never hold the guard across an `.await`.
///
/// # Errors
///
/// Returns [`Error::StorageUnavailable`] if a previous holder panicked.
pub fn lock(storage: &SharedStorage) -> Result<MutexGuard<'_, Storage>> {
    storage
        .lock()
        .map_err(|e| Error::StorageUnavailable(e.to_string()))
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new row was added.
    Inserted(i64),
    /// The existing row with this id was overwritten.
    Replaced(i64),
}

/// Storage engine for the booth.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // === Ledger ===

    /// Insert a submission unconditionally and return its row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_submission(&self, record: &SubmissionRecord) -> Result<i64> {
        insert_submission(&self.conn, record)
    }

    /// Replace the submission with the same timestamp key, or insert it.
    ///
    /// If several rows share the key, the oldest one is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_submission(&mut self, record: &SubmissionRecord) -> Result<Upsert> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM submissions WHERE submitted_at = ?1 ORDER BY id LIMIT 1",
                [record.timestamp_key()],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = if let Some(id) = existing {
            let transcript = encode_transcript(record.transcript.as_deref())?;
            tx.execute(
                r"
                UPDATE submissions
                SET identity = ?1, display_name = ?2, address = ?3, description = ?4,
                    photo = ?5, transcript = ?6
                WHERE id = ?7
                ",
                params![
                    record.identity.as_str(),
                    record.report.display_name,
                    record.report.address,
                    record.report.description,
                    record.report.photo,
                    transcript,
                    id,
                ],
            )?;
            Upsert::Replaced(id)
        } else {
            Upsert::Inserted(insert_submission(&tx, record)?)
        };

        tx.commit()?;
        debug!(?outcome, key = %record.timestamp_key(), "Upserted submission");
        Ok(outcome)
    }

    /// All submissions in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn submissions(&self) -> Result<Vec<SubmissionRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT identity, submitted_at, display_name, address, description, photo, transcript
            FROM submissions ORDER BY id ASC
            ",
        )?;

        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Count stored submissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn submission_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;
        Ok(count)
    }

    // === Quota ===

    /// Full quota history for one identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn quota_state(&self, identity: &Identity) -> Result<DailyQuotaState> {
        let mut stmt = self.conn.prepare(
            "SELECT submitted_at FROM quota_events WHERE identity = ?1 ORDER BY submitted_at ASC",
        )?;
        let submissions = stmt
            .query_map([identity.as_str()], |row| parse_timestamp(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(DailyQuotaState {
            identity: identity.clone(),
            submissions,
            override_unlocked: is_unlocked(&self.conn, identity)?,
        })
    }

    /// Run `f` inside an immediate (write-locking) transaction.
    ///
    /// The transaction commits if `f` succeeds and rolls back otherwise, so
    /// a count followed by a record is atomic across processes sharing the
    /// database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot start or commit, or
    /// whatever error `f` returns.
    pub fn quota_transaction<T>(&mut self, f: impl FnOnce(&QuotaTx<'_>) -> Result<T>) -> Result<T> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&QuotaTx { tx: &tx })?;
        tx.commit()?;
        Ok(out)
    }

    // === Metadata ===

    /// Read a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Write a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            (key, value),
        )?;
        Ok(())
    }

    /// Remove a metadata value. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear_metadata(&self, key: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM metadata WHERE key = ?1", [key])?;
        Ok(affected > 0)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let submissions = self.submission_count()?;
        let identities: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT identity) FROM quota_events",
            [],
            |row| row.get(0),
        )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            submissions,
            identities,
            db_size_bytes,
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<SubmissionRecord> {
        let identity: String = row.get(0)?;
        let submitted_at = parse_timestamp(row, 1)?;
        let transcript: Option<String> = row.get(6)?;
        let transcript = transcript
            .map(|json| serde_json::from_str::<Vec<TranscriptEntry>>(&json))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

        Ok(SubmissionRecord {
            identity: Identity::new(identity),
            submitted_at,
            report: CrimeReport {
                display_name: row.get(2)?,
                address: row.get(3)?,
                description: row.get(4)?,
                photo: row.get(5)?,
            },
            transcript,
        })
    }
}

#[cfg(test)]
impl Storage {
    /// Drop the ledger table so the next insert fails.
    pub(crate) fn break_ledger(&self) {
        self.conn.execute_batch("DROP TABLE submissions").unwrap();
    }
}

/// Quota operations available inside [`Storage::quota_transaction`].
#[derive(Debug)]
pub struct QuotaTx<'a> {
    tx: &'a Transaction<'a>,
}

impl QuotaTx<'_> {
    /// Count submissions by `identity` in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_between(
        &self,
        identity: &Identity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32> {
        let count: u32 = self.tx.query_row(
            r"
            SELECT COUNT(*) FROM quota_events
            WHERE identity = ?1 AND submitted_at >= ?2 AND submitted_at < ?3
            ",
            params![identity.as_str(), timestamp_key(start), timestamp_key(end)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Whether the override has been unlocked for `identity`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn is_unlocked(&self, identity: &Identity) -> Result<bool> {
        is_unlocked(self.tx, identity)
    }

    /// Append a submission timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record(&self, identity: &Identity, at: DateTime<Utc>) -> Result<()> {
        self.tx.execute(
            "INSERT INTO quota_events (identity, submitted_at) VALUES (?1, ?2)",
            params![identity.as_str(), timestamp_key(at)],
        )?;
        Ok(())
    }

    /// Remove the most recent event recorded for `identity` at `at`.
    ///
    /// Returns `false` if no such event exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn release(&self, identity: &Identity, at: DateTime<Utc>) -> Result<bool> {
        let removed = self.tx.execute(
            r"
            DELETE FROM quota_events WHERE id = (
                SELECT id FROM quota_events
                WHERE identity = ?1 AND submitted_at = ?2
                ORDER BY id DESC LIMIT 1
            )
            ",
            params![identity.as_str(), timestamp_key(at)],
        )?;
        Ok(removed > 0)
    }

    /// Mark the override as unlocked.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn unlock(&self, identity: &Identity, at: DateTime<Utc>) -> Result<()> {
        self.tx.execute(
            r"
            INSERT INTO quota_overrides (identity, unlocked, unlocked_at) VALUES (?1, 1, ?2)
            ON CONFLICT(identity) DO UPDATE SET unlocked = 1, unlocked_at = excluded.unlocked_at
            ",
            params![identity.as_str(), timestamp_key(at)],
        )?;
        Ok(())
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Rows in the crime ledger.
    pub submissions: i64,
    /// Distinct identities with quota history.
    pub identities: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

fn insert_submission(conn: &Connection, record: &SubmissionRecord) -> Result<i64> {
    let transcript = encode_transcript(record.transcript.as_deref())?;
    conn.execute(
        r"
        INSERT INTO submissions
            (identity, submitted_at, display_name, address, description, photo, transcript)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
        params![
            record.identity.as_str(),
            record.timestamp_key(),
            record.report.display_name,
            record.report.address,
            record.report.description,
            record.report.photo,
            transcript,
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!("Inserted submission with id {}", id);
    Ok(id)
}

fn encode_transcript(transcript: Option<&[TranscriptEntry]>) -> Result<Option<String>> {
    Ok(transcript.map(serde_json::to_string).transpose()?)
}

fn is_unlocked(conn: &Connection, identity: &Identity) -> Result<bool> {
    let unlocked: Option<bool> = conn
        .query_row(
            "SELECT unlocked FROM quota_overrides WHERE identity = ?1",
            [identity.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(unlocked.unwrap_or(false))
}

fn parse_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::record::CrimeReport;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    fn create_test_record(name: &str, submitted_at: DateTime<Utc>) -> SubmissionRecord {
        SubmissionRecord::new(
            Identity::new("198.51.100.7"),
            CrimeReport {
                display_name: name.to_string(),
                address: "12 Elm Rd".to_string(),
                description: "Jaywalking".to_string(),
                photo: Some("data:image/jpeg;base64,AAAA".to_string()),
            },
            submitted_at,
        )
    }

    #[test]
    fn test_open_in_memory() {
        assert!(Storage::open_in_memory().is_ok());
    }

    #[test]
    fn test_insert_and_list() {
        let storage = create_test_storage();
        let record = create_test_record("Alice", at(9));

        let id = storage.insert_submission(&record).unwrap();
        assert!(id > 0);

        let all = storage.submissions().unwrap();
        assert_eq!(all, vec![record]);
    }

    #[test]
    fn test_insert_is_unconditional() {
        let storage = create_test_storage();
        let record = create_test_record("Alice", at(9));

        storage.insert_submission(&record).unwrap();
        storage.insert_submission(&record).unwrap();
        assert_eq!(storage.submission_count().unwrap(), 2);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut storage = create_test_storage();
        storage
            .insert_submission(&create_test_record("First", at(8)))
            .unwrap();
        let original = create_test_record("Bob", at(9));
        let id = storage.insert_submission(&original).unwrap();
        storage
            .insert_submission(&create_test_record("Last", at(10)))
            .unwrap();

        let updated = original
            .clone()
            .with_transcript(vec![TranscriptEntry::subject("it was me")]);
        assert_eq!(
            storage.upsert_submission(&updated).unwrap(),
            Upsert::Replaced(id)
        );

        let all = storage.submissions().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1], updated);
        assert_eq!(all[0].report.display_name, "First");
        assert_eq!(all[2].report.display_name, "Last");
    }

    #[test]
    fn test_upsert_inserts_when_missing() {
        let mut storage = create_test_storage();
        let record = create_test_record("Carol", at(11));

        assert!(matches!(
            storage.upsert_submission(&record).unwrap(),
            Upsert::Inserted(_)
        ));
        assert_eq!(storage.submission_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_twice_keeps_latest() {
        let mut storage = create_test_storage();
        let first = create_test_record("Dan", at(12));
        let mut second = first.clone();
        second.report.description = "Grand larceny".to_string();

        storage.upsert_submission(&first).unwrap();
        storage.upsert_submission(&second).unwrap();

        let all = storage.submissions().unwrap();
        assert_eq!(all, vec![second]);
    }

    #[test]
    fn test_large_photo_round_trips() {
        let storage = create_test_storage();
        let mut record = create_test_record("Eve", at(13));
        record.report.photo = Some(format!("data:image/jpeg;base64,{}", "A".repeat(200_000)));

        storage.insert_submission(&record).unwrap();
        assert_eq!(storage.submissions().unwrap()[0].report.photo, record.report.photo);
    }

    #[test]
    fn test_quota_state_empty() {
        let storage = create_test_storage();
        let state = storage.quota_state(&Identity::new("x")).unwrap();
        assert!(state.submissions.is_empty());
        assert!(!state.override_unlocked);
    }

    #[test]
    fn test_quota_transaction_records_and_counts() {
        let mut storage = create_test_storage();
        let id = Identity::new("x");

        storage
            .quota_transaction(|tx| {
                tx.record(&id, at(1))?;
                tx.record(&id, at(2))?;
                tx.record(&Identity::new("other"), at(2))?;
                Ok(())
            })
            .unwrap();

        let count = storage
            .quota_transaction(|tx| tx.count_between(&id, at(0), at(0) + Duration::days(1)))
            .unwrap();
        assert_eq!(count, 2);

        let later = storage
            .quota_transaction(|tx| tx.count_between(&id, at(2), at(3)))
            .unwrap();
        assert_eq!(later, 1);
    }

    #[test]
    fn test_quota_transaction_rolls_back_on_error() {
        let mut storage = create_test_storage();
        let id = Identity::new("x");

        let result: Result<()> = storage.quota_transaction(|tx| {
            tx.record(&id, at(1))?;
            Err(Error::internal("abort"))
        });
        assert!(result.is_err());
        assert!(storage.quota_state(&id).unwrap().submissions.is_empty());
    }

    #[test]
    fn test_release_removes_one_matching_event() {
        let mut storage = create_test_storage();
        let id = Identity::new("x");

        storage
            .quota_transaction(|tx| {
                tx.record(&id, at(1))?;
                tx.record(&id, at(1))?;
                tx.record(&id, at(2))
            })
            .unwrap();

        assert!(storage.quota_transaction(|tx| tx.release(&id, at(1))).unwrap());
        assert_eq!(storage.quota_state(&id).unwrap().submissions.len(), 2);
        assert!(!storage
            .quota_transaction(|tx| tx.release(&Identity::new("y"), at(1)))
            .unwrap());
    }

    #[test]
    fn test_unlock_is_persisted() {
        let mut storage = create_test_storage();
        let id = Identity::new("x");

        storage.quota_transaction(|tx| tx.unlock(&id, at(1))).unwrap();
        storage.quota_transaction(|tx| tx.unlock(&id, at(2))).unwrap();

        assert!(storage.quota_state(&id).unwrap().override_unlocked);
        assert!(!storage
            .quota_state(&Identity::new("y"))
            .unwrap()
            .override_unlocked);
    }

    #[test]
    fn test_metadata_round_trip() {
        let storage = create_test_storage();
        assert!(storage.metadata("police_channel_id").unwrap().is_none());

        storage.set_metadata("police_channel_id", "1234").unwrap();
        assert_eq!(
            storage.metadata("police_channel_id").unwrap().as_deref(),
            Some("1234")
        );

        assert!(storage.clear_metadata("police_channel_id").unwrap());
        assert!(!storage.clear_metadata("police_channel_id").unwrap());
    }

    #[test]
    fn test_stats() {
        let mut storage = create_test_storage();
        storage
            .insert_submission(&create_test_record("A", at(1)))
            .unwrap();
        storage
            .quota_transaction(|tx| tx.record(&Identity::new("a"), at(1)))
            .unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.submissions, 1);
        assert_eq!(stats.identities, 1);
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_shared_lock() {
        let handle = shared(create_test_storage());
        let guard = lock(&handle).unwrap();
        assert_eq!(guard.submission_count().unwrap(), 0);
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let temp_dir = std::env::temp_dir();
        let nested_path = temp_dir.join(format!(
            "confession_booth_test_{}/nested/booth.db",
            std::process::id()
        ));

        if let Some(parent) = nested_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }

        let storage = Storage::open(&nested_path).unwrap();
        assert!(nested_path.exists());
        assert_eq!(storage.path(), nested_path);

        drop(storage);
        if let Some(root) = nested_path.parent().and_then(Path::parent) {
            let _ = std::fs::remove_dir_all(root);
        }
    }
}
