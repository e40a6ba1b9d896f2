//! The crime ledger.
//!
//! Local records live in `SQLite` and are authoritative. A remote reader, if
//! configured, is consulted on every read and its entries are appended after
//! the local ones.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::Result;
use crate::mirror::{RemoteEntry, RemoteField, RemoteReader};
use crate::record::{truncate_field, SubmissionRecord};
use crate::storage::{self, SharedStorage, Upsert};

/// Transcript length in the local ledger view.
pub const VIEW_TRANSCRIPT_LIMIT: usize = 500;

/// Default bound on a remote read.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// One row of the merged ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    /// A record stored on this device.
    Local(SubmissionRecord),
    /// An entry read back from the remote mirror.
    Remote(RemoteEntry),
}

impl LedgerEntry {
    /// Title for display.
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Local(_) => "🚨 CRIME CONFESSION REPORTED",
            Self::Remote(entry) => &entry.title,
        }
    }

    /// When the entry was made, for display.
    #[must_use]
    pub fn timestamp(&self) -> String {
        match self {
            Self::Local(record) => record.submitted_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            Self::Remote(entry) => entry.timestamp.clone(),
        }
    }

    /// Display fields. Local transcripts are shortened to
    /// [`VIEW_TRANSCRIPT_LIMIT`] characters.
    #[must_use]
    pub fn fields(&self) -> Vec<RemoteField> {
        let record = match self {
            Self::Local(record) => record,
            Self::Remote(entry) => return entry.fields.clone(),
        };

        let field = |name: &str, value: &str, default: &str| RemoteField {
            name: name.to_string(),
            value: if value.trim().is_empty() {
                default.to_string()
            } else {
                value.to_string()
            },
        };

        let mut fields = vec![
            field("👤 Suspect Name", &record.report.display_name, "Unknown"),
            field("📍 Location Address", &record.report.address, "Unknown"),
            field("⚠️ Crime Description", &record.report.description, "Not provided"),
        ];
        if let Some(transcript) = record.render_transcript("\n") {
            fields.push(RemoteField {
                name: "💬 Chat Transcript".to_string(),
                value: truncate_field(&transcript, VIEW_TRANSCRIPT_LIMIT),
            });
        }
        fields.push(RemoteField {
            name: "⏰ Report Time".to_string(),
            value: self.timestamp(),
        });
        fields
    }

    /// Whether this entry came from the remote mirror.
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// Local ledger with an optional remote read-through.
pub struct Ledger {
    storage: SharedStorage,
    reader: Option<Box<dyn RemoteReader>>,
    remote_timeout: Duration,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("remote", &self.reader.is_some())
            .field("remote_timeout", &self.remote_timeout)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// A ledger over local storage only.
    #[must_use]
    pub fn new(storage: SharedStorage) -> Self {
        Self {
            storage,
            reader: None,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }

    /// Attach a remote reader.
    #[must_use]
    pub fn with_reader(mut self, reader: Box<dyn RemoteReader>, timeout: Duration) -> Self {
        self.reader = Some(reader);
        self.remote_timeout = timeout;
        self
    }

    /// Whether a remote reader is attached.
    #[must_use]
    pub fn has_remote(&self) -> bool {
        self.reader.is_some()
    }

    /// Store `record` as a new row.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be persisted.
    pub fn append(&self, record: &SubmissionRecord) -> Result<i64> {
        let id = storage::lock(&self.storage)?.insert_submission(record)?;
        debug!(id, key = %record.timestamp_key(), "Appended to ledger");
        Ok(id)
    }

    /// Replace the row with the same submission time, or append.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be persisted.
    pub fn upsert_by_timestamp(&self, record: &SubmissionRecord) -> Result<Upsert> {
        storage::lock(&self.storage)?.upsert_submission(record)
    }

    /// Local records only, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the local store cannot be read.
    pub fn local(&self) -> Result<Vec<SubmissionRecord>> {
        storage::lock(&self.storage)?.submissions()
    }

    /// Local records followed by remote entries.
    ///
    /// A slow or failing remote never fails the read; it only drops the
    /// remote part.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local store cannot be read.
    pub async fn read_all(&self) -> Result<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> =
            self.local()?.into_iter().map(LedgerEntry::Local).collect();

        if let Some(reader) = &self.reader {
            match tokio::time::timeout(self.remote_timeout, reader.fetch()).await {
                Ok(Ok(remote)) => {
                    debug!(count = remote.len(), "Merged remote entries");
                    entries.extend(remote.into_iter().map(LedgerEntry::Remote));
                }
                Ok(Err(e)) => warn!(error = %e, "Remote read failed; showing local entries only"),
                Err(_) => warn!(
                    timeout = ?self.remote_timeout,
                    "Remote read timed out; showing local entries only"
                ),
            }
        }

        Ok(entries)
    }
}
