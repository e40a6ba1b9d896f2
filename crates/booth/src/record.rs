//! Core record types for the confession booth.
//!
//! These are the data contracts shared by the rate limiter, the ledger and
//! the notifier. Front ends only ever build a [`CrimeReport`] and read
//! [`SubmissionRecord`]s back.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-field ceiling of the outward transport, minus headroom.
pub const FIELD_LIMIT: usize = 1000;

/// Marker appended to truncated outward values.
pub const ELLIPSIS: &str = "...";

/// Prefix used for identities invented when lookup fails.
const SYNTHETIC_PREFIX: &str = "unknown_";

/// Rate-limiting and ledger partition key.
///
/// Normally the caller's public network address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a resolved address.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// A placeholder identity derived from the wall clock.
    ///
    /// Two calls in different milliseconds produce different identities, so
    /// quota tracking for synthetic identities is best effort only.
    #[must_use]
    pub fn synthetic(now: DateTime<Utc>) -> Self {
        Self(format!("{SYNTHETIC_PREFIX}{}", now.timestamp_millis()))
    }

    /// Whether this identity was invented rather than looked up.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.0.starts_with(SYNTHETIC_PREFIX)
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who said a line in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The person in the booth.
    Subject,
    /// The AI-played officer or legal representative.
    Counterpart,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject => write!(f, "subject"),
            Self::Counterpart => write!(f, "counterpart"),
        }
    }
}

/// One line of a conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Who said it.
    pub speaker: Speaker,
    /// What was said.
    pub text: String,
}

impl TranscriptEntry {
    /// A line spoken by the subject.
    #[must_use]
    pub fn subject(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Subject,
            text: text.into(),
        }
    }

    /// A line spoken by the counterpart.
    #[must_use]
    pub fn counterpart(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Counterpart,
            text: text.into(),
        }
    }
}

/// The confession itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrimeReport {
    /// Name the subject gave.
    pub display_name: String,
    /// Address the subject gave.
    pub address: String,
    /// What the subject did.
    pub description: String,
    /// Captured photo as a `data:image/jpeg;base64,...` URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl CrimeReport {
    /// Decode the photo payload into raw image bytes.
    ///
    /// Accepts a data URL or bare base64. Returns `Ok(None)` without a photo.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPhoto`] if the payload is not valid base64.
    pub fn photo_bytes(&self) -> Result<Option<Vec<u8>>> {
        let Some(photo) = &self.photo else {
            return Ok(None);
        };
        let encoded = photo.split_once(',').map_or(photo.as_str(), |(_, data)| data);
        STANDARD
            .decode(encoded.trim())
            .map(Some)
            .map_err(|e| Error::InvalidPhoto(e.to_string()))
    }

    /// The subject's name with whitespace runs replaced by underscores.
    #[must_use]
    pub fn file_safe_name(&self) -> String {
        self.display_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// A stored confession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Identity that submitted it.
    pub identity: Identity,
    /// Submission time. Also the upsert key.
    pub submitted_at: DateTime<Utc>,
    /// The confession.
    pub report: CrimeReport,
    /// Conversation attached after the fact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptEntry>>,
}

impl SubmissionRecord {
    /// Create a record without a transcript.
    ///
    /// `submitted_at` is truncated to the millisecond precision of the key.
    #[must_use]
    pub fn new(identity: Identity, report: CrimeReport, submitted_at: DateTime<Utc>) -> Self {
        Self {
            identity,
            submitted_at: submitted_at.trunc_subsecs(3),
            report,
            transcript: None,
        }
    }

    /// The same record with a transcript attached.
    #[must_use]
    pub fn with_transcript(mut self, transcript: Vec<TranscriptEntry>) -> Self {
        self.transcript = Some(transcript);
        self
    }

    /// Canonical form of the upsert key.
    #[must_use]
    pub fn timestamp_key(&self) -> String {
        timestamp_key(self.submitted_at)
    }

    /// Render the transcript with `Suspect:` / `Legal Rep:` labels.
    ///
    /// Returns `None` when there is no transcript or it is empty.
    #[must_use]
    pub fn render_transcript(&self, separator: &str) -> Option<String> {
        let transcript = self.transcript.as_ref().filter(|t| !t.is_empty())?;
        Some(
            transcript
                .iter()
                .map(|entry| {
                    let sender = match entry.speaker {
                        Speaker::Subject => "👤 Suspect",
                        Speaker::Counterpart => "📋 Legal Rep",
                    };
                    format!("{sender}: {}", entry.text)
                })
                .collect::<Vec<_>>()
                .join(separator),
        )
    }

    /// Copy suitable for off-device mirrors: no photo.
    #[must_use]
    pub fn without_photo(&self) -> Self {
        let mut copy = self.clone();
        copy.report.photo = None;
        copy
    }
}

/// Encode JPEG bytes as a `data:` URL.
#[must_use]
pub fn photo_data_url(bytes: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
}

/// Format a timestamp the way records are keyed.
#[must_use]
pub fn timestamp_key(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncate `value` to at most `limit` characters.
///
/// Values over the limit keep `limit - 3` characters followed by `...`.
#[must_use]
pub fn truncate_field(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let keep = limit.saturating_sub(ELLIPSIS.len());
    let mut out: String = value.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
