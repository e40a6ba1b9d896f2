//! `SQLite` schema definitions for the confession booth.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the crime ledger table.
///
/// `transcript` holds a JSON array of transcript entries, or NULL.
pub const CREATE_SUBMISSIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL,
    submitted_at TEXT NOT NULL,
    display_name TEXT NOT NULL,
    address TEXT NOT NULL,
    description TEXT NOT NULL,
    photo TEXT,
    transcript TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create an index on `submitted_at` for upserts.
pub const CREATE_SUBMITTED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_submissions_submitted_at ON submissions(submitted_at)
";

/// SQL statement to create the per-identity submission timestamp table.
pub const CREATE_QUOTA_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS quota_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identity TEXT NOT NULL,
    submitted_at TEXT NOT NULL
)
";

/// SQL statement to create an index for the per-day count.
pub const CREATE_QUOTA_IDENTITY_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_quota_events_identity ON quota_events(identity, submitted_at)
";

/// SQL statement to create the per-identity override flag table.
pub const CREATE_QUOTA_OVERRIDES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS quota_overrides (
    identity TEXT PRIMARY KEY,
    unlocked INTEGER NOT NULL DEFAULT 0,
    unlocked_at TEXT
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_SUBMISSIONS_TABLE,
    CREATE_SUBMITTED_AT_INDEX,
    CREATE_QUOTA_EVENTS_TABLE,
    CREATE_QUOTA_IDENTITY_INDEX,
    CREATE_QUOTA_OVERRIDES_TABLE,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_submissions_table_columns() {
        assert!(CREATE_SUBMISSIONS_TABLE.contains("identity TEXT NOT NULL"));
        assert!(CREATE_SUBMISSIONS_TABLE.contains("submitted_at TEXT NOT NULL"));
        assert!(CREATE_SUBMISSIONS_TABLE.contains("photo TEXT,"));
        assert!(CREATE_SUBMISSIONS_TABLE.contains("transcript TEXT,"));
    }

    #[test]
    fn test_overrides_keyed_by_identity() {
        assert!(CREATE_QUOTA_OVERRIDES_TABLE.contains("identity TEXT PRIMARY KEY"));
    }
}
