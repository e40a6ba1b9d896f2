//! Schema versioning for the booth database.
//!
//! The base schema is created idempotently from [`SCHEMA_STATEMENTS`]; each
//! later version is a batch of SQL applied once, inside a transaction, and
//! recorded in the `metadata` table.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

use super::schema::SCHEMA_STATEMENTS;

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Ordered upgrade steps. Version 1 is the base schema itself.
const MIGRATIONS: &[(i32, &str)] = &[
    (1, ""),
    (
        2,
        "CREATE INDEX IF NOT EXISTS idx_submissions_identity ON submissions(identity)",
    ),
];

/// The current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Create the base schema and apply pending upgrades.
///
/// # Errors
///
/// Returns an error if schema creation or an upgrade step fails.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        conn.execute(statement, [])?;
    }

    let from = schema_version(conn)?;
    if from > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!("database version {from} is newer than supported {CURRENT_VERSION}"),
        });
    }

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > from) {
        apply(conn, version, sql)?;
    }
    Ok(())
}

/// Read the stored version; a fresh database reports 0.
fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn apply(conn: &Connection, version: i32, sql: &str) -> Result<()> {
    if !MIGRATIONS.iter().any(|(v, _)| *v == version) {
        return Err(Error::DatabaseMigration {
            message: format!("unknown migration version: {version}"),
        });
    }

    conn.execute_batch("BEGIN")?;
    let step = conn.execute_batch(sql).and_then(|()| {
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            (VERSION_KEY, version.to_string()),
        )
    });
    match step {
        Ok(_) => {
            conn.execute_batch("COMMIT")?;
            info!(version, "Applied schema migration");
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(Error::DatabaseMigration {
                message: format!("version {version}: {e}"),
            })
        }
    }
}
