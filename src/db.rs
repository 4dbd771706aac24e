use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::{EmployerRecord, Status, employer_key};
use crate::store::RecordStore;

/// SQLite-backed record store.
///
/// Writes open a transaction on first use and stay inside it until
/// [`RecordStore::flush`] commits. Closing without a flush rolls back to the
/// last checkpoint, so a record is never left half-written.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

const COLUMNS: &str = "employer_key, employer, role, status, confidence, first_seen, last_seen, \
                       message_ids, notes, conflicts, audit";

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobtrail") {
            proj_dirs.data_dir().join("jobtrail.db")
        } else {
            PathBuf::from("jobtrail.db")
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                employer_key TEXT PRIMARY KEY,
                employer TEXT NOT NULL,
                role TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('Applied', 'Interviewing', 'Rejected', 'Offer')),
                confidence TEXT NOT NULL CHECK (confidence IN ('low', 'medium', 'high')),
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                message_ids TEXT NOT NULL DEFAULT '[]',
                notes TEXT NOT NULL DEFAULT '[]',
                conflicts TEXT NOT NULL DEFAULT '[]',
                audit TEXT NOT NULL DEFAULT '[]',
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'jobtrail init' first."));
        }
        Ok(())
    }

    /// Records filtered by status and/or employer name, most recent first.
    pub fn list(&self, status: Option<Status>, employer: Option<&str>) -> Result<Vec<EmployerRecord>> {
        let mut sql = format!("SELECT {COLUMNS} FROM applications WHERE 1=1");
        let mut params: Vec<String> = vec![];

        if let Some(s) = status {
            sql.push_str(&format!(" AND status = ?{}", params.len() + 1));
            params.push(s.to_string());
        }

        if let Some(name) = employer {
            sql.push_str(&format!(" AND employer_key LIKE ?{}", params.len() + 1));
            params.push(format!("%{}%", employer_key(name)));
        }

        sql.push_str(" ORDER BY last_seen DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), Self::row_to_record)?;

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<EmployerRecord> {
        Ok(EmployerRecord {
            employer_key: row.get(0)?,
            employer: row.get(1)?,
            role: row.get(2)?,
            status: parsed_column(row, 3)?,
            confidence: parsed_column(row, 4)?,
            first_seen: timestamp_column(row, 5)?,
            last_seen: timestamp_column(row, 6)?,
            message_ids: json_column(row, 7)?,
            notes: json_column(row, 8)?,
            conflicts: json_column(row, 9)?,
            audit: json_column(row, 10)?,
        })
    }
}

impl RecordStore for Database {
    fn find(&self, employer: &str) -> Result<Option<EmployerRecord>> {
        let result = self.conn.query_row(
            &format!("SELECT {COLUMNS} FROM applications WHERE employer_key = ?1"),
            [employer_key(employer)],
            Self::row_to_record,
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn upsert(&mut self, record: &EmployerRecord) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        self.conn
            .execute(
                "INSERT INTO applications (employer_key, employer, role, status, confidence,
                     first_seen, last_seen, message_ids, notes, conflicts, audit)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(employer_key) DO UPDATE SET
                     employer = excluded.employer,
                     role = excluded.role,
                     status = excluded.status,
                     confidence = excluded.confidence,
                     first_seen = excluded.first_seen,
                     last_seen = excluded.last_seen,
                     message_ids = excluded.message_ids,
                     notes = excluded.notes,
                     conflicts = excluded.conflicts,
                     audit = excluded.audit,
                     updated_at = datetime('now')",
                params![
                    employer_key(&record.employer_key),
                    record.employer,
                    record.role,
                    record.status.as_str(),
                    record.confidence.as_str(),
                    record.first_seen.to_rfc3339(),
                    record.last_seen.to_rfc3339(),
                    serde_json::to_string(&record.message_ids)?,
                    serde_json::to_string(&record.notes)?,
                    serde_json::to_string(&record.conflicts)?,
                    serde_json::to_string(&record.audit)?,
                ],
            )
            .with_context(|| format!("Failed to save record for '{}'", record.employer))?;
        Ok(())
    }

    fn all(&self) -> Result<Vec<EmployerRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM applications ORDER BY employer_key"))?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to read applications")
    }

    fn flush(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT").context("Failed to commit")?;
            debug!(path = %self.path.display(), "checkpoint committed");
        }
        Ok(())
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn parsed_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: anyhow::Error| conversion_error(idx, e))
}

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_error(idx, e))
}
