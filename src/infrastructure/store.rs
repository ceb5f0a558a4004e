//! SQLite submission store
//!
//! One relation keyed by `(service, id)`. Tags are stored as a JSON array.
//! All access goes through a single connection behind a mutex, so writes to
//! the same key are serialized and the last confirmed write wins.

use crate::domain::{Service, Submission, TagSet};
use crate::error::{RetaggerError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS submission (
    service TEXT NOT NULL,
    id INTEGER NOT NULL,
    title TEXT NOT NULL,
    posted_at TEXT NOT NULL,
    tags TEXT NOT NULL,
    PRIMARY KEY (service, id)
);
"#;

/// Rows fetched per batch while scanning
const SCAN_BATCH: usize = 256;

type RawRow = (String, i64, String, String, String);

/// Durable mapping from `(service, id)` to a submission record
pub struct SubmissionStore {
    conn: Mutex<Connection>,
}

impl SubmissionStore {
    /// Open (creating if needed) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(SubmissionStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a statement half-applied
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or wholesale-replace the record with the same key
    pub fn upsert(&self, submission: &Submission) -> Result<()> {
        let tags = serde_json::to_string(&submission.tags)?;
        self.conn().execute(
            "INSERT INTO submission (service, id, title, posted_at, tags)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (service, id) DO UPDATE SET
                title = excluded.title,
                posted_at = excluded.posted_at,
                tags = excluded.tags",
            params![
                submission.service.as_str(),
                submission.id,
                submission.title,
                submission.posted_at.to_rfc3339(),
                tags
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, service: Service, id: i64) -> Result<Submission> {
        let row: Option<RawRow> = self
            .conn()
            .query_row(
                "SELECT service, id, title, posted_at, tags FROM submission
                 WHERE service = ?1 AND id = ?2",
                params![service.as_str(), id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;

        match row {
            Some(raw) => decode(raw),
            None => Err(RetaggerError::NotFound { service, id }),
        }
    }

    /// Lazily iterate submissions matching `predicate`.
    ///
    /// Order is unspecified. Each call starts a fresh pass.
    pub fn scan<P>(&self, predicate: P) -> Scan<'_, P>
    where
        P: Fn(&Submission) -> bool,
    {
        Scan {
            store: self,
            predicate,
            buffer: VecDeque::new(),
            after: None,
            exhausted: false,
        }
    }

    /// Delete records of `service` whose id is not in `seen`.
    ///
    /// Returns the number of deleted records.
    pub fn prune_service(&self, service: Service, seen: &HashSet<i64>) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let stored: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM submission WHERE service = ?1")?;
            let ids = stmt
                .query_map(params![service.as_str()], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<i64>>>()?;
            ids
        };

        let mut removed = 0;
        for id in stored.into_iter().filter(|id| !seen.contains(id)) {
            removed += tx.execute(
                "DELETE FROM submission WHERE service = ?1 AND id = ?2",
                params![service.as_str(), id],
            )?;
        }

        tx.commit()?;
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM submission", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn fetch_batch(&self, after: Option<&(String, i64)>) -> Result<Vec<RawRow>> {
        let conn = self.conn();
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawRow> {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        };

        let rows = match after {
            Some((service, id)) => {
                let mut stmt = conn.prepare(
                    "SELECT service, id, title, posted_at, tags FROM submission
                     WHERE (service, id) > (?1, ?2)
                     ORDER BY service, id LIMIT ?3",
                )?;
                let rows = stmt
                    .query_map(params![service, id, SCAN_BATCH as i64], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT service, id, title, posted_at, tags FROM submission
                     ORDER BY service, id LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![SCAN_BATCH as i64], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };

        Ok(rows)
    }
}

fn decode((service, id, title, posted_at, tags): RawRow) -> Result<Submission> {
    let service = Service::from_str(&service).map_err(|e| {
        RetaggerError::Store(rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            e.into(),
        ))
    })?;

    let posted_at = DateTime::parse_from_rfc3339(&posted_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            RetaggerError::Store(rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))
        })?;

    let tags: TagSet = serde_json::from_str(&tags)?;

    Ok(Submission {
        service,
        id,
        title,
        posted_at,
        tags,
    })
}

/// Batched, restartable pass over the store
pub struct Scan<'a, P> {
    store: &'a SubmissionStore,
    predicate: P,
    buffer: VecDeque<Submission>,
    after: Option<(String, i64)>,
    exhausted: bool,
}

impl<P> Iterator for Scan<'_, P>
where
    P: Fn(&Submission) -> bool,
{
    type Item = Result<Submission>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while let Some(submission) = self.buffer.pop_front() {
                if (self.predicate)(&submission) {
                    return Some(Ok(submission));
                }
            }

            if self.exhausted {
                return None;
            }

            let rows = match self.store.fetch_batch(self.after.as_ref()) {
                Ok(rows) => rows,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            };

            if rows.len() < SCAN_BATCH {
                self.exhausted = true;
            }
            if let Some((service, id, ..)) = rows.last() {
                self.after = Some((service.clone(), *id));
            }

            for raw in rows {
                match decode(raw) {
                    Ok(submission) => self.buffer.push_back(submission),
                    Err(e) => {
                        self.exhausted = true;
                        self.buffer.clear();
                        return Some(Err(e));
                    }
                }
            }
        }
    }
}
