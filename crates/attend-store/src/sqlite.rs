//! SQLite backend for employees and attendance records.

use attend_core::{AttendanceRecord, AttendanceStore, Identity, StoreError};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS employee (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT NOT NULL UNIQUE,
    image TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    employee_id INTEGER NOT NULL REFERENCES employee(id),
    timestamp   TEXT NOT NULL
);
";

/// Attendance store backed by a single SQLite connection.
///
/// The connection sits behind a mutex so the store can be shared between
/// request workers.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        // Concurrent writers from other processes wait instead of failing.
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(db_err)?;
        tracing::info!(path = %path.display(), "attendance database opened");
        Self::init(conn)
    }

    /// In-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".into()))
    }
}

impl AttendanceStore for SqliteStore {
    fn get_or_create_identity(
        &self,
        name: &str,
        reference_image: &str,
    ) -> Result<Identity, StoreError> {
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front, so two processes racing on
        // the same new name serialize here; the UNIQUE constraint does the rest.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let inserted = tx
            .execute(
                "INSERT INTO employee (name, image) VALUES (?1, ?2)
                 ON CONFLICT(name) DO NOTHING",
                params![name, reference_image],
            )
            .map_err(db_err)?;

        let identity = tx
            .query_row(
                "SELECT id, name, image FROM employee WHERE name = ?1",
                params![name],
                identity_from_row,
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        if inserted > 0 {
            tracing::info!(name, id = identity.id, image = reference_image, "employee created");
        }
        Ok(identity)
    }

    fn create_attendance(
        &self,
        employee_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError> {
        let conn = self.lock()?;

        let exists = conn
            .query_row(
                "SELECT 1 FROM employee WHERE id = ?1",
                params![employee_id],
                |_| Ok(()),
            )
            .optional()
            .map_err(db_err)?;
        if exists.is_none() {
            return Err(StoreError::NotFound(employee_id));
        }

        conn.execute(
            "INSERT INTO attendance (employee_id, timestamp) VALUES (?1, ?2)",
            params![employee_id, encode_timestamp(&timestamp)],
        )
        .map_err(db_err)?;

        Ok(AttendanceRecord {
            id: conn.last_insert_rowid(),
            employee_id,
            timestamp,
        })
    }

    fn list_attendance_joined(&self) -> Result<Vec<(Identity, AttendanceRecord)>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT e.id, e.name, e.image, a.id, a.employee_id, a.timestamp
                 FROM attendance a JOIN employee e ON e.id = a.employee_id
                 ORDER BY a.id",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map([], |row| {
                let identity = identity_from_row(row)?;
                let raw: String = row.get(5)?;
                Ok((identity, row.get::<_, i64>(3)?, row.get::<_, i64>(4)?, raw))
            })
            .map_err(db_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (identity, id, employee_id, raw) = row.map_err(db_err)?;
            let timestamp = decode_timestamp(&raw)?;
            out.push((
                identity,
                AttendanceRecord {
                    id,
                    employee_id,
                    timestamp,
                },
            ));
        }
        Ok(out)
    }
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    Ok(Identity {
        id: row.get(0)?,
        name: row.get(1)?,
        reference_image: row.get(2)?,
    })
}

fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(format!("bad timestamp {raw:?}: {e}")))
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attend_core::{AttendanceRecorder, PROVISIONED_IMAGE_TAG};
    use chrono::{Duration, TimeZone};
    use std::sync::{Arc, Barrier};

    fn employee_count(store: &SqliteStore, name: &str) -> i64 {
        store
            .lock()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM employee WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )
            .unwrap()
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.get_or_create_identity("Alice", "alice.jpg").unwrap();
        let again = store.get_or_create_identity("Alice", "other.jpg").unwrap();

        assert_eq!(first, again);
        assert_eq!(again.reference_image, "alice.jpg");
        assert_eq!(employee_count(&store, "Alice"), 1);
    }

    #[test]
    fn test_attendance_round_trips_utc_timestamp() {
        let store = SqliteStore::open_in_memory().unwrap();
        let alice = store.get_or_create_identity("Alice", "alice.jpg").unwrap();
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap() + Duration::microseconds(250);

        let record = store.create_attendance(alice.id, ts).unwrap();
        let rows = store.list_attendance_joined().unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, alice);
        assert_eq!(rows[0].1, record);
        assert_eq!(rows[0].1.timestamp, ts);
    }

    #[test]
    fn test_attendance_for_unknown_employee_fails() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.create_attendance(42, Utc::now()),
            Err(StoreError::NotFound(42))
        ));
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.get_or_create_identity("A", "a.jpg").unwrap();
        let b = store.get_or_create_identity("B", "b.jpg").unwrap();
        for id in [a.id, b.id, a.id] {
            store.create_attendance(id, Utc::now()).unwrap();
        }

        let names: Vec<String> = store
            .list_attendance_joined()
            .unwrap()
            .into_iter()
            .map(|(i, _)| i.name)
            .collect();
        assert_eq!(names, vec!["A", "B", "A"]);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/attendance.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            let id = store.get_or_create_identity("A", "a.jpg").unwrap().id;
            store.create_attendance(id, Utc::now()).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_attendance_joined().unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_provisioning_creates_one_identity() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let recorder = AttendanceRecorder::new(store.clone());
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let recorder = recorder.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    recorder.record("Newcomer").unwrap()
                })
            })
            .collect();
        let records: Vec<AttendanceRecord> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(employee_count(&store, "Newcomer"), 1);
        let employee_id = records[0].employee_id;
        assert!(records.iter().all(|r| r.employee_id == employee_id));

        let rows = store.list_attendance_joined().unwrap();
        assert_eq!(rows.len(), workers);
        assert_eq!(rows[0].0.reference_image, PROVISIONED_IMAGE_TAG);
    }

    #[test]
    fn test_concurrent_provisioning_across_connections() {
        // Two stores on one file model two processes sharing the database.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.db");
        let first = Arc::new(SqliteStore::open(&path).unwrap());
        let second = Arc::new(SqliteStore::open(&path).unwrap());
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = [first.clone(), second]
            .into_iter()
            .map(|store| {
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.get_or_create_identity("Shared", "shared.jpg").unwrap()
                })
            })
            .collect();
        let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap().id).collect();

        assert_eq!(ids[0], ids[1]);
        assert_eq!(employee_count(&first, "Shared"), 1);
    }
}
