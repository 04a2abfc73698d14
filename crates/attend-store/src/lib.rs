//! attend-store: SQLite persistence for employees and attendance records.

pub mod sqlite;

pub use sqlite::SqliteStore;
