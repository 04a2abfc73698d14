//! Attendance recording with identity auto-provisioning.

use crate::types::{AttendanceEntry, AttendanceRecord, Identity};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Reference image tag for identities created on first recognition.
pub const PROVISIONED_IMAGE_TAG: &str = "uploaded_via_app.jpg";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("employee {0} not found")]
    NotFound(i64),
}

/// Persistence for identities and attendance records.
///
/// `get_or_create_identity` must create at most one identity per name even
/// when called concurrently for the same new name.
pub trait AttendanceStore: Send + Sync {
    /// Return the identity named `name`, creating it with `reference_image`
    /// if absent. An existing identity is returned unchanged.
    fn get_or_create_identity(&self, name: &str, reference_image: &str)
        -> Result<Identity, StoreError>;

    fn create_attendance(
        &self,
        employee_id: i64,
        timestamp: DateTime<Utc>,
    ) -> Result<AttendanceRecord, StoreError>;

    /// All attendance records joined with their identity, in storage order.
    fn list_attendance_joined(&self) -> Result<Vec<(Identity, AttendanceRecord)>, StoreError>;
}

/// Writes one attendance record per accepted match.
///
/// There is no debounce: the same person recognized twice in a row gets two
/// records.
#[derive(Clone)]
pub struct AttendanceRecorder {
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceRecorder {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AttendanceStore> {
        &self.store
    }

    pub fn record(&self, identity_name: &str) -> Result<AttendanceRecord, StoreError> {
        let identity = self
            .store
            .get_or_create_identity(identity_name, PROVISIONED_IMAGE_TAG)?;
        let record = self.store.create_attendance(identity.id, Utc::now())?;
        tracing::info!(
            name = identity_name,
            employee_id = identity.id,
            timestamp = %record.timestamp.to_rfc3339(),
            "attendance recorded"
        );
        Ok(record)
    }

    pub fn attendance(&self) -> Result<Vec<AttendanceEntry>, StoreError> {
        Ok(self
            .store
            .list_attendance_joined()?
            .into_iter()
            .map(|(identity, record)| AttendanceEntry {
                name: identity.name,
                timestamp: record.timestamp,
            })
            .collect())
    }
}
