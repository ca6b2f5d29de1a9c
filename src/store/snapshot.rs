// src/store/snapshot.rs

use std::sync::Arc;

use crate::error::StoreError;
use crate::models::session::SessionSnapshot;
use crate::store::KeyValueStore;

/// Typed access to per-exam session snapshots on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<dyn KeyValueStore>,
}

impl SnapshotStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn key(exam_id: i64) -> String {
        format!("exam_session_{}", exam_id)
    }

    pub fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(snapshot)?;
        self.inner.set(&Self::key(snapshot.exam_id), &encoded)
    }

    /// Loads the snapshot for `exam_id`. A record that no longer decodes, or
    /// that belongs to a different exam, is discarded.
    pub fn load(&self, exam_id: i64) -> Result<Option<SessionSnapshot>, StoreError> {
        let key = Self::key(exam_id);
        let Some(raw) = self.inner.get(&key)? else {
            return Ok(None);
        };

        match serde_json::from_str::<SessionSnapshot>(&raw) {
            Ok(snapshot) if snapshot.exam_id == exam_id => Ok(Some(snapshot)),
            Ok(snapshot) => {
                tracing::warn!(
                    exam_id,
                    found = snapshot.exam_id,
                    "Discarding snapshot stored under the wrong exam"
                );
                self.inner.remove(&key)?;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(exam_id, error = %e, "Discarding unreadable snapshot");
                self.inner.remove(&key)?;
                Ok(None)
            }
        }
    }

    pub fn clear(&self, exam_id: i64) -> Result<(), StoreError> {
        self.inner.remove(&Self::key(exam_id))
    }
}
