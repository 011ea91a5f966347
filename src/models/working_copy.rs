use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkingCopyStatus {
    Active,
    DeletedByDelivery,
}

/// Customer-editable order snapshot. Owned by the ordering layer; the engine
/// only retires it when the numbers it was built from change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkingCopy {
    pub customer_id: Uuid,
    pub status: WorkingCopyStatus,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WorkingCopy {
    pub fn active(customer_id: Uuid, payload: serde_json::Value, at: DateTime<Utc>) -> Self {
        Self {
            customer_id,
            status: WorkingCopyStatus::Active,
            payload,
            updated_at: at,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WorkingCopyStatus::Active
    }

    /// Marks the copy stale. Returns false if it already was.
    pub fn invalidate(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.status = WorkingCopyStatus::DeletedByDelivery;
        self.deleted_at = Some(at);
        self.updated_at = at;
        true
    }
}
