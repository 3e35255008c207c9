use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Metadata, OperationId, OperationKind, OperationState, Row};

/// An inserted row, identified by its stream and primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRecord {
    pub stream: String,
    pub primary_key: Row,
}

/// Kind-specific payload needed to reverse an operation later.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum CompensationData {
    #[default]
    None,
    /// Primary key of a row inserted into `stream`.
    Insert { stream: String, primary_key: Row },
    /// Inserted rows whose tombstones are still owed.
    Inserts { records: Vec<InsertRecord> },
    /// Primary key and pre-update values of a row in `stream`.
    Update {
        stream: String,
        primary_key: Row,
        original: Row,
    },
    /// The full row as it was before it was deleted from `stream`.
    Delete { stream: String, original: Row },
}

impl CompensationData {
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// A unit of work inside one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub state: OperationState,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub metadata: Metadata,
    pub compensation_data: CompensationData,
}

impl Operation {
    #[must_use]
    pub fn new(kind: OperationKind, metadata: Metadata, created_at: DateTime<Utc>) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            state: OperationState::Pending,
            created_at,
            completed_at: None,
            error: None,
            metadata,
            compensation_data: CompensationData::None,
        }
    }

    #[must_use]
    pub fn with_compensation_data(mut self, data: CompensationData) -> Self {
        self.compensation_data = data;
        self
    }

    pub fn mark_executing(&mut self) {
        if self.state == OperationState::Pending {
            self.state = OperationState::Executing;
        }
    }

    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        self.state = OperationState::Completed;
        self.completed_at = Some(at);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.state = OperationState::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(at);
    }

    pub fn mark_compensated(&mut self) {
        self.state = OperationState::Compensated;
    }

    /// Metadata value for `key`, e.g. the target table.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
