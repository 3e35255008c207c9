use std::time::Instant;

use crosstx_core::{OperationId, OperationKind};

/// Outcome of compensating one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompensationStatus {
    /// Compensation has started but not finished.
    Running,
    /// The handler succeeded.
    Compensated,
    /// The handler returned an error.
    Failed,
    /// No handler is registered for the operation's kind.
    Unregistered,
    /// Compensation was not attempted.
    Skipped,
}

impl CompensationStatus {
    /// Whether the operation still needs someone to reconcile it by hand.
    #[must_use]
    pub fn needs_reconciliation(self) -> bool {
        matches!(self, Self::Failed | Self::Unregistered | Self::Skipped)
    }
}

/// Record of one operation's compensation during rollback.
#[derive(Debug, Clone)]
pub struct CompensationRecord {
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub status: CompensationStatus,
    pub started_at: Instant,
    pub completed_at: Option<Instant>,
    /// Description of the compensation (if a handler was found).
    pub description: Option<String>,
    pub error: Option<String>,
}

/// Audit log of every compensation attempted during one rollback, in the
/// order they were attempted.
#[derive(Debug, Default, Clone)]
pub struct CompensationAuditLog {
    records: Vec<CompensationRecord>,
}

impl CompensationAuditLog {
    /// Create a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a compensation starting.
    pub fn record_start(&mut self, operation_id: OperationId, kind: OperationKind) {
        self.records.push(CompensationRecord {
            operation_id,
            kind,
            status: CompensationStatus::Running,
            started_at: Instant::now(),
            completed_at: None,
            description: None,
            error: None,
        });
    }

    /// Mark the last compensation as successful.
    pub fn record_compensated(&mut self, description: String) {
        self.finish_last(CompensationStatus::Compensated, Some(description), None);
    }

    /// Mark the last compensation as failed.
    pub fn record_failed(&mut self, description: String, error: String) {
        self.finish_last(CompensationStatus::Failed, Some(description), Some(error));
    }

    /// Mark the last compensation as having no handler.
    pub fn record_unregistered(&mut self) {
        self.finish_last(CompensationStatus::Unregistered, None, None);
    }

    /// Mark the last compensation as not attempted.
    pub fn record_skipped(&mut self, reason: String) {
        self.finish_last(CompensationStatus::Skipped, None, Some(reason));
    }

    fn finish_last(
        &mut self,
        status: CompensationStatus,
        description: Option<String>,
        error: Option<String>,
    ) {
        if let Some(record) = self.records.last_mut() {
            record.status = status;
            record.completed_at = Some(Instant::now());
            record.description = description;
            record.error = error;
        }
    }

    /// Get all records in the audit log.
    #[must_use]
    pub fn records(&self) -> &[CompensationRecord] {
        &self.records
    }

    /// Operations whose compensation did not succeed.
    #[must_use]
    pub fn unreconciled(&self) -> Vec<OperationId> {
        self.records
            .iter()
            .filter(|r| r.status.needs_reconciliation())
            .map(|r| r.operation_id)
            .collect()
    }

    /// Get a summary of the compensations for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                CompensationStatus::Running => "…",
                CompensationStatus::Compensated => "↩",
                CompensationStatus::Failed => "⚠",
                CompensationStatus::Unregistered => "?",
                CompensationStatus::Skipped => "-",
            };
            lines.push(format!("{status} {} {}", record.kind, record.operation_id));
        }
        lines.join("\n")
    }
}
