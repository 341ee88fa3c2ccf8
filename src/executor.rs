//! Applies an edit script against a remote store.
//!
//! One failed operation never aborts the script: transient errors are
//! retried a bounded number of times, everything else is recorded and the
//! remaining operations still run. The caller decides what a partial
//! application means for the run as a whole.

use std::time::Duration;

use tracing::{info, warn};

use crate::api::RemoteStore;
use crate::error::ApiError;
use crate::reconcile::EditOp;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Total tries per operation, including the first.
    pub max_attempts: u32,
    /// Pause between tries of the same operation.
    pub backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// One operation that could not be applied.
#[derive(Debug)]
pub struct OpFailure {
    /// Position in the script.
    pub index: usize,
    pub op: EditOp,
    pub error: ApiError,
}

/// Result of applying one script.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Operations applied successfully.
    pub applied: usize,
    pub failures: Vec<OpFailure>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Executor<'a, R: RemoteStore> {
    store: &'a R,
    config: ExecutorConfig,
}

impl<'a, R: RemoteStore> Executor<'a, R> {
    pub fn new(store: &'a R, config: ExecutorConfig) -> Self {
        Executor { store, config }
    }

    /// Apply every operation in `script`, in order, using `summary` as the
    /// edit summary.
    pub fn apply(&self, script: Vec<EditOp>, summary: &str) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (index, op) in script.into_iter().enumerate() {
            match self.apply_op(&op, summary) {
                Ok(()) => {
                    report.applied += 1;
                }
                Err(error) => {
                    warn!(index, %error, "operation failed, continuing");
                    report.failures.push(OpFailure { index, op, error });
                }
            }
        }
        report
    }

    fn apply_op(&self, op: &EditOp, summary: &str) -> Result<(), ApiError> {
        let mut attempt = 1;
        loop {
            let result = self.run_once(op, summary);
            match result {
                Err(error) if error.is_transient() && attempt < self.config.max_attempts => {
                    warn!(attempt, %error, "transient failure, retrying");
                    std::thread::sleep(self.config.backoff);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn run_once(&self, op: &EditOp, summary: &str) -> Result<(), ApiError> {
        match op {
            EditOp::Add(statement) => {
                let id = self.store.create_statement(statement, summary)?;
                info!(
                    entity = %statement.subject,
                    property = %statement.property,
                    claim = %id,
                    "created statement"
                );
                Ok(())
            }
            EditOp::UpdateQualifiers { id, qualifiers } => {
                self.store.set_qualifiers(id, qualifiers, summary)?;
                info!(claim = %id, "replaced qualifiers");
                Ok(())
            }
            EditOp::UpdateReferences { id, references } => {
                self.store.set_references(id, references, summary)?;
                info!(claim = %id, "replaced references");
                Ok(())
            }
            EditOp::UpdateRank { id, rank } => {
                self.store.set_rank(id, *rank, summary)?;
                info!(claim = %id, ?rank, "changed rank");
                Ok(())
            }
            EditOp::Remove { id } => {
                self.store.delete_statement(id, summary)?;
                info!(claim = %id, "removed statement");
                Ok(())
            }
        }
    }
}
