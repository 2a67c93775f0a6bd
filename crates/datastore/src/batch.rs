//! Outcomes of bulk writes.
use itertools::Itertools;
use serde_json::Value;

use crate::validator::Violation;

/// What a bulk insert does when one of its documents can't be written.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FailurePolicy {
    /// Stop at the first failing document and fail the batch.  The caller's transaction should then be dropped, which
    /// rolls back everything the batch wrote.
    #[default]
    Abort,
    /// Skip failing documents, write the rest, and report what was skipped.
    SkipAndReport,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum FailureReason {
    #[error("failed validation: {}", .0.iter().join("; "))]
    Validation(Vec<Violation>),

    #[error("duplicate _id")]
    DuplicateId,

    #[error("not a JSON object")]
    NotAnObject,

    /// Rejected by the caller before reaching the store.
    #[error("{0}")]
    Rejected(String),
}

/// A document which could not be written.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentFailure {
    /// Position of the document in the submitted batch.
    pub index: usize,
    /// The document's `_id`, if it had one.
    pub id: Option<Value>,
    pub reason: FailureReason,
}

impl std::fmt::Display for DocumentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id.as_ref() {
            Some(id) => write!(f, "document {} (_id {}) {}", self.index, id, self.reason),
            None => write!(f, "document {} {}", self.index, self.reason),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InsertReport {
    /// `_id`s of written documents, in batch order.
    pub inserted_ids: Vec<Value>,
    pub failures: Vec<DocumentFailure>,
}

impl InsertReport {
    pub fn inserted(&self) -> usize {
        self.inserted_ids.len()
    }
}
