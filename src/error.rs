use std::fmt;

use sled::transaction::ConflictableTransactionError;

/// Caller errors. Raised before any write, nothing is persisted.
#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("required field `{0}` is missing or empty")]
    MissingField(&'static str),
    #[error("unknown case status `{0}`")]
    UnknownStatus(String),
    #[error("unknown case phase `{0}`")]
    UnknownPhase(String),
    #[error("unknown approver type `{0}`")]
    UnknownApproverType(String),
    #[error("status `{status}` belongs to phase {expected}, not {given}")]
    PhaseMismatch {
        status: String,
        expected: String,
        given: String,
    },
    #[error("approver type `{approver_type}` cannot reference a {reference}")]
    SubjectMismatch {
        approver_type: String,
        reference: String,
    },
    #[error("status `{status}` is not allowed for {workflow}")]
    NotInWhitelist {
        status: String,
        workflow: &'static str,
    },
    #[error("case {0} appears more than once")]
    DuplicateCase(u64),
    #[error("invalid exchange: {0}")]
    InvalidExchange(String),
    #[error("amount must be greater than zero")]
    ZeroAmount,
}

/// Failures that mean the stored state can no longer be trusted.
#[derive(thiserror::Error, Debug)]
pub enum IntegrityError {
    #[error("sequence counter `{0}` holds a malformed value")]
    CorruptCounter(String),
    #[error("sequence counter `{0}` would overflow")]
    CounterOverflow(String),
    #[error("{kind} {id} could not be decoded: {reason}")]
    CorruptDocument {
        kind: &'static str,
        id: String,
        reason: String,
    },
    #[error("{kind} {id} could not be encoded: {reason}")]
    Encode {
        kind: &'static str,
        id: String,
        reason: String,
    },
    #[error("case {case_id} has no status to roll back to")]
    MissingRollbackStatus { case_id: u64 },
    #[error("case {case_id} has an empty status history")]
    EmptyHistory { case_id: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{collaborator} failed: {source}")]
    Collaborator {
        collaborator: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    PreconditionFailed,
    Conflict,
    Collaborator,
    Integrity,
}

impl ErrorCategory {
    /// Status code an HTTP surface reports for this category.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::Validation => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Conflict => 409,
            ErrorCategory::PreconditionFailed => 412,
            ErrorCategory::Collaborator => 502,
            ErrorCategory::Integrity => 500,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::PreconditionFailed => "precondition_failed",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Collaborator => "collaborator",
            ErrorCategory::Integrity => "integrity",
        };
        f.write_str(name)
    }
}

/// What a failed request hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub category: ErrorCategory,
    pub status_code: u16,
    pub description: String,
}

impl WorkflowError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn collaborator(collaborator: &'static str, source: anyhow::Error) -> Self {
        WorkflowError::Collaborator {
            collaborator,
            source: source.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkflowError::Validation(_) => ErrorCategory::Validation,
            WorkflowError::NotFound { .. } => ErrorCategory::NotFound,
            WorkflowError::PreconditionFailed(_) => ErrorCategory::PreconditionFailed,
            WorkflowError::Conflict(_) => ErrorCategory::Conflict,
            WorkflowError::Collaborator { .. } => ErrorCategory::Collaborator,
            WorkflowError::Integrity(_) | WorkflowError::Storage(_) => ErrorCategory::Integrity,
        }
    }

    pub fn report(&self) -> ErrorReport {
        let category = self.category();
        ErrorReport {
            category,
            status_code: category.status_code(),
            description: self.to_string(),
        }
    }
}

// Lets `?` abort a sled transaction body with a domain error.
impl From<WorkflowError> for ConflictableTransactionError<WorkflowError> {
    fn from(value: WorkflowError) -> Self {
        ConflictableTransactionError::Abort(value)
    }
}

impl From<ValidationError> for ConflictableTransactionError<WorkflowError> {
    fn from(value: ValidationError) -> Self {
        ConflictableTransactionError::Abort(value.into())
    }
}

impl From<IntegrityError> for ConflictableTransactionError<WorkflowError> {
    fn from(value: IntegrityError) -> Self {
        ConflictableTransactionError::Abort(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_status_codes() {
        let err = WorkflowError::Conflict("batch already open".into());
        assert_eq!(err.category(), ErrorCategory::Conflict);
        assert_eq!(err.report().status_code, 409);

        let err: WorkflowError = ValidationError::MissingField("account_no").into();
        assert_eq!(err.report().category, ErrorCategory::Validation);
        assert!(err.report().description.contains("account_no"));

        let err = WorkflowError::collaborator("interaction logger", anyhow::anyhow!("timeout"));
        assert_eq!(err.category().status_code(), 502);
    }
}
