//! Case lifecycle and workflow transition engine for debt-collection cases.
//!
//! Cases move through distribution, negotiation, mediation board, litigation
//! and closure. Every change is appended to the case's history and the
//! current status/phase projection is rewritten in the same store
//! transaction. Sensitive moves go through delegated approvals, and new cases
//! are handed to DRCs in approved distribution batches.

pub mod approval;
pub mod batch;
pub mod case;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod history;
pub mod recovery;
pub mod sequence;
pub mod service;
pub mod status;
pub mod store;
pub mod transition;
pub mod types;
pub mod utils;

pub use approval::{
    ApprovalFilter, ApprovalKind, ApprovalRequest, ApproverReference, ApproverType, Decision,
    PendingApproval, ResolveOutcome,
};
pub use batch::{BatchRequest, BatchStatus, DistributionBatch, DrcAllocation, ExchangeDetail};
pub use case::{Case, NewCase};
pub use config::WorkflowConfig;
pub use error::{ErrorCategory, ErrorReport, WorkflowError};
pub use service::{CaseWorkflowService, Collaborators, TransitionRequest};
pub use status::CasePhase;
pub use store::Store;
