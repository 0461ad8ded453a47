//! Delegated approvals.
//!
//! Sensitive moves (DRC re-assignment, withdrawal, abandonment, write-off,
//! commission and batch distribution) are filed as a [`PendingApproval`]
//! against a case or a batch. Nothing beyond the pending status happens until
//! the resolved delegate approves or rejects it.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::{info, warn};

use crate::batch::DistributionBatch;
use crate::case::{Case, CaseApproval};
use crate::config::Limits;
use crate::error::{IntegrityError, ValidationError, WorkflowError};
use crate::history::History;
use crate::sequence::CounterName;
use crate::service::{CaseWorkflowService, request_span, require};
use crate::status::{self, CasePhase};
use crate::transition::{CaseUpdate, SideEffect};
use crate::types::{ApproverId, BatchId, CaseId, DrcId, TimeStamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ApproveStatus {
    #[n(0)]
    Open,
    #[n(1)]
    Seen,
    #[n(2)]
    Approve,
    #[n(3)]
    Reject,
}

impl ApproveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApproveStatus::Open => "Open",
            ApproveStatus::Seen => "Seen",
            ApproveStatus::Approve => "Approve",
            ApproveStatus::Reject => "Reject",
        }
    }

    /// Still waiting for a decision.
    pub fn is_open(&self) -> bool {
        matches!(self, ApproveStatus::Open | ApproveStatus::Seen)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApproveStatusEntry {
    #[n(0)]
    pub status: ApproveStatus,
    #[n(1)]
    pub status_date: TimeStamp,
    #[n(2)]
    pub status_edit_by: UserId,
    #[n(3)]
    pub interaction_log_id: Option<u64>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    minicbor::Encode,
    minicbor::Decode,
    serde::Deserialize,
)]
#[serde(try_from = "String")]
pub enum ApprovalKind {
    #[n(0)]
    DrcReassign,
    #[n(1)]
    CaseWithdrawal,
    #[n(2)]
    CaseAbandoned,
    #[n(3)]
    WriteOff,
    #[n(4)]
    Commission,
    #[n(5)]
    DrcAssign,
}

impl ApprovalKind {
    pub const ALL: [ApprovalKind; 6] = [
        ApprovalKind::DrcReassign,
        ApprovalKind::CaseWithdrawal,
        ApprovalKind::CaseAbandoned,
        ApprovalKind::WriteOff,
        ApprovalKind::Commission,
        ApprovalKind::DrcAssign,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalKind::DrcReassign => "DRC Re-Assign Approval",
            ApprovalKind::CaseWithdrawal => "Case Withdrawal Approval",
            ApprovalKind::CaseAbandoned => "Case Abandoned Approval",
            ApprovalKind::WriteOff => "Case Write-Off Approval",
            ApprovalKind::Commission => "Commission Approval",
            ApprovalKind::DrcAssign => "DRC Assign Approval",
        }
    }
}

impl fmt::Display for ApprovalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApprovalKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| ValidationError::UnknownApproverType(s.to_string()))
    }
}

impl TryFrom<String> for ApprovalKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What an approved request turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    CaseStatus(&'static str),
    BatchDistributed,
}

/// An approval request with its type-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum ApproverType {
    #[n(0)]
    DrcReassign {
        #[n(0)]
        drc_id: DrcId,
        #[n(1)]
        drc_name: String,
    },
    #[n(1)]
    CaseWithdrawal,
    #[n(2)]
    CaseAbandoned,
    #[n(3)]
    WriteOff,
    #[n(4)]
    Commission {
        #[n(0)]
        amount: u64,
    },
    #[n(5)]
    DrcAssign {
        #[n(0)]
        batch_seq: u32,
    },
}

impl ApproverType {
    pub fn kind(&self) -> ApprovalKind {
        match self {
            ApproverType::DrcReassign { .. } => ApprovalKind::DrcReassign,
            ApproverType::CaseWithdrawal => ApprovalKind::CaseWithdrawal,
            ApproverType::CaseAbandoned => ApprovalKind::CaseAbandoned,
            ApproverType::WriteOff => ApprovalKind::WriteOff,
            ApproverType::Commission { .. } => ApprovalKind::Commission,
            ApproverType::DrcAssign { .. } => ApprovalKind::DrcAssign,
        }
    }

    /// Status the case sits in while the approval is open.
    pub fn pending_status(&self) -> Option<&'static str> {
        match self {
            ApproverType::DrcReassign { .. } => Some(status::PENDING_DRC_REASSIGN),
            ApproverType::CaseWithdrawal => Some(status::PENDING_CASE_WITHDRAWAL),
            ApproverType::CaseAbandoned => Some(status::ABANDANED),
            ApproverType::WriteOff
            | ApproverType::Commission { .. }
            | ApproverType::DrcAssign { .. } => None,
        }
    }

    pub fn outcome(&self) -> ApprovalOutcome {
        match self {
            ApproverType::DrcReassign { .. } => {
                ApprovalOutcome::CaseStatus(status::OPEN_ASSIGN_AGENT)
            }
            ApproverType::CaseWithdrawal => ApprovalOutcome::CaseStatus(status::CASE_WITHDRAWED),
            ApproverType::CaseAbandoned => ApprovalOutcome::CaseStatus(status::CASE_ABANDONED),
            ApproverType::WriteOff => ApprovalOutcome::CaseStatus(status::PENDING_WRITE_OFF),
            ApproverType::Commission { .. } => ApprovalOutcome::CaseStatus(status::COMMISSIONED),
            ApproverType::DrcAssign { .. } => ApprovalOutcome::BatchDistributed,
        }
    }

    pub fn parameters(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        match self {
            ApproverType::DrcReassign { drc_id, drc_name } => {
                params.insert("drc_id".to_string(), drc_id.to_string());
                params.insert("drc_name".to_string(), drc_name.clone());
            }
            ApproverType::Commission { amount } => {
                params.insert("amount".to_string(), amount.to_string());
            }
            ApproverType::DrcAssign { batch_seq } => {
                params.insert("batch_seq".to_string(), batch_seq.to_string());
            }
            ApproverType::CaseWithdrawal
            | ApproverType::CaseAbandoned
            | ApproverType::WriteOff => {}
        }
        params
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ApproverType::DrcReassign { drc_name, .. } => require(drc_name, "drc_name"),
            ApproverType::Commission { amount: 0 } => Err(ValidationError::ZeroAmount),
            _ => Ok(()),
        }
    }

    fn check_subject(&self, reference: ApproverReference) -> Result<(), ValidationError> {
        let matches = match reference {
            ApproverReference::Case(_) => !matches!(self, ApproverType::DrcAssign { .. }),
            ApproverReference::Batch(_) => matches!(self, ApproverType::DrcAssign { .. }),
        };
        if matches {
            return Ok(());
        }
        Err(ValidationError::SubjectMismatch {
            approver_type: self.kind().to_string(),
            reference: reference.subject().to_string(),
        })
    }
}

/// What an approval is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, minicbor::Encode, minicbor::Decode)]
pub enum ApproverReference {
    #[n(0)]
    Case(#[n(0)] CaseId),
    #[n(1)]
    Batch(#[n(0)] BatchId),
}

impl ApproverReference {
    pub fn subject(&self) -> &'static str {
        match self {
            ApproverReference::Case(_) => "case",
            ApproverReference::Batch(_) => "batch",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            ApproverReference::Case(id) | ApproverReference::Batch(id) => *id,
        }
    }
}

impl fmt::Display for ApproverReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct StatusSnapshot {
    #[n(0)]
    pub status: String,
    #[n(1)]
    pub phase: CasePhase,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ApprovalRemark {
    #[n(0)]
    pub remark: String,
    #[n(1)]
    pub remark_dtm: TimeStamp,
    #[n(2)]
    pub remark_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct PendingApproval {
    #[n(0)]
    pub approver_id: ApproverId,
    #[n(1)]
    pub approver_reference: ApproverReference,
    #[n(2)]
    pub approver_type: ApproverType,
    #[n(3)]
    pub approve_status: History<ApproveStatusEntry>,
    #[n(4)]
    pub approved_delegated_by: UserId,
    #[n(5)]
    pub created_by: UserId,
    #[n(6)]
    pub created_dtm: TimeStamp,
    #[n(7)]
    pub remark: History<ApprovalRemark>,
    // status the case was in before the pending status was applied
    #[n(8)]
    pub rollback: Option<StatusSnapshot>,
    #[n(9)]
    pub case_phase: CasePhase,
}

impl PendingApproval {
    pub fn kind(&self) -> ApprovalKind {
        self.approver_type.kind()
    }

    pub fn current_status(&self) -> Option<ApproveStatus> {
        self.approve_status.latest().map(|e| e.status)
    }

    /// Derived from the last `approve_status` entry, never stored.
    pub fn is_open(&self) -> bool {
        self.current_status().is_some_and(|s| s.is_open())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub reference: ApproverReference,
    pub approver_type: ApproverType,
    pub requested_by: UserId,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn status(&self) -> ApproveStatus {
        match self {
            Decision::Approve => ApproveStatus::Approve,
            Decision::Reject => ApproveStatus::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub approval: PendingApproval,
    /// Set when the approval referenced a case.
    pub case: Option<Case>,
    /// Set when the approval referenced a batch.
    pub batch: Option<DistributionBatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalFilter {
    pub kind: Option<ApprovalKind>,
    pub delegate: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalSummary {
    pub approval: PendingApproval,
    /// Best-effort lookup, `None` when the case could not be read.
    pub case_current_status: Option<String>,
}

// Statuses a case only holds while an approval is open on it.
const APPROVAL_PENDING_STATUSES: &[&str] = &[
    status::PENDING_DRC_REASSIGN,
    status::PENDING_CASE_WITHDRAWAL,
    status::ABANDANED,
];

/// A decision with the phase of its target status already resolved.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Resolution {
    Approve(CasePhase),
    Reject,
}

/// Domain caps that must hold both when a request is filed and when it is
/// resolved, possibly much later.
fn check_case_invariants(
    approver_type: &ApproverType,
    case: &Case,
    limits: &Limits,
) -> Result<(), WorkflowError> {
    match approver_type {
        ApproverType::DrcReassign { drc_id, .. } => {
            if case.drc.len() >= limits.max_drc_assignments {
                return Err(WorkflowError::PreconditionFailed(format!(
                    "case {} already has {} DRC assignments",
                    case.case_id,
                    case.drc.len()
                )));
            }
            if case.monitor_months >= limits.max_monitor_months {
                return Err(WorkflowError::PreconditionFailed(format!(
                    "case {} has been monitored for {} months",
                    case.case_id, case.monitor_months
                )));
            }
            match case.current_drc() {
                None => Err(WorkflowError::PreconditionFailed(format!(
                    "case {} has no active DRC to re-assign",
                    case.case_id
                ))),
                Some(current) if current.drc_id == *drc_id => {
                    Err(WorkflowError::PreconditionFailed(format!(
                        "case {} is already assigned to DRC {drc_id}",
                        case.case_id
                    )))
                }
                Some(_) => Ok(()),
            }
        }
        ApproverType::Commission { .. } if case.settlement.is_empty() => {
            Err(WorkflowError::PreconditionFailed(format!(
                "case {} has no settlement to commission",
                case.case_id
            )))
        }
        _ => Ok(()),
    }
}

fn approve_update(
    approval: &PendingApproval,
    case: &Case,
    limits: &Limits,
    actor: &str,
    phase: CasePhase,
) -> Result<CaseUpdate, WorkflowError> {
    check_case_invariants(&approval.approver_type, case, limits)?;

    let kind = approval.kind();
    let ApprovalOutcome::CaseStatus(target) = approval.approver_type.outcome() else {
        return Err(ValidationError::SubjectMismatch {
            approver_type: kind.to_string(),
            reference: "case".to_string(),
        }
        .into());
    };

    let reason = format!("{kind} approved");
    let mut update = CaseUpdate::transition(actor, target, phase, reason.clone());
    if let Some(pending) = approval.approver_type.pending_status() {
        update = update.expecting(pending);
    }

    match &approval.approver_type {
        ApproverType::DrcReassign { drc_id, drc_name } => {
            update = update.with(SideEffect::AssignDrc {
                drc_id: *drc_id,
                drc_name: drc_name.clone(),
                batch_id: None,
            });
        }
        ApproverType::CaseWithdrawal | ApproverType::CaseAbandoned => {
            let remark = approval
                .remark
                .latest()
                .map(|r| r.remark.clone())
                .unwrap_or_else(|| reason.clone());
            update = update
                .with(SideEffect::CloseDrc {
                    remark: reason.clone(),
                })
                .with(SideEffect::AbnormalStop {
                    remark,
                    approver_type: kind.as_str().to_string(),
                });
        }
        _ => {}
    }
    Ok(update)
}

fn reject_update(
    approval: &PendingApproval,
    case: &Case,
    actor: &str,
) -> Result<CaseUpdate, WorkflowError> {
    let reason = format!("{} rejected", approval.kind());
    match approval.approver_type.pending_status() {
        Some(pending) if case.case_current_status == pending => {
            let missing = IntegrityError::MissingRollbackStatus {
                case_id: case.case_id,
            };
            if case.case_status.len() < 2 {
                return Err(missing.into());
            }
            let target = approval.rollback.as_ref().ok_or(missing)?;
            Ok(
                CaseUpdate::rollback(actor, target.status.clone(), target.phase, reason)
                    .expecting(pending),
            )
        }
        // the case moved on while the approval was open; leave its status alone
        _ => Ok(CaseUpdate::effects_only(actor)),
    }
}

fn interaction_parameters(
    approval_id: ApproverId,
    approval: &ApproverType,
    reference: ApproverReference,
) -> BTreeMap<String, String> {
    let mut params = approval.parameters();
    params.insert("approver_id".to_string(), approval_id.to_string());
    let key = match reference {
        ApproverReference::Case(_) => "case_id",
        ApproverReference::Batch(_) => "case_distribution_batch_id",
    };
    params.insert(key.to_string(), reference.id().to_string());
    params
}

impl CaseWorkflowService {
    pub fn approval(&self, approver_id: ApproverId) -> Result<PendingApproval, WorkflowError> {
        self.store().approval(approver_id)
    }

    /// File an approval against a case or batch and move the subject into its
    /// pending state, all in one unit.
    pub fn request_approval(
        &self,
        request: ApprovalRequest,
    ) -> Result<PendingApproval, WorkflowError> {
        let span = request_span("request_approval");
        let _guard = span.enter();

        require(&request.requested_by, "requested_by")?;
        request.approver_type.validate()?;
        request.approver_type.check_subject(request.reference)?;
        let kind = request.approver_type.kind();

        let (phase, billing_center) = match request.reference {
            ApproverReference::Case(case_id) => {
                let case = self.store().case(case_id)?;
                (case.case_current_phase, case.billing_center)
            }
            ApproverReference::Batch(batch_id) => {
                self.store().batch(batch_id)?;
                (CasePhase::Distribution, None)
            }
        };
        let delegate = self
            .collaborators
            .delegate_resolver
            .resolve_delegate(phase, kind, billing_center.as_deref())
            .map_err(|e| WorkflowError::collaborator("delegate resolver", e))?;
        let pending = match request.approver_type.pending_status() {
            Some(status) => Some((status, self.resolve_phase(status)?)),
            None => None,
        };

        let approval = self.store().transaction(|tx| {
            if let Some(existing) = tx.approval_for(request.reference, kind)? {
                if tx.approval(existing)?.is_open() {
                    return Err(WorkflowError::Conflict(format!(
                        "{} already has an open {kind}",
                        request.reference
                    ))
                    .into());
                }
            }

            let now = TimeStamp::now();
            let rollback = match request.reference {
                ApproverReference::Case(case_id) => {
                    let mut case = tx.case(case_id)?;
                    if case.case_current_phase != phase {
                        return Err(WorkflowError::Conflict(format!(
                            "case {case_id} changed phase while its delegate was resolved"
                        ))
                        .into());
                    }
                    if pending.is_some()
                        && APPROVAL_PENDING_STATUSES.contains(&case.case_current_status.as_str())
                    {
                        return Err(WorkflowError::Conflict(format!(
                            "case {case_id} is already `{}` awaiting another approval",
                            case.case_current_status
                        ))
                        .into());
                    }
                    check_case_invariants(&request.approver_type, &case, &self.limits)?;

                    match pending {
                        Some((pending_status, pending_phase)) => {
                            let snapshot = StatusSnapshot {
                                status: case.case_current_status.clone(),
                                phase: case.case_current_phase,
                            };
                            CaseUpdate::transition(
                                request.requested_by.clone(),
                                pending_status,
                                pending_phase,
                                format!("{kind} requested"),
                            )
                            .apply(&mut case, &self.limits, now)?;
                            tx.put_case(&case)?;
                            Some(snapshot)
                        }
                        None => None,
                    }
                }
                ApproverReference::Batch(batch_id) => {
                    let mut batch = tx.batch(batch_id)?;
                    if let ApproverType::DrcAssign { batch_seq } = request.approver_type {
                        batch.mark_approval_pending(batch_seq, &request.requested_by, now)?;
                    }
                    tx.put_batch(&batch)?;
                    None
                }
            };

            let approver_id = tx.next_id(CounterName::ApproverId)?;
            let log_id = self.log_interaction(
                tx,
                kind.as_str(),
                &delegate,
                &request.requested_by,
                ApproveStatus::Open.as_str(),
                interaction_parameters(approver_id, &request.approver_type, request.reference),
            )?;

            let mut remark = History::new();
            if let Some(text) = &request.remark {
                remark.push(ApprovalRemark {
                    remark: text.clone(),
                    remark_dtm: now,
                    remark_by: request.requested_by.clone(),
                });
            }
            let approval = PendingApproval {
                approver_id,
                approver_reference: request.reference,
                approver_type: request.approver_type.clone(),
                approve_status: History::with_first(ApproveStatusEntry {
                    status: ApproveStatus::Open,
                    status_date: now,
                    status_edit_by: request.requested_by.clone(),
                    interaction_log_id: Some(log_id),
                }),
                approved_delegated_by: delegate.clone(),
                created_by: request.requested_by.clone(),
                created_dtm: now,
                remark,
                rollback,
                case_phase: phase,
            };
            tx.put_approval(&approval)?;
            tx.index_approval(&approval)?;
            Ok(approval)
        })?;

        info!(
            approver_id = approval.approver_id,
            reference = %approval.approver_reference,
            approver_type = %kind,
            delegate = %approval.approved_delegated_by,
            "approval requested"
        );
        Ok(approval)
    }

    /// Approve or reject the open approval for `(reference, kind)`.
    ///
    /// The decision, the subject's update and the interaction log entry
    /// commit together. If any of them fails the approval stays open and the
    /// subject is untouched.
    pub fn resolve_approval(
        &self,
        reference: ApproverReference,
        kind: ApprovalKind,
        decision: Decision,
        actor: &str,
        remark: Option<&str>,
    ) -> Result<ResolveOutcome, WorkflowError> {
        let span = request_span("resolve_approval");
        let _guard = span.enter();

        require(actor, "actor")?;
        let approver_id = self
            .store()
            .approval_for(reference, kind)?
            .ok_or_else(|| WorkflowError::not_found("approval", format!("{reference}/{kind}")))?;
        let filed = self.store().approval(approver_id)?;
        if !filed.is_open() {
            return Err(WorkflowError::PreconditionFailed(format!(
                "approval {approver_id} is already resolved"
            )));
        }

        let resolution = match decision {
            Decision::Approve => {
                let target = match filed.approver_type.outcome() {
                    ApprovalOutcome::CaseStatus(target) => target,
                    ApprovalOutcome::BatchDistributed => status::OPEN_ASSIGN_AGENT,
                };
                Resolution::Approve(self.resolve_phase(target)?)
            }
            Decision::Reject => Resolution::Reject,
        };

        let outcome = self.store().transaction(|tx| {
            let now = TimeStamp::now();
            let mut approval = tx.approval(approver_id)?;
            if !approval.is_open() {
                return Err(WorkflowError::PreconditionFailed(format!(
                    "approval {approver_id} is already resolved"
                ))
                .into());
            }

            let record = CaseApproval {
                approver_id,
                approver_type: kind.as_str().to_string(),
                decision: decision.status(),
                approved_by: actor.to_string(),
                approved_dtm: now,
                remark: remark.map(str::to_string),
            };

            let (case, batch) = match approval.approver_reference {
                ApproverReference::Case(case_id) => {
                    let mut case = tx.case(case_id)?;
                    let update = match resolution {
                        Resolution::Approve(phase) => {
                            approve_update(&approval, &case, &self.limits, actor, phase)?
                        }
                        Resolution::Reject => reject_update(&approval, &case, actor)?,
                    };
                    update
                        .with(SideEffect::RecordApproval(record.clone()))
                        .apply(&mut case, &self.limits, now)?;
                    tx.put_case(&case)?;
                    (Some(case), None)
                }
                ApproverReference::Batch(batch_id) => {
                    let batch = self.settle_batch_approval(
                        tx,
                        batch_id,
                        &approval,
                        resolution,
                        &record,
                        now,
                    )?;
                    (None, Some(batch))
                }
            };

            let log_id = self.log_interaction(
                tx,
                kind.as_str(),
                &approval.approved_delegated_by,
                actor,
                decision.status().as_str(),
                interaction_parameters(
                    approver_id,
                    &approval.approver_type,
                    approval.approver_reference,
                ),
            )?;
            approval.approve_status.push(ApproveStatusEntry {
                status: decision.status(),
                status_date: now,
                status_edit_by: actor.to_string(),
                interaction_log_id: Some(log_id),
            });
            if let Some(text) = remark {
                approval.remark.push(ApprovalRemark {
                    remark: text.to_string(),
                    remark_dtm: now,
                    remark_by: actor.to_string(),
                });
            }
            tx.put_approval(&approval)?;

            Ok(ResolveOutcome {
                approval,
                case,
                batch,
            })
        })?;

        info!(
            approver_id,
            reference = %reference,
            approver_type = %kind,
            decision = decision.status().as_str(),
            "approval resolved"
        );
        Ok(outcome)
    }

    /// Record that the delegate has looked at an open approval.
    pub fn mark_seen(
        &self,
        approver_id: ApproverId,
        actor: &str,
    ) -> Result<PendingApproval, WorkflowError> {
        let span = request_span("mark_seen");
        let _guard = span.enter();

        require(actor, "actor")?;

        self.store().transaction(|tx| {
            let mut approval = tx.approval(approver_id)?;
            match approval.current_status() {
                Some(ApproveStatus::Open) => {
                    approval.approve_status.push(ApproveStatusEntry {
                        status: ApproveStatus::Seen,
                        status_date: TimeStamp::now(),
                        status_edit_by: actor.to_string(),
                        interaction_log_id: None,
                    });
                    tx.put_approval(&approval)?;
                    Ok(approval)
                }
                Some(ApproveStatus::Seen) => Ok(approval),
                _ => Err(WorkflowError::PreconditionFailed(format!(
                    "approval {approver_id} is already resolved"
                ))
                .into()),
            }
        })
    }

    /// Open (or seen) approvals, newest first.
    pub fn list_open_approvals(
        &self,
        filter: &ApprovalFilter,
    ) -> Result<Vec<ApprovalSummary>, WorkflowError> {
        let mut open: Vec<_> = self
            .store()
            .approvals()?
            .into_iter()
            .filter(|a| a.is_open())
            .filter(|a| filter.kind.is_none_or(|k| a.kind() == k))
            .filter(|a| {
                filter
                    .delegate
                    .as_ref()
                    .is_none_or(|d| &a.approved_delegated_by == d)
            })
            .collect();
        open.sort_by(|a, b| b.approver_id.cmp(&a.approver_id));

        Ok(open
            .into_iter()
            .map(|approval| {
                let case_current_status = match approval.approver_reference {
                    ApproverReference::Case(case_id) => match self.store().case(case_id) {
                        Ok(case) => Some(case.case_current_status),
                        Err(e) => {
                            warn!(case_id, error = %e, "could not enrich approval listing");
                            None
                        }
                    },
                    ApproverReference::Batch(_) => None,
                };
                ApprovalSummary {
                    approval,
                    case_current_status,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_kinds_parse_from_durable_names() {
        for kind in ApprovalKind::ALL {
            assert_eq!(kind.as_str().parse::<ApprovalKind>().unwrap(), kind);
        }
        assert!(matches!(
            "Case Teleport Approval".parse::<ApprovalKind>(),
            Err(ValidationError::UnknownApproverType(_))
        ));
    }

    #[test]
    fn approve_mapping_matches_status_table() {
        let reassign = ApproverType::DrcReassign {
            drc_id: 7,
            drc_name: "Acme".into(),
        };
        assert_eq!(
            reassign.outcome(),
            ApprovalOutcome::CaseStatus("Open assign agent")
        );
        assert_eq!(
            ApproverType::CaseWithdrawal.outcome(),
            ApprovalOutcome::CaseStatus("Case Withdrawed")
        );
        assert_eq!(
            ApproverType::CaseAbandoned.outcome(),
            ApprovalOutcome::CaseStatus("Case Abandoned")
        );
        assert_eq!(
            ApproverType::WriteOff.outcome(),
            ApprovalOutcome::CaseStatus("Pending Write Off")
        );
        assert_eq!(
            ApproverType::Commission { amount: 10 }.outcome(),
            ApprovalOutcome::CaseStatus("Commissioned")
        );
        assert_eq!(
            ApproverType::DrcAssign { batch_seq: 1 }.outcome(),
            ApprovalOutcome::BatchDistributed
        );
    }

    #[test]
    fn batch_approvals_only_reference_batches() {
        let assign = ApproverType::DrcAssign { batch_seq: 1 };
        assert!(assign.check_subject(ApproverReference::Batch(1)).is_ok());
        assert!(assign.check_subject(ApproverReference::Case(1)).is_err());
        assert!(
            ApproverType::WriteOff
                .check_subject(ApproverReference::Batch(1))
                .is_err()
        );
    }

    #[test]
    fn open_state_is_read_from_the_last_entry() {
        let now = TimeStamp::now();
        let entry = |status| ApproveStatusEntry {
            status,
            status_date: now,
            status_edit_by: "ops".into(),
            interaction_log_id: None,
        };
        let mut approval = PendingApproval {
            approver_id: 1,
            approver_reference: ApproverReference::Case(1),
            approver_type: ApproverType::WriteOff,
            approve_status: History::with_first(entry(ApproveStatus::Open)),
            approved_delegated_by: "mgr".into(),
            created_by: "ops".into(),
            created_dtm: now,
            remark: History::new(),
            rollback: None,
            case_phase: CasePhase::Negotiation,
        };
        assert!(approval.is_open());
        approval.approve_status.push(entry(ApproveStatus::Seen));
        assert!(approval.is_open());
        approval.approve_status.push(entry(ApproveStatus::Reject));
        assert!(!approval.is_open());

        let bytes = minicbor::to_vec(&approval).unwrap();
        let back: PendingApproval = minicbor::decode(&bytes).unwrap();
        assert_eq!(back, approval);
    }

    #[test]
    fn zero_commission_is_invalid() {
        assert!(matches!(
            ApproverType::Commission { amount: 0 }.validate(),
            Err(ValidationError::ZeroAmount)
        ));
    }
}
