//! Batch distribution of new cases to DRCs.
//!
//! A batch groups the "Open No Agent" cases of one commission rule and
//! arrears band and allocates them across DRCs. Every distribution or
//! amendment appends a `batch_seq_details` entry numbered from the batch's own
//! history; cases are only touched when the batch's DRC Assign approval is
//! approved.
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use tracing::info;

use crate::approval::{
    ApprovalKind, ApprovalRequest, ApproverReference, ApproverType, Decision, PendingApproval,
    Resolution, ResolveOutcome,
};
use crate::case::{Case, CaseApproval};
use crate::collaborators::TaskRequest;
use crate::error::{ValidationError, WorkflowError};
use crate::history::History;
use crate::sequence::CounterName;
use crate::service::{CaseWorkflowService, request_span, require};
use crate::status;
use crate::store::{StoreTx, TxResult};
use crate::transition::{CaseUpdate, SideEffect};
use crate::types::{BatchId, CaseId, DrcId, TimeStamp, UserId};

const DISTRIBUTION_SUMMARY_TASK: &str = "Create Case distribution DRC Summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum BatchStatus {
    #[n(0)]
    Open,
    #[n(1)]
    ForwardDistribute,
    #[n(2)]
    Amend,
    #[n(3)]
    ApprovalPending,
    #[n(4)]
    Distributed,
    #[n(5)]
    Rejected,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Open => "Open",
            BatchStatus::ForwardDistribute => "batch_forword_distribute",
            BatchStatus::Amend => "batch_amend",
            BatchStatus::ApprovalPending => "batch_approval_pending",
            BatchStatus::Distributed => "batch_distributed",
            BatchStatus::Rejected => "batch_rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Distributed | BatchStatus::Rejected)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum BatchAction {
    #[n(0)]
    Distribution,
    #[n(1)]
    Amend,
}

impl BatchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchAction::Distribution => "distribution",
            BatchAction::Amend => "amend",
        }
    }
}

/// The cases one DRC receives.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct DrcAllocation {
    #[n(0)]
    pub drc_id: DrcId,
    #[n(1)]
    pub drc_name: String,
    #[n(2)]
    pub case_ids: Vec<CaseId>,
}

/// One change to an allocation.
///
/// With both DRCs set the cases move from minus to plus. With only a plus DRC
/// the cases join the batch; with only a minus DRC they leave it.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ExchangeDetail {
    #[n(0)]
    pub plus_drc_id: Option<DrcId>,
    #[n(1)]
    pub plus_drc_name: Option<String>,
    #[n(2)]
    pub minus_drc_id: Option<DrcId>,
    #[n(3)]
    pub case_ids: Vec<CaseId>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct BatchSeqDetail {
    #[n(0)]
    pub batch_seq: u32,
    #[n(1)]
    pub action_type: BatchAction,
    /// Allocation in force after this action.
    #[n(2)]
    pub distribution_details: Vec<DrcAllocation>,
    #[n(3)]
    pub exchange_details: Vec<ExchangeDetail>,
    #[n(4)]
    pub created_by: UserId,
    #[n(5)]
    pub created_dtm: TimeStamp,
    #[n(6)]
    pub batch_seq_rulebase_count: u64,
    #[n(7)]
    pub rulebase_count_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct BatchStatusEntry {
    #[n(0)]
    pub status: BatchStatus,
    #[n(1)]
    pub created_by: UserId,
    #[n(2)]
    pub created_dtm: TimeStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct DistributionBatch {
    #[n(0)]
    pub case_distribution_batch_id: BatchId,
    #[n(1)]
    pub drc_commission_rule: String,
    #[n(2)]
    pub current_arrears_band: String,
    #[n(3)]
    pub rulebase_count: u64,
    #[n(4)]
    pub batch_seq_details: History<BatchSeqDetail>,
    #[n(5)]
    pub distribution_status: History<BatchStatusEntry>,
    #[n(6)]
    pub current_batch_distribution_status: BatchStatus,
    #[n(7)]
    pub created_by: UserId,
    #[n(8)]
    pub created_dtm: TimeStamp,
}

/// Input for opening a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRequest {
    pub drc_commission_rule: String,
    pub arrears_band: String,
    pub distribution_details: Vec<DrcAllocation>,
}

struct Exchanged {
    allocation: Vec<DrcAllocation>,
    added: Vec<CaseId>,
}

fn case_count(allocation: &[DrcAllocation]) -> u64 {
    allocation.iter().map(|a| a.case_ids.len() as u64).sum()
}

fn validate_allocation(allocation: &[DrcAllocation]) -> Result<(), ValidationError> {
    if allocation.is_empty() {
        return Err(ValidationError::MissingField("distribution_details"));
    }
    let mut seen = HashSet::new();
    for slot in allocation {
        require(&slot.drc_name, "drc_name")?;
        if slot.case_ids.is_empty() {
            return Err(ValidationError::MissingField("case_ids"));
        }
        for id in &slot.case_ids {
            if !seen.insert(*id) {
                return Err(ValidationError::DuplicateCase(*id));
            }
        }
    }
    Ok(())
}

fn apply_exchanges(
    current: &[DrcAllocation],
    exchanges: &[ExchangeDetail],
) -> Result<Exchanged, ValidationError> {
    let mut allocation = current.to_vec();
    let mut added = Vec::new();

    for exchange in exchanges {
        if exchange.case_ids.is_empty() {
            return Err(ValidationError::InvalidExchange(
                "exchange moves no cases".to_string(),
            ));
        }
        let mut distinct = HashSet::new();
        for id in &exchange.case_ids {
            if !distinct.insert(*id) {
                return Err(ValidationError::DuplicateCase(*id));
            }
        }

        if let Some(minus) = exchange.minus_drc_id {
            let slot = allocation
                .iter_mut()
                .find(|a| a.drc_id == minus)
                .ok_or_else(|| {
                    ValidationError::InvalidExchange(format!(
                        "DRC {minus} holds no cases in this batch"
                    ))
                })?;
            for id in &exchange.case_ids {
                let pos = slot.case_ids.iter().position(|c| c == id).ok_or_else(|| {
                    ValidationError::InvalidExchange(format!(
                        "case {id} is not allocated to DRC {minus}"
                    ))
                })?;
                slot.case_ids.remove(pos);
            }
        }

        match (exchange.plus_drc_id, exchange.minus_drc_id) {
            (None, None) => {
                return Err(ValidationError::InvalidExchange(
                    "exchange names neither a plus nor a minus DRC".to_string(),
                ));
            }
            (None, Some(_)) => {}
            (Some(plus), minus) => {
                if minus.is_none() {
                    for id in &exchange.case_ids {
                        if allocation.iter().any(|a| a.case_ids.contains(id)) {
                            return Err(ValidationError::DuplicateCase(*id));
                        }
                    }
                    added.extend(exchange.case_ids.iter().copied());
                }
                match allocation.iter_mut().find(|a| a.drc_id == plus) {
                    Some(slot) => slot.case_ids.extend(exchange.case_ids.iter().copied()),
                    None => {
                        let drc_name = exchange
                            .plus_drc_name
                            .clone()
                            .filter(|n| !n.trim().is_empty())
                            .ok_or_else(|| {
                                ValidationError::InvalidExchange(format!("DRC {plus} needs a name"))
                            })?;
                        allocation.push(DrcAllocation {
                            drc_id: plus,
                            drc_name,
                            case_ids: exchange.case_ids.clone(),
                        });
                    }
                }
            }
        }
    }

    allocation.retain(|a| !a.case_ids.is_empty());
    Ok(Exchanged { allocation, added })
}

/// A case may join a batch only while undistributed and in the batch's cohort.
fn check_distributable(case: &Case, batch: &DistributionBatch) -> Result<(), WorkflowError> {
    if case.case_current_status != status::OPEN_NO_AGENT {
        return Err(WorkflowError::PreconditionFailed(format!(
            "case {} is `{}`, only `{}` cases can be distributed",
            case.case_id,
            case.case_current_status,
            status::OPEN_NO_AGENT
        )));
    }
    if case.drc_commission_rule != batch.drc_commission_rule
        || case.arrears_band != batch.current_arrears_band
    {
        return Err(WorkflowError::PreconditionFailed(format!(
            "case {} belongs to ({}, {}), not ({}, {})",
            case.case_id,
            case.drc_commission_rule,
            case.arrears_band,
            batch.drc_commission_rule,
            batch.current_arrears_band
        )));
    }
    Ok(())
}

impl DistributionBatch {
    pub fn status(&self) -> BatchStatus {
        self.current_batch_distribution_status
    }

    pub fn latest_seq(&self) -> Option<&BatchSeqDetail> {
        self.batch_seq_details.latest()
    }

    /// Revision number of the latest distribution or amendment.
    pub fn batch_seq(&self) -> u32 {
        self.latest_seq().map(|s| s.batch_seq).unwrap_or(0)
    }

    pub fn current_allocation(&self) -> &[DrcAllocation] {
        self.latest_seq()
            .map(|s| s.distribution_details.as_slice())
            .unwrap_or_default()
    }

    fn set_status(&mut self, status: BatchStatus, actor: &str, at: TimeStamp) {
        self.distribution_status.push(BatchStatusEntry {
            status,
            created_by: actor.to_string(),
            created_dtm: at,
        });
        self.current_batch_distribution_status = status;
    }

    fn require_status(&self, allowed: &[BatchStatus], action: &str) -> Result<(), WorkflowError> {
        if allowed.contains(&self.status()) {
            return Ok(());
        }
        Err(WorkflowError::PreconditionFailed(format!(
            "batch {} is `{}` and cannot {action}",
            self.case_distribution_batch_id,
            self.status()
        )))
    }

    fn push_seq(
        &mut self,
        action_type: BatchAction,
        allocation: Vec<DrcAllocation>,
        exchange_details: Vec<ExchangeDetail>,
        actor: &str,
        at: TimeStamp,
    ) -> u32 {
        let batch_seq = self.batch_seq() + 1;
        let count = case_count(&allocation);
        let delta = count as i64 - self.rulebase_count as i64;
        self.batch_seq_details.push(BatchSeqDetail {
            batch_seq,
            action_type,
            distribution_details: allocation,
            exchange_details,
            created_by: actor.to_string(),
            created_dtm: at,
            batch_seq_rulebase_count: count,
            rulebase_count_delta: delta,
        });
        self.rulebase_count = count;
        batch_seq
    }

    pub(crate) fn mark_approval_pending(
        &mut self,
        batch_seq: u32,
        actor: &str,
        at: TimeStamp,
    ) -> Result<(), WorkflowError> {
        self.require_status(
            &[BatchStatus::ForwardDistribute, BatchStatus::Amend],
            "be forwarded for approval",
        )?;
        if batch_seq != self.batch_seq() {
            return Err(WorkflowError::PreconditionFailed(format!(
                "batch {} is at seq {}, not {batch_seq}",
                self.case_distribution_batch_id,
                self.batch_seq()
            )));
        }
        self.set_status(BatchStatus::ApprovalPending, actor, at);
        Ok(())
    }
}

impl CaseWorkflowService {
    pub fn batch(&self, batch_id: BatchId) -> Result<DistributionBatch, WorkflowError> {
        self.store().batch(batch_id)
    }

    /// Open a batch for a `(rule, band)` cohort. Only one batch per cohort may
    /// be in flight.
    pub fn open_batch(
        &self,
        request: BatchRequest,
        actor: &str,
    ) -> Result<DistributionBatch, WorkflowError> {
        let span = request_span("open_batch");
        let _guard = span.enter();

        require(&request.drc_commission_rule, "drc_commission_rule")?;
        require(&request.arrears_band, "arrears_band")?;
        require(actor, "actor")?;
        validate_allocation(&request.distribution_details)?;

        let batch = self.store().transaction(|tx| {
            let rule = &request.drc_commission_rule;
            let band = &request.arrears_band;
            if let Some(existing) = tx.cohort_batch(rule, band)? {
                let existing = tx.batch(existing)?;
                if !existing.status().is_terminal() {
                    return Err(WorkflowError::Conflict(format!(
                        "batch {} for ({rule}, {band}) is still `{}`",
                        existing.case_distribution_batch_id,
                        existing.status()
                    ))
                    .into());
                }
            }

            let now = TimeStamp::now();
            let batch_id = tx.next_id(CounterName::CaseDistributionBatchId)?;
            let mut batch = DistributionBatch {
                case_distribution_batch_id: batch_id,
                drc_commission_rule: rule.clone(),
                current_arrears_band: band.clone(),
                rulebase_count: 0,
                batch_seq_details: History::new(),
                distribution_status: History::new(),
                current_batch_distribution_status: BatchStatus::Open,
                created_by: actor.to_string(),
                created_dtm: now,
            };
            for slot in &request.distribution_details {
                for case_id in &slot.case_ids {
                    check_distributable(&tx.case(*case_id)?, &batch)?;
                }
            }

            batch.push_seq(
                BatchAction::Distribution,
                request.distribution_details.clone(),
                vec![],
                actor,
                now,
            );
            batch.set_status(BatchStatus::Open, actor, now);
            tx.put_batch(&batch)?;
            tx.set_cohort_batch(rule, band, batch_id)?;
            Ok(batch)
        })?;

        info!(
            batch_id = batch.case_distribution_batch_id,
            rule = %batch.drc_commission_rule,
            band = %batch.current_arrears_band,
            cases = batch.rulebase_count,
            "distribution batch opened"
        );
        Ok(batch)
    }

    /// Apply DRC exchanges and record them as the next batch seq.
    pub fn amend_batch(
        &self,
        batch_id: BatchId,
        exchanges: Vec<ExchangeDetail>,
        actor: &str,
    ) -> Result<u32, WorkflowError> {
        let span = request_span("amend_batch");
        let _guard = span.enter();

        require(actor, "actor")?;
        if exchanges.is_empty() {
            return Err(ValidationError::MissingField("exchange_details").into());
        }

        let batch_seq = self.store().transaction(|tx| {
            let mut batch = tx.batch(batch_id)?;
            batch.require_status(
                &[BatchStatus::Open, BatchStatus::ForwardDistribute, BatchStatus::Amend],
                "be amended",
            )?;
            let exchanged = apply_exchanges(batch.current_allocation(), &exchanges)?;
            if exchanged.allocation.is_empty() {
                return Err(ValidationError::InvalidExchange(
                    "amendment leaves the batch empty".to_string(),
                )
                .into());
            }
            for case_id in &exchanged.added {
                check_distributable(&tx.case(*case_id)?, &batch)?;
            }

            let now = TimeStamp::now();
            let batch_seq = batch.push_seq(
                BatchAction::Amend,
                exchanged.allocation,
                exchanges.clone(),
                actor,
                now,
            );
            if batch.status() != BatchStatus::Open {
                batch.set_status(BatchStatus::Open, actor, now);
            }
            tx.put_batch(&batch)?;
            Ok(batch_seq)
        })?;

        info!(batch_id, batch_seq, "distribution batch amended");
        Ok(batch_seq)
    }

    /// Mark an open batch ready to be forwarded for approval.
    pub fn submit_batch(
        &self,
        batch_id: BatchId,
        actor: &str,
    ) -> Result<DistributionBatch, WorkflowError> {
        let span = request_span("submit_batch");
        let _guard = span.enter();

        require(actor, "actor")?;

        let batch = self.store().transaction(|tx| {
            let mut batch = tx.batch(batch_id)?;
            batch.require_status(&[BatchStatus::Open], "be submitted")?;
            let next = match batch.latest_seq().map(|s| s.action_type) {
                Some(BatchAction::Amend) => BatchStatus::Amend,
                _ => BatchStatus::ForwardDistribute,
            };
            batch.set_status(next, actor, TimeStamp::now());
            tx.put_batch(&batch)?;
            Ok(batch)
        })?;

        info!(batch_id, status = %batch.status(), "distribution batch submitted");
        Ok(batch)
    }

    /// File the DRC Assign approval that gates distribution.
    pub fn forward_batch_for_approval(
        &self,
        batch_id: BatchId,
        actor: &str,
        remark: Option<&str>,
    ) -> Result<PendingApproval, WorkflowError> {
        let batch = self.store().batch(batch_id)?;
        self.request_approval(ApprovalRequest {
            reference: ApproverReference::Batch(batch_id),
            approver_type: ApproverType::DrcAssign {
                batch_seq: batch.batch_seq(),
            },
            requested_by: actor.to_string(),
            remark: remark.map(str::to_string),
        })
    }

    /// Approve the batch's pending DRC Assign approval and distribute it.
    pub fn proceed_batch(
        &self,
        batch_id: BatchId,
        actor: &str,
        remark: Option<&str>,
    ) -> Result<ResolveOutcome, WorkflowError> {
        self.resolve_approval(
            ApproverReference::Batch(batch_id),
            ApprovalKind::DrcAssign,
            Decision::Approve,
            actor,
            remark,
        )
    }

    /// Reject a batch. A pending DRC Assign approval is resolved as rejected;
    /// otherwise any non-terminal batch is rejected directly.
    pub fn reject_batch(
        &self,
        batch_id: BatchId,
        actor: &str,
        remark: Option<&str>,
    ) -> Result<DistributionBatch, WorkflowError> {
        let span = request_span("reject_batch");
        let _guard = span.enter();

        require(actor, "actor")?;

        let reference = ApproverReference::Batch(batch_id);
        let awaiting_approval = match self
            .store()
            .approval_for(reference, ApprovalKind::DrcAssign)?
        {
            Some(approver_id) => self.store().approval(approver_id)?.is_open(),
            None => false,
        };
        if awaiting_approval {
            let outcome = self.resolve_approval(
                reference,
                ApprovalKind::DrcAssign,
                Decision::Reject,
                actor,
                remark,
            )?;
            return outcome
                .batch
                .ok_or_else(|| WorkflowError::not_found("batch", batch_id));
        }

        let batch = self.store().transaction(|tx| {
            let mut batch = tx.batch(batch_id)?;
            batch.require_status(
                &[BatchStatus::Open, BatchStatus::ForwardDistribute, BatchStatus::Amend],
                "be rejected",
            )?;
            batch.set_status(BatchStatus::Rejected, actor, TimeStamp::now());
            tx.put_batch(&batch)?;
            Ok(batch)
        })?;

        info!(batch_id, "distribution batch rejected");
        Ok(batch)
    }

    /// Batches whose latest status entry is `batch_rejected`.
    pub fn list_rejected_batches(&self) -> Result<Vec<DistributionBatch>, WorkflowError> {
        Ok(self
            .store()
            .batches()?
            .into_iter()
            .filter(|b| {
                b.distribution_status
                    .latest()
                    .is_some_and(|e| e.status == BatchStatus::Rejected)
            })
            .collect())
    }

    /// Batch side of resolving a DRC Assign approval. Runs inside the
    /// resolving transaction.
    pub(crate) fn settle_batch_approval(
        &self,
        tx: &StoreTx<'_>,
        batch_id: BatchId,
        approval: &PendingApproval,
        resolution: Resolution,
        record: &CaseApproval,
        now: TimeStamp,
    ) -> TxResult<DistributionBatch> {
        let actor = record.approved_by.as_str();
        let mut batch = tx.batch(batch_id)?;
        batch.require_status(&[BatchStatus::ApprovalPending], "settle its approval")?;

        match resolution {
            Resolution::Approve(phase) => {
                if let ApproverType::DrcAssign { batch_seq } = approval.approver_type {
                    if batch_seq != batch.batch_seq() {
                        return Err(WorkflowError::PreconditionFailed(format!(
                            "approval {} covers seq {batch_seq}, batch {batch_id} is at {}",
                            approval.approver_id,
                            batch.batch_seq()
                        ))
                        .into());
                    }
                }

                for slot in batch.current_allocation() {
                    for case_id in &slot.case_ids {
                        let mut case = tx.case(*case_id)?;
                        CaseUpdate::transition(
                            actor,
                            status::OPEN_ASSIGN_AGENT,
                            phase,
                            format!("Distributed by batch {batch_id}"),
                        )
                        .expecting(status::OPEN_NO_AGENT)
                        .with(SideEffect::AssignDrc {
                            drc_id: slot.drc_id,
                            drc_name: slot.drc_name.clone(),
                            batch_id: Some(batch_id),
                        })
                        .with(SideEffect::RecordApproval(record.clone()))
                        .apply(&mut case, &self.limits, now)?;
                        tx.put_case(&case)?;
                    }
                }
                batch.set_status(BatchStatus::Distributed, actor, now);

                let mut parameters = BTreeMap::new();
                parameters.insert("case_distribution_batch_id".to_string(), batch_id.to_string());
                parameters.insert(
                    "drc_commission_rule".to_string(),
                    batch.drc_commission_rule.clone(),
                );
                parameters.insert(
                    "current_arrears_band".to_string(),
                    batch.current_arrears_band.clone(),
                );
                parameters.insert("batch_seq".to_string(), batch.batch_seq().to_string());
                self.collaborators
                    .task_creator
                    .create_task(&TaskRequest {
                        template_task_id: self.tasks.distribution_summary_template_id,
                        task_type: DISTRIBUTION_SUMMARY_TASK.to_string(),
                        created_by: actor.to_string(),
                        parameters,
                    })
                    .map_err(|e| WorkflowError::collaborator("task creator", e))?;
            }
            Resolution::Reject => batch.set_status(BatchStatus::Rejected, actor, now),
        }

        tx.put_batch(&batch)?;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(drc_id: DrcId, case_ids: &[CaseId]) -> DrcAllocation {
        DrcAllocation {
            drc_id,
            drc_name: format!("DRC {drc_id}"),
            case_ids: case_ids.to_vec(),
        }
    }

    fn empty_batch() -> DistributionBatch {
        DistributionBatch {
            case_distribution_batch_id: 1,
            drc_commission_rule: "PEO TV".into(),
            current_arrears_band: "AB-5_10".into(),
            rulebase_count: 0,
            batch_seq_details: History::new(),
            distribution_status: History::new(),
            current_batch_distribution_status: BatchStatus::Open,
            created_by: "ops".into(),
            created_dtm: TimeStamp::now(),
        }
    }

    #[test]
    fn exchange_moves_cases_between_drcs() {
        let current = vec![slot(1, &[10, 11]), slot(2, &[12])];
        let out = apply_exchanges(
            &current,
            &[ExchangeDetail {
                plus_drc_id: Some(2),
                minus_drc_id: Some(1),
                case_ids: vec![11],
                ..ExchangeDetail::default()
            }],
        )
        .unwrap();

        assert_eq!(out.allocation, vec![slot(1, &[10]), slot(2, &[12, 11])]);
        assert!(out.added.is_empty());
    }

    #[test]
    fn exchange_adds_and_drops_cases() {
        let current = vec![slot(1, &[10, 11])];
        let out = apply_exchanges(
            &current,
            &[
                ExchangeDetail {
                    minus_drc_id: Some(1),
                    case_ids: vec![10, 11],
                    ..ExchangeDetail::default()
                },
                ExchangeDetail {
                    plus_drc_id: Some(3),
                    plus_drc_name: Some("DRC 3".into()),
                    case_ids: vec![20],
                    ..ExchangeDetail::default()
                },
            ],
        )
        .unwrap();

        assert_eq!(out.allocation, vec![slot(3, &[20])]);
        assert_eq!(out.added, vec![20]);
    }

    #[test]
    fn invalid_exchanges_are_refused() {
        let current = vec![slot(1, &[10])];
        let moving_foreign_case = ExchangeDetail {
            plus_drc_id: Some(2),
            plus_drc_name: Some("DRC 2".into()),
            minus_drc_id: Some(1),
            case_ids: vec![99],
        };
        assert!(matches!(
            apply_exchanges(&current, &[moving_foreign_case]),
            Err(ValidationError::InvalidExchange(_))
        ));

        let adding_allocated_case = ExchangeDetail {
            plus_drc_id: Some(1),
            case_ids: vec![10],
            ..ExchangeDetail::default()
        };
        assert!(matches!(
            apply_exchanges(&current, &[adding_allocated_case]),
            Err(ValidationError::DuplicateCase(10))
        ));

        let unnamed_new_drc = ExchangeDetail {
            plus_drc_id: Some(5),
            case_ids: vec![30],
            ..ExchangeDetail::default()
        };
        assert!(apply_exchanges(&current, &[unnamed_new_drc]).is_err());
        assert!(apply_exchanges(&current, &[ExchangeDetail::default()]).is_err());
    }

    #[test]
    fn seq_numbers_come_from_the_batch_history() {
        let mut batch = empty_batch();
        let now = TimeStamp::now();
        assert_eq!(
            batch.push_seq(BatchAction::Distribution, vec![slot(1, &[1, 2])], vec![], "ops", now),
            1
        );
        assert_eq!(
            batch.push_seq(BatchAction::Amend, vec![slot(1, &[1, 2, 3])], vec![], "ops", now),
            2
        );
        assert_eq!(
            batch.push_seq(BatchAction::Amend, vec![slot(1, &[1])], vec![], "ops", now),
            3
        );

        let seqs: Vec<_> = batch.batch_seq_details.iter().map(|s| s.batch_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        let last = batch.latest_seq().unwrap();
        assert_eq!(last.batch_seq_rulebase_count, 1);
        assert_eq!(last.rulebase_count_delta, -2);
        assert_eq!(batch.rulebase_count, 1);
    }

    #[test]
    fn duplicate_cases_in_an_allocation_are_invalid() {
        assert!(matches!(
            validate_allocation(&[slot(1, &[1, 2]), slot(2, &[2])]),
            Err(ValidationError::DuplicateCase(2))
        ));
        assert!(validate_allocation(&[]).is_err());
    }

    #[test]
    fn only_forwardable_batches_go_pending() {
        let mut batch = empty_batch();
        let now = TimeStamp::now();
        batch.push_seq(BatchAction::Distribution, vec![slot(1, &[1])], vec![], "ops", now);

        assert!(batch.mark_approval_pending(1, "ops", now).is_err());

        batch.set_status(BatchStatus::ForwardDistribute, "ops", now);
        assert!(batch.mark_approval_pending(2, "ops", now).is_err());
        batch.mark_approval_pending(1, "ops", now).unwrap();
        assert_eq!(batch.status(), BatchStatus::ApprovalPending);
    }
}
