//! Day-to-day recovery work on an assigned case: officers, negotiation,
//! requests, CPE collection, mediation board and settlements.
use tracing::info;

use crate::case::{
    Case, MediationBoardEntry, RoCpeCollect, RoNegotiation, RoRequest, Settlement,
};
use crate::collaborators::{Installment, SettlementPlanRequest};
use crate::error::{ValidationError, WorkflowError};
use crate::sequence::CounterName;
use crate::service::{CaseWorkflowService, request_span, require};
use crate::status::{self, require_whitelisted};
use crate::transition::{CaseUpdate, SideEffect};
use crate::types::{CaseId, DrcId, RoId, TimeStamp};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpeCollectRequest {
    pub telephone_no: String,
    pub cpe_model: String,
    pub serial_no: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediationBoardRequest {
    pub calling_dtm: Option<TimeStamp>,
    pub customer_available: bool,
    pub comment: String,
    pub agree_to_settle: Option<bool>,
    /// Must be a mediation board status.
    pub next_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementRequest {
    pub settlement_type: String,
    pub amount: u64,
    pub plan_installments: Vec<Installment>,
    pub remark: Option<String>,
}

/// The active DRC and its current officer, or a precondition failure.
fn active_assignment(case: &Case) -> Result<(DrcId, Option<RoId>), WorkflowError> {
    let drc = case.current_drc().ok_or_else(|| {
        WorkflowError::PreconditionFailed(format!("case {} has no active DRC", case.case_id))
    })?;
    Ok((drc.drc_id, drc.current_ro().map(|ro| ro.ro_id)))
}

impl CaseWorkflowService {
    /// Put `ro_id` in charge of the case under its active DRC. The first
    /// officer moves an "Open assign agent" case into negotiation.
    pub fn assign_recovery_officer(
        &self,
        case_id: CaseId,
        ro_id: RoId,
        actor: &str,
    ) -> Result<Case, WorkflowError> {
        let span = request_span("assign_recovery_officer");
        let _guard = span.enter();

        require(actor, "actor")?;
        let negotiation = self.resolve_phase(status::RO_NEGOTIATION)?;

        let case = self.store().transaction(|tx| {
            let mut case = tx.case(case_id)?;
            let (_, current_ro) = active_assignment(&case)?;
            if current_ro == Some(ro_id) {
                return Err(WorkflowError::PreconditionFailed(format!(
                    "officer {ro_id} already handles case {case_id}"
                ))
                .into());
            }

            let update = if case.case_current_status == status::OPEN_ASSIGN_AGENT {
                CaseUpdate::transition(
                    actor,
                    status::RO_NEGOTIATION,
                    negotiation,
                    "Recovery officer assigned",
                )
            } else {
                CaseUpdate::effects_only(actor)
            };
            update
                .with(SideEffect::AssignRecoveryOfficer {
                    ro_id,
                    removal_remark: "RO re-assigned".to_string(),
                })
                .apply(&mut case, &self.limits, TimeStamp::now())?;
            tx.put_case(&case)?;
            Ok(case)
        })?;

        info!(case_id, ro_id, status = %case.case_current_status, "recovery officer assigned");
        Ok(case)
    }

    pub fn record_negotiation(
        &self,
        case_id: CaseId,
        field_reason: &str,
        remark: Option<&str>,
        actor: &str,
    ) -> Result<Case, WorkflowError> {
        let span = request_span("record_negotiation");
        let _guard = span.enter();

        require(field_reason, "field_reason")?;
        require(actor, "actor")?;

        let case = self.store().transaction(|tx| {
            let mut case = tx.case(case_id)?;
            require_whitelisted(
                &case.case_current_status,
                status::NEGOTIATION_STATUSES,
                "negotiation",
            )?;
            let (drc_id, ro_id) = active_assignment(&case)?;
            let now = TimeStamp::now();
            CaseUpdate::effects_only(actor)
                .with(SideEffect::Negotiation(RoNegotiation {
                    drc_id,
                    ro_id,
                    field_reason: field_reason.to_string(),
                    remark: remark.map(str::to_string),
                    created_dtm: now,
                    created_by: actor.to_string(),
                }))
                .apply(&mut case, &self.limits, now)?;
            tx.put_case(&case)?;
            Ok(case)
        })?;

        info!(case_id, "negotiation recorded");
        Ok(case)
    }

    pub fn record_ro_request(
        &self,
        case_id: CaseId,
        request: &str,
        remark: Option<&str>,
        actor: &str,
    ) -> Result<Case, WorkflowError> {
        let span = request_span("record_ro_request");
        let _guard = span.enter();

        require(request, "request")?;
        require(actor, "actor")?;

        let case = self.store().transaction(|tx| {
            let mut case = tx.case(case_id)?;
            let (drc_id, ro_id) = active_assignment(&case)?;
            let now = TimeStamp::now();
            CaseUpdate::effects_only(actor)
                .with(SideEffect::Request(RoRequest {
                    drc_id,
                    ro_id,
                    request: request.to_string(),
                    remark: remark.map(str::to_string),
                    created_dtm: now,
                    created_by: actor.to_string(),
                }))
                .apply(&mut case, &self.limits, now)?;
            tx.put_case(&case)?;
            Ok(case)
        })?;

        info!(case_id, request, "officer request recorded");
        Ok(case)
    }

    pub fn record_cpe_collect(
        &self,
        case_id: CaseId,
        collect: CpeCollectRequest,
        actor: &str,
    ) -> Result<Case, WorkflowError> {
        let span = request_span("record_cpe_collect");
        let _guard = span.enter();

        require(&collect.telephone_no, "telephone_no")?;
        require(&collect.cpe_model, "cpe_model")?;
        require(&collect.serial_no, "serial_no")?;
        require(actor, "actor")?;

        let case = self.store().transaction(|tx| {
            let mut case = tx.case(case_id)?;
            let (drc_id, ro_id) = active_assignment(&case)?;
            let ro_cpe_collect_id = tx.next_id(CounterName::RoCpeCollectId)?;
            let now = TimeStamp::now();
            CaseUpdate::effects_only(actor)
                .with(SideEffect::CpeCollect(RoCpeCollect {
                    ro_cpe_collect_id,
                    drc_id,
                    ro_id,
                    telephone_no: collect.telephone_no.clone(),
                    cpe_model: collect.cpe_model.clone(),
                    serial_no: collect.serial_no.clone(),
                    collected_dtm: now,
                    created_by: actor.to_string(),
                }))
                .apply(&mut case, &self.limits, now)?;
            tx.put_case(&case)?;
            Ok(case)
        })?;

        info!(case_id, "CPE collection recorded");
        Ok(case)
    }

    pub fn forward_to_mediation_board(
        &self,
        case_id: CaseId,
        actor: &str,
    ) -> Result<Case, WorkflowError> {
        let span = request_span("forward_to_mediation_board");
        let _guard = span.enter();

        require(actor, "actor")?;
        let phase = self.resolve_phase(status::FORWARD_TO_MEDIATION_BOARD)?;

        let case = self.store().transaction(|tx| {
            let mut case = tx.case(case_id)?;
            require_whitelisted(
                &case.case_current_status,
                status::NEGOTIATION_STATUSES,
                "negotiation",
            )?;
            active_assignment(&case)?;
            CaseUpdate::transition(
                actor,
                status::FORWARD_TO_MEDIATION_BOARD,
                phase,
                "Forwarded to mediation board",
            )
            .apply(&mut case, &self.limits, TimeStamp::now())?;
            tx.put_case(&case)?;
            Ok(case)
        })?;

        info!(case_id, "case forwarded to mediation board");
        Ok(case)
    }

    pub fn record_mediation_board(
        &self,
        case_id: CaseId,
        request: MediationBoardRequest,
        actor: &str,
    ) -> Result<Case, WorkflowError> {
        let span = request_span("record_mediation_board");
        let _guard = span.enter();

        require(&request.comment, "comment")?;
        require(actor, "actor")?;
        require_whitelisted(
            &request.next_status,
            status::MEDIATION_BOARD_STATUSES,
            "mediation board",
        )?;
        let phase = self.resolve_phase(&request.next_status)?;

        let case = self.store().transaction(|tx| {
            let mut case = tx.case(case_id)?;
            require_whitelisted(
                &case.case_current_status,
                status::MEDIATION_BOARD_STATUSES,
                "mediation board",
            )?;
            let (drc_id, ro_id) = active_assignment(&case)?;
            let now = TimeStamp::now();
            CaseUpdate::transition(
                actor,
                request.next_status.clone(),
                phase,
                "Mediation board session",
            )
            .with(SideEffect::MediationBoard(MediationBoardEntry {
                drc_id,
                ro_id,
                calling_dtm: request.calling_dtm,
                customer_available: request.customer_available,
                comment: request.comment.clone(),
                agree_to_settle: request.agree_to_settle,
                status: request.next_status.clone(),
                created_dtm: now,
                created_by: actor.to_string(),
            }))
            .apply(&mut case, &self.limits, now)?;
            tx.put_case(&case)?;
            Ok(case)
        })?;

        info!(case_id, status = %case.case_current_status, "mediation board session recorded");
        Ok(case)
    }

    /// Create a settlement plan for a negotiating case.
    ///
    /// The settlement service is called first with a freshly allocated
    /// `settlement_request_id`; a caller retrying after a failure gets a new
    /// id, so the service must treat an unseen id as a new plan. The case is
    /// then moved to its phase's "settle pending" status in one unit, provided
    /// it has not changed status in the meantime.
    pub fn create_settlement(
        &self,
        case_id: CaseId,
        request: SettlementRequest,
        actor: &str,
    ) -> Result<Case, WorkflowError> {
        let span = request_span("create_settlement");
        let _guard = span.enter();

        require(&request.settlement_type, "settlement_type")?;
        require(actor, "actor")?;
        if request.amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }

        let before = self.store().case(case_id)?;
        let pending = status::settle_pending_status(before.case_current_phase).ok_or_else(|| {
            WorkflowError::PreconditionFailed(format!(
                "case {case_id} is in phase {} and cannot be settled",
                before.case_current_phase
            ))
        })?;
        let (drc_id, ro_id) = active_assignment(&before)?;
        let pending_phase = self.resolve_phase(pending)?;

        let settlement_request_id = self
            .store()
            .sequences()
            .next(CounterName::SettlementRequestId)?;
        let plan = SettlementPlanRequest {
            settlement_request_id,
            created_by: actor.to_string(),
            case_phase: before.case_current_phase,
            case_status: before.case_current_status.clone(),
            settlement_type: request.settlement_type.clone(),
            amount: request.amount,
            drc_id: Some(drc_id),
            plan_installments: request.plan_installments.clone(),
            case_id,
            ro_id,
            remark: request.remark.clone(),
        };
        let settlement_id = self
            .collaborators
            .settlement_creator
            .create_plan(&plan)
            .map_err(|e| WorkflowError::collaborator("settlement plan creator", e))?;

        let case = self.store().transaction(|tx| {
            let mut case = tx.case(case_id)?;
            let now = TimeStamp::now();
            CaseUpdate::transition(actor, pending, pending_phase, "Settlement plan created")
                .expecting(before.case_current_status.clone())
                .with(SideEffect::Settlement(Settlement {
                    settlement_id,
                    settlement_request_id,
                    drc_id: Some(drc_id),
                    ro_id,
                    settlement_type: request.settlement_type.clone(),
                    amount: request.amount,
                    phase: before.case_current_phase,
                    created_dtm: now,
                    created_by: actor.to_string(),
                }))
                .apply(&mut case, &self.limits, now)?;
            tx.put_case(&case)?;
            Ok(case)
        })?;

        info!(case_id, settlement_id, settlement_request_id, "settlement created");
        Ok(case)
    }

    /// Add one month to the monitoring period of the active DRC assignment.
    pub fn extend_monitoring(&self, case_id: CaseId, actor: &str) -> Result<Case, WorkflowError> {
        let span = request_span("extend_monitoring");
        let _guard = span.enter();

        require(actor, "actor")?;
        let update = CaseUpdate::effects_only(actor).with(SideEffect::ExtendMonitoring);
        let case = self.update_case(case_id, &update)?;
        info!(case_id, monitor_months = case.monitor_months, "monitoring extended");
        Ok(case)
    }
}
