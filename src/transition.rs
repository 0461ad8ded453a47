//! Status transition engine.
//!
//! A [`CaseUpdate`] is validated in full against the loaded case before any
//! field is touched, then applied: side effects first, then one appended
//! `case_status` entry and the matching projection fields. Callers run it
//! inside a store transaction and write the case back only on success, so a
//! rejected update never reaches storage.
use crate::case::{
    AbnormalStop, Case, CaseApproval, CaseStatusEntry, DrcAssignment, MediationBoardEntry,
    RecoveryOfficerAssignment, RoCpeCollect, RoNegotiation, RoRequest, Settlement,
};
use crate::config::Limits;
use crate::error::{IntegrityError, ValidationError, WorkflowError};
use crate::status::CasePhase;
use crate::types::{BatchId, DrcId, RoId, TimeStamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// A normal move, checked against the phase graph.
    Forward,
    /// Restores a status recorded earlier, e.g. when an approval is rejected.
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub status: String,
    pub phase: CasePhase,
    pub reason: String,
    pub kind: TransitionKind,
}

/// Extra appends made in the same unit as a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Closes the current DRC (and its officer) and appends a new active one.
    AssignDrc {
        drc_id: DrcId,
        drc_name: String,
        batch_id: Option<BatchId>,
    },
    /// Closes the current DRC, if any.
    CloseDrc { remark: String },
    /// Closes the current officer of the active DRC and appends `ro_id`.
    AssignRecoveryOfficer { ro_id: RoId, removal_remark: String },
    AbnormalStop { remark: String, approver_type: String },
    RecordApproval(CaseApproval),
    Negotiation(RoNegotiation),
    MediationBoard(MediationBoardEntry),
    Request(RoRequest),
    CpeCollect(RoCpeCollect),
    Settlement(Settlement),
    ExtendMonitoring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseUpdate {
    pub actor: UserId,
    pub transition: Option<Transition>,
    pub effects: Vec<SideEffect>,
    /// Refuse the update unless the case is still in this status.
    pub expected_status: Option<String>,
}

impl CaseUpdate {
    pub fn transition(
        actor: impl Into<UserId>,
        status: impl Into<String>,
        phase: CasePhase,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            actor: actor.into(),
            transition: Some(Transition {
                status: status.into(),
                phase,
                reason: reason.into(),
                kind: TransitionKind::Forward,
            }),
            effects: vec![],
            expected_status: None,
        }
    }

    pub fn rollback(
        actor: impl Into<UserId>,
        status: impl Into<String>,
        phase: CasePhase,
        reason: impl Into<String>,
    ) -> Self {
        let mut update = Self::transition(actor, status, phase, reason);
        if let Some(t) = update.transition.as_mut() {
            t.kind = TransitionKind::Rollback;
        }
        update
    }

    /// Appends without changing status.
    pub fn effects_only(actor: impl Into<UserId>) -> Self {
        Self {
            actor: actor.into(),
            transition: None,
            effects: vec![],
            expected_status: None,
        }
    }

    pub fn with(mut self, effect: SideEffect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn expecting(mut self, status: impl Into<String>) -> Self {
        self.expected_status = Some(status.into());
        self
    }

    pub fn apply(
        &self,
        case: &mut Case,
        limits: &Limits,
        at: TimeStamp,
    ) -> Result<(), WorkflowError> {
        self.validate(case, limits)?;

        for effect in &self.effects {
            apply_effect(case, effect, &self.actor, at);
        }

        if let Some(t) = &self.transition {
            case.case_status.push(CaseStatusEntry {
                status: t.status.clone(),
                reason: t.reason.clone(),
                created_dtm: at,
                created_by: self.actor.clone(),
                phase: t.phase,
                notified_dtm: None,
                expire_dtm: None,
            });
            case.case_current_status = t.status.clone();
            case.case_current_phase = t.phase;
        }
        Ok(())
    }

    fn validate(&self, case: &Case, limits: &Limits) -> Result<(), WorkflowError> {
        if self.actor.trim().is_empty() {
            return Err(ValidationError::MissingField("actor").into());
        }
        if case.case_status.is_empty() {
            return Err(IntegrityError::EmptyHistory {
                case_id: case.case_id,
            }
            .into());
        }
        if !case.projection_consistent() {
            return Err(WorkflowError::PreconditionFailed(format!(
                "case {} current status does not match its history",
                case.case_id
            )));
        }

        if let Some(expected) = &self.expected_status {
            if &case.case_current_status != expected {
                return Err(WorkflowError::PreconditionFailed(format!(
                    "case {} is `{}`, expected `{expected}`",
                    case.case_id, case.case_current_status
                )));
            }
        }

        if let Some(t) = &self.transition {
            if t.status.trim().is_empty() {
                return Err(ValidationError::MissingField("status").into());
            }
            if t.kind == TransitionKind::Forward && !case.case_current_phase.allows(t.phase) {
                return Err(WorkflowError::PreconditionFailed(format!(
                    "case {} cannot move from phase {} to {}",
                    case.case_id, case.case_current_phase, t.phase
                )));
            }
        }

        let mut drc_entries = case.drc.len();
        let mut has_drc = case.current_drc().is_some();
        let mut monitor_months = case.monitor_months;
        for effect in &self.effects {
            match effect {
                SideEffect::AssignDrc { drc_name, .. } => {
                    if drc_name.trim().is_empty() {
                        return Err(ValidationError::MissingField("drc_name").into());
                    }
                    if drc_entries >= limits.max_drc_assignments {
                        return Err(WorkflowError::PreconditionFailed(format!(
                            "case {} already has {drc_entries} DRC assignments",
                            case.case_id
                        )));
                    }
                    drc_entries += 1;
                    has_drc = true;
                }
                SideEffect::CloseDrc { .. } => has_drc = false,
                SideEffect::AssignRecoveryOfficer { .. }
                | SideEffect::Negotiation(_)
                | SideEffect::MediationBoard(_)
                | SideEffect::Request(_)
                | SideEffect::CpeCollect(_)
                    if !has_drc =>
                {
                    return Err(WorkflowError::PreconditionFailed(format!(
                        "case {} has no active DRC",
                        case.case_id
                    )));
                }
                SideEffect::ExtendMonitoring => {
                    if !has_drc {
                        return Err(WorkflowError::PreconditionFailed(format!(
                            "case {} has no active DRC to monitor",
                            case.case_id
                        )));
                    }
                    if monitor_months >= limits.max_monitor_months {
                        return Err(WorkflowError::PreconditionFailed(format!(
                            "case {} already monitored for {monitor_months} months",
                            case.case_id
                        )));
                    }
                    monitor_months += 1;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn apply_effect(case: &mut Case, effect: &SideEffect, actor: &str, at: TimeStamp) {
    match effect {
        SideEffect::AssignDrc {
            drc_id,
            drc_name,
            batch_id,
        } => {
            case.drc.close_open(actor, at, Some("DRC re-assigned"));
            let mut assignment = DrcAssignment::new(*drc_id, drc_name.clone(), actor, at);
            assignment.batch_id = *batch_id;
            case.drc.push(assignment);
        }
        SideEffect::CloseDrc { remark } => {
            case.drc.close_open(actor, at, Some(remark));
        }
        SideEffect::AssignRecoveryOfficer {
            ro_id,
            removal_remark,
        } => {
            if let Some(drc) = case.current_drc_mut() {
                drc.recovery_officers
                    .close_open(actor, at, Some(removal_remark));
                drc.recovery_officers.push(RecoveryOfficerAssignment {
                    ro_id: *ro_id,
                    assigned_dtm: at,
                    assigned_by: actor.to_string(),
                    removed_dtm: None,
                    case_removal_remark: None,
                });
            }
        }
        SideEffect::AbnormalStop {
            remark,
            approver_type,
        } => case.abnormal_stop.push(AbnormalStop {
            remark: remark.clone(),
            done_by: actor.to_string(),
            done_dtm: at,
            case_phase: case.case_current_phase,
            approver_type: approver_type.clone(),
        }),
        SideEffect::RecordApproval(entry) => case.approve.push(entry.clone()),
        SideEffect::Negotiation(entry) => case.ro_negotiation.push(entry.clone()),
        SideEffect::MediationBoard(entry) => case.mediation_board.push(entry.clone()),
        SideEffect::Request(entry) => case.ro_requests.push(entry.clone()),
        SideEffect::CpeCollect(entry) => case.ro_cpe_collect.push(entry.clone()),
        SideEffect::Settlement(entry) => case.settlement.push(entry.clone()),
        SideEffect::ExtendMonitoring => case.monitor_months += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::NewCase;
    use crate::status;

    fn case_in(status: &str, phase: CasePhase) -> Case {
        Case::new(
            1,
            NewCase {
                account_no: "ACC-1".into(),
                ..NewCase::default()
            },
            CaseStatusEntry {
                status: status.into(),
                reason: "created".into(),
                created_dtm: TimeStamp::now(),
                created_by: "tester".into(),
                phase,
                notified_dtm: None,
                expire_dtm: None,
            },
            "tester",
        )
    }

    fn assign(drc_id: DrcId) -> SideEffect {
        SideEffect::AssignDrc {
            drc_id,
            drc_name: format!("DRC {drc_id}"),
            batch_id: None,
        }
    }

    #[test]
    fn transition_appends_and_updates_projection() {
        let mut case = case_in(status::OPEN_NO_AGENT, CasePhase::Distribution);
        let update = CaseUpdate::transition(
            "ops",
            status::OPEN_ASSIGN_AGENT,
            CasePhase::Distribution,
            "assigned",
        );
        update
            .with(assign(7))
            .apply(&mut case, &Limits::default(), TimeStamp::now())
            .unwrap();

        assert_eq!(case.case_status.len(), 2);
        assert_eq!(case.case_current_status, status::OPEN_ASSIGN_AGENT);
        assert!(case.projection_consistent());
        assert_eq!(case.current_drc().map(|d| d.drc_id), Some(7));
    }

    #[test]
    fn illegal_phase_move_leaves_case_untouched() {
        let mut case = case_in(status::WRITE_OFF, CasePhase::WriteOff);
        let before = case.clone();

        let err = CaseUpdate::transition("ops", status::RO_NEGOTIATION, CasePhase::Negotiation, "x")
            .apply(&mut case, &Limits::default(), TimeStamp::now())
            .unwrap_err();

        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
        assert_eq!(case, before);
    }

    #[test]
    fn rollback_ignores_the_phase_graph() {
        let mut case = case_in(status::PENDING_CASE_WITHDRAWAL, CasePhase::Abnormal);
        CaseUpdate::rollback("ops", status::RO_NEGOTIATION, CasePhase::Negotiation, "rejected")
            .apply(&mut case, &Limits::default(), TimeStamp::now())
            .unwrap();
        assert_eq!(case.case_current_phase, CasePhase::Negotiation);
    }

    #[test]
    fn drc_cap_counts_history_entries() {
        let mut case = case_in(status::OPEN_NO_AGENT, CasePhase::Distribution);
        let limits = Limits::default();
        for drc in 1..=3 {
            CaseUpdate::effects_only("ops")
                .with(assign(drc))
                .apply(&mut case, &limits, TimeStamp::now())
                .unwrap();
        }
        assert_eq!(case.drc.open_count(), 1);

        let err = CaseUpdate::effects_only("ops")
            .with(assign(4))
            .apply(&mut case, &limits, TimeStamp::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
        assert_eq!(case.drc.len(), 3);
    }

    #[test]
    fn stale_expected_status_is_refused() {
        let mut case = case_in(status::RO_NEGOTIATION, CasePhase::Negotiation);
        let update =
            CaseUpdate::transition("ops", status::MB_NEGOTIATION, CasePhase::MediationBoard, "x");
        let err = update
            .expecting(status::OPEN_ASSIGN_AGENT)
            .apply(&mut case, &Limits::default(), TimeStamp::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::PreconditionFailed(_)));
    }
}
