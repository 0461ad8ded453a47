//! The case document: current projection plus its append-only history arrays.
use crate::approval::ApproveStatus;
use crate::history::{Closable, History};
use crate::status::CasePhase;
use crate::types::{ApproverId, BatchId, CaseId, DrcId, RoId, TimeStamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct CaseStatusEntry {
    #[n(0)]
    pub status: String,
    #[n(1)]
    pub reason: String,
    #[n(2)]
    pub created_dtm: TimeStamp,
    #[n(3)]
    pub created_by: UserId,
    #[n(4)]
    pub phase: CasePhase,
    #[n(5)]
    pub notified_dtm: Option<TimeStamp>,
    #[n(6)]
    pub expire_dtm: Option<TimeStamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum AssignmentStatus {
    #[n(0)]
    Active,
    #[n(1)]
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RecoveryOfficerAssignment {
    #[n(0)]
    pub ro_id: RoId,
    #[n(1)]
    pub assigned_dtm: TimeStamp,
    #[n(2)]
    pub assigned_by: UserId,
    #[n(3)]
    pub removed_dtm: Option<TimeStamp>,
    #[n(4)]
    pub case_removal_remark: Option<String>,
}

impl Closable for RecoveryOfficerAssignment {
    fn is_open(&self) -> bool {
        self.removed_dtm.is_none()
    }

    fn close(&mut self, _by: &str, at: TimeStamp, remark: Option<&str>) {
        if !self.is_open() {
            return;
        }
        self.removed_dtm = Some(at);
        self.case_removal_remark = remark.map(str::to_string);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct DrcAssignment {
    #[n(0)]
    pub drc_id: DrcId,
    #[n(1)]
    pub drc_name: String,
    #[n(2)]
    pub status: AssignmentStatus,
    #[n(3)]
    pub created_dtm: TimeStamp,
    #[n(4)]
    pub created_by: UserId,
    #[n(5)]
    pub expire_dtm: Option<TimeStamp>,
    #[n(6)]
    pub removed_by: Option<UserId>,
    #[n(7)]
    pub removed_dtm: Option<TimeStamp>,
    #[n(8)]
    pub recovery_officers: History<RecoveryOfficerAssignment>,
    // set when the assignment came from a distribution batch
    #[n(9)]
    pub batch_id: Option<BatchId>,
}

impl DrcAssignment {
    pub fn new(drc_id: DrcId, drc_name: String, created_by: &str, at: TimeStamp) -> Self {
        Self {
            drc_id,
            drc_name,
            status: AssignmentStatus::Active,
            created_dtm: at,
            created_by: created_by.to_string(),
            expire_dtm: None,
            removed_by: None,
            removed_dtm: None,
            recovery_officers: History::new(),
            batch_id: None,
        }
    }

    pub fn current_ro(&self) -> Option<&RecoveryOfficerAssignment> {
        self.recovery_officers.current_open()
    }
}

impl Closable for DrcAssignment {
    fn is_open(&self) -> bool {
        self.status == AssignmentStatus::Active && self.removed_dtm.is_none()
    }

    fn close(&mut self, by: &str, at: TimeStamp, remark: Option<&str>) {
        if !self.is_open() {
            return;
        }
        self.status = AssignmentStatus::Inactive;
        self.removed_by = Some(by.to_string());
        self.removed_dtm = Some(at);
        self.recovery_officers.close_open(by, at, remark);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RoNegotiation {
    #[n(0)]
    pub drc_id: DrcId,
    #[n(1)]
    pub ro_id: Option<RoId>,
    #[n(2)]
    pub field_reason: String,
    #[n(3)]
    pub remark: Option<String>,
    #[n(4)]
    pub created_dtm: TimeStamp,
    #[n(5)]
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct MediationBoardEntry {
    #[n(0)]
    pub drc_id: DrcId,
    #[n(1)]
    pub ro_id: Option<RoId>,
    #[n(2)]
    pub calling_dtm: Option<TimeStamp>,
    #[n(3)]
    pub customer_available: bool,
    #[n(4)]
    pub comment: String,
    #[n(5)]
    pub agree_to_settle: Option<bool>,
    #[n(6)]
    pub status: String,
    #[n(7)]
    pub created_dtm: TimeStamp,
    #[n(8)]
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RoRequest {
    #[n(0)]
    pub drc_id: DrcId,
    #[n(1)]
    pub ro_id: Option<RoId>,
    #[n(2)]
    pub request: String,
    #[n(3)]
    pub remark: Option<String>,
    #[n(4)]
    pub created_dtm: TimeStamp,
    #[n(5)]
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct RoCpeCollect {
    #[n(0)]
    pub ro_cpe_collect_id: u64,
    #[n(1)]
    pub drc_id: DrcId,
    #[n(2)]
    pub ro_id: Option<RoId>,
    #[n(3)]
    pub telephone_no: String,
    #[n(4)]
    pub cpe_model: String,
    #[n(5)]
    pub serial_no: String,
    #[n(6)]
    pub collected_dtm: TimeStamp,
    #[n(7)]
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Settlement {
    #[n(0)]
    pub settlement_id: u64,
    #[n(1)]
    pub settlement_request_id: u64,
    #[n(2)]
    pub drc_id: Option<DrcId>,
    #[n(3)]
    pub ro_id: Option<RoId>,
    #[n(4)]
    pub settlement_type: String,
    #[n(5)]
    pub amount: u64,
    #[n(6)]
    pub phase: CasePhase,
    #[n(7)]
    pub created_dtm: TimeStamp,
    #[n(8)]
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct AbnormalStop {
    #[n(0)]
    pub remark: String,
    #[n(1)]
    pub done_by: UserId,
    #[n(2)]
    pub done_dtm: TimeStamp,
    #[n(3)]
    pub case_phase: CasePhase,
    #[n(4)]
    pub approver_type: String,
}

/// One resolved approval as seen from the case (`approve[]`).
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct CaseApproval {
    #[n(0)]
    pub approver_id: ApproverId,
    #[n(1)]
    pub approver_type: String,
    #[n(2)]
    pub decision: ApproveStatus,
    #[n(3)]
    pub approved_by: UserId,
    #[n(4)]
    pub approved_dtm: TimeStamp,
    #[n(5)]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Case {
    #[n(0)]
    pub case_id: CaseId,
    #[n(1)]
    pub account_no: String,
    #[n(2)]
    pub arrears_amount: u64,
    #[n(3)]
    pub drc_commission_rule: String,
    #[n(4)]
    pub arrears_band: String,
    #[n(5)]
    pub billing_center: Option<String>,
    #[n(6)]
    pub monitor_months: u32,
    #[n(7)]
    pub created_dtm: TimeStamp,
    #[n(8)]
    pub created_by: UserId,
    // projection of case_status.latest(), written in the same unit as the append
    #[n(9)]
    pub case_current_status: String,
    #[n(10)]
    pub case_current_phase: CasePhase,
    #[n(11)]
    pub case_status: History<CaseStatusEntry>,
    #[n(12)]
    pub drc: History<DrcAssignment>,
    #[n(13)]
    pub ro_negotiation: History<RoNegotiation>,
    #[n(14)]
    pub mediation_board: History<MediationBoardEntry>,
    #[n(15)]
    pub ro_requests: History<RoRequest>,
    #[n(16)]
    pub ro_cpe_collect: History<RoCpeCollect>,
    #[n(17)]
    pub settlement: History<Settlement>,
    #[n(18)]
    pub abnormal_stop: History<AbnormalStop>,
    #[n(19)]
    pub approve: History<CaseApproval>,
}

/// Fields supplied when a case enters the lifecycle.
#[derive(Debug, Clone, Default)]
pub struct NewCase {
    pub account_no: String,
    pub arrears_amount: u64,
    pub drc_commission_rule: String,
    pub arrears_band: String,
    pub billing_center: Option<String>,
}

impl Case {
    pub(crate) fn new(
        case_id: CaseId,
        details: NewCase,
        first: CaseStatusEntry,
        created_by: &str,
    ) -> Self {
        Self {
            case_id,
            account_no: details.account_no,
            arrears_amount: details.arrears_amount,
            drc_commission_rule: details.drc_commission_rule,
            arrears_band: details.arrears_band,
            billing_center: details.billing_center,
            monitor_months: 0,
            created_dtm: first.created_dtm,
            created_by: created_by.to_string(),
            case_current_status: first.status.clone(),
            case_current_phase: first.phase,
            case_status: History::with_first(first),
            drc: History::new(),
            ro_negotiation: History::new(),
            mediation_board: History::new(),
            ro_requests: History::new(),
            ro_cpe_collect: History::new(),
            settlement: History::new(),
            abnormal_stop: History::new(),
            approve: History::new(),
        }
    }

    pub fn latest_status(&self) -> Option<&CaseStatusEntry> {
        self.case_status.latest()
    }

    /// The projection fields agree with the last history entry.
    pub fn projection_consistent(&self) -> bool {
        match self.case_status.latest() {
            Some(last) => {
                last.status == self.case_current_status && last.phase == self.case_current_phase
            }
            None => false,
        }
    }

    pub fn current_drc(&self) -> Option<&DrcAssignment> {
        self.drc.current_open()
    }

    pub fn current_drc_mut(&mut self) -> Option<&mut DrcAssignment> {
        self.drc.current_open_mut()
    }

    pub fn current_ro(&self) -> Option<&RecoveryOfficerAssignment> {
        self.current_drc().and_then(DrcAssignment::current_ro)
    }

    /// At most one active DRC, and within it at most one current officer.
    pub fn assignments_consistent(&self) -> bool {
        if self.drc.open_count() > 1 {
            return false;
        }
        self.drc
            .iter()
            .all(|d| d.recovery_officers.open_count() <= 1)
    }

    pub fn latest_negotiation_for(&self, drc_id: DrcId) -> Option<&RoNegotiation> {
        self.ro_negotiation.latest_where(|n| n.drc_id == drc_id)
    }

    pub fn latest_mediation_for(&self, drc_id: DrcId) -> Option<&MediationBoardEntry> {
        self.mediation_board.latest_where(|m| m.drc_id == drc_id)
    }

    pub fn latest_request_for(&self, drc_id: DrcId) -> Option<&RoRequest> {
        self.ro_requests.latest_where(|r| r.drc_id == drc_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: &str, phase: CasePhase) -> CaseStatusEntry {
        CaseStatusEntry {
            status: status.into(),
            reason: "test".into(),
            created_dtm: TimeStamp::now(),
            created_by: "tester".into(),
            phase,
            notified_dtm: None,
            expire_dtm: None,
        }
    }

    #[test]
    fn closing_a_drc_closes_its_officer() {
        let now = TimeStamp::now();
        let mut drc = DrcAssignment::new(7, "Acme".into(), "ops", now);
        drc.recovery_officers.push(RecoveryOfficerAssignment {
            ro_id: 11,
            assigned_dtm: now,
            assigned_by: "ops".into(),
            removed_dtm: None,
            case_removal_remark: None,
        });

        drc.close("ops", now, Some("DRC re-assigned"));

        assert_eq!(drc.status, AssignmentStatus::Inactive);
        assert!(drc.current_ro().is_none());
        assert_eq!(
            drc.recovery_officers.as_slice()[0]
                .case_removal_remark
                .as_deref(),
            Some("DRC re-assigned")
        );
    }

    #[test]
    fn new_case_projection_matches_history() {
        let case = Case::new(
            1,
            NewCase {
                account_no: "ACC-1".into(),
                ..NewCase::default()
            },
            entry("Open No Agent", CasePhase::Distribution),
            "tester",
        );
        assert!(case.projection_consistent());
        assert!(case.assignments_consistent());

        let bytes = minicbor::to_vec(&case).unwrap();
        let back: Case = minicbor::decode(&bytes).unwrap();
        assert_eq!(back, case);
    }
}
