//! Services the engine consumes but does not own.
//!
//! Each is a narrow trait so the surrounding deployment can plug in its HTTP
//! clients. The phase and delegate resolvers also have local implementations
//! backed by the status table and the configured delegation rules.
use std::collections::BTreeMap;

use anyhow::anyhow;

use crate::approval::ApprovalKind;
use crate::config::DelegationRule;
use crate::status::{self, CasePhase};
use crate::types::{CaseId, DrcId, RoId, UserId};

pub trait CasePhaseResolver: Send + Sync {
    fn resolve_phase(&self, case_status: &str) -> anyhow::Result<CasePhase>;
}

pub trait DelegateResolver: Send + Sync {
    fn resolve_delegate(
        &self,
        case_phase: CasePhase,
        approver_type: ApprovalKind,
        billing_center: Option<&str>,
    ) -> anyhow::Result<UserId>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installment {
    pub installment_seq: u32,
    pub amount: u64,
    pub due_dtm: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlanRequest {
    /// Idempotency key, allocated once per `create_settlement` call. A caller
    /// that retries after a failure sends a fresh id.
    pub settlement_request_id: u64,
    pub created_by: UserId,
    pub case_phase: CasePhase,
    pub case_status: String,
    pub settlement_type: String,
    pub amount: u64,
    pub drc_id: Option<DrcId>,
    pub plan_installments: Vec<Installment>,
    pub case_id: CaseId,
    pub ro_id: Option<RoId>,
    pub remark: Option<String>,
}

pub trait SettlementPlanCreator: Send + Sync {
    /// Returns the settlement id assigned by the settlement service.
    fn create_plan(&self, request: &SettlementPlanRequest) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEntry {
    pub interaction_id: u64,
    pub interaction_type: String,
    pub delegate_user_id: UserId,
    pub created_by: UserId,
    pub status: String,
    pub parameters: BTreeMap<String, String>,
}

pub trait InteractionLogger: Send + Sync {
    /// Records the interaction and returns its log id. `Ok(None)` means the
    /// logger answered without an id, which callers treat as a failure.
    ///
    /// Must be idempotent on `interaction_id`: the store may replay the
    /// enclosing transaction body.
    fn log(&self, entry: &InteractionEntry) -> anyhow::Result<Option<u64>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub template_task_id: u32,
    pub task_type: String,
    pub created_by: UserId,
    pub parameters: BTreeMap<String, String>,
}

pub trait TaskCreator: Send + Sync {
    /// Must be idempotent on the task parameters for the same reason as
    /// [`InteractionLogger::log`].
    fn create_task(&self, task: &TaskRequest) -> anyhow::Result<()>;
}

/// Resolves phases from the built-in status table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusTable;

impl CasePhaseResolver for StatusTable {
    fn resolve_phase(&self, case_status: &str) -> anyhow::Result<CasePhase> {
        status::phase_of(case_status).ok_or_else(|| anyhow!("no phase for status `{case_status}`"))
    }
}

/// Resolves delegates from configured rules. A rule naming the case's
/// billing center wins over one without a billing center.
#[derive(Debug, Default, Clone)]
pub struct DelegationTable {
    rules: Vec<DelegationRule>,
}

impl DelegationTable {
    pub fn new(rules: Vec<DelegationRule>) -> Self {
        Self { rules }
    }
}

impl DelegateResolver for DelegationTable {
    fn resolve_delegate(
        &self,
        case_phase: CasePhase,
        approver_type: ApprovalKind,
        billing_center: Option<&str>,
    ) -> anyhow::Result<UserId> {
        let candidates = self
            .rules
            .iter()
            .filter(|r| r.phase == case_phase && r.approver_type == approver_type);

        let mut fallback = None;
        for rule in candidates {
            match (rule.billing_center.as_deref(), billing_center) {
                (Some(rule_bc), Some(bc)) if rule_bc == bc => return Ok(rule.user_id.clone()),
                (None, _) if fallback.is_none() => fallback = Some(rule.user_id.clone()),
                _ => {}
            }
        }

        fallback.ok_or_else(|| {
            anyhow!(
                "no delegate for {} in phase {case_phase}",
                approver_type.as_str()
            )
        })
    }
}
