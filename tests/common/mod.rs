//! Shared fixtures for the integration tests: recording collaborator fakes
//! and a service over a throwaway sled database.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail};
use case_lifecycle::approval::ApprovalKind;
use case_lifecycle::collaborators::{
    InteractionEntry, InteractionLogger, SettlementPlanCreator, SettlementPlanRequest, TaskCreator,
    TaskRequest,
};
use case_lifecycle::config::{DelegationRule, StorageConfig};
use case_lifecycle::service::TransitionRequest;
use case_lifecycle::status::{self, CasePhase};
use case_lifecycle::transition::SideEffect;
use case_lifecycle::{Case, CaseWorkflowService, Collaborators, NewCase, WorkflowConfig};
use tempfile::{TempDir, tempdir};

pub const RULE: &str = "PEO TV";
pub const BAND: &str = "AB-5_10";
pub const DELEGATE: &str = "ops_manager";
pub const BC_DELEGATE: &str = "bc7_manager";

/// Interaction logger that remembers every entry and can be told to fail.
#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<HashMap<u64, InteractionEntry>>,
    fail: AtomicBool,
    empty: AtomicBool,
}

impl RecordingLogger {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Answer without a log id.
    pub fn answer_empty(&self, empty: bool) {
        self.empty.store(empty, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<InteractionEntry> {
        let mut entries: Vec<_> = self.entries.lock().unwrap().values().cloned().collect();
        entries.sort_by_key(|e| e.interaction_id);
        entries
    }
}

impl InteractionLogger for RecordingLogger {
    fn log(&self, entry: &InteractionEntry) -> anyhow::Result<Option<u64>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("interaction log service unavailable");
        }
        if self.empty.load(Ordering::SeqCst) {
            return Ok(None);
        }
        // keyed on interaction_id so a replayed transaction body logs once
        self.entries
            .lock()
            .unwrap()
            .insert(entry.interaction_id, entry.clone());
        Ok(Some(10_000 + entry.interaction_id))
    }
}

#[derive(Default)]
pub struct RecordingTasks {
    tasks: Mutex<Vec<TaskRequest>>,
    fail: AtomicBool,
}

impl RecordingTasks {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn tasks(&self) -> Vec<TaskRequest> {
        self.tasks.lock().unwrap().clone()
    }
}

impl TaskCreator for RecordingTasks {
    fn create_task(&self, task: &TaskRequest) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("task service unavailable");
        }
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains(task) {
            tasks.push(task.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSettlements {
    plans: Mutex<Vec<SettlementPlanRequest>>,
    next_id: AtomicU64,
    fail: AtomicBool,
}

impl RecordingSettlements {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn plans(&self) -> Vec<SettlementPlanRequest> {
        self.plans.lock().unwrap().clone()
    }
}

impl SettlementPlanCreator for RecordingSettlements {
    fn create_plan(&self, request: &SettlementPlanRequest) -> anyhow::Result<u64> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("settlement service rejected case {}", request.case_id));
        }
        self.plans.lock().unwrap().push(request.clone());
        Ok(500 + self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

pub struct Harness {
    pub service: CaseWorkflowService,
    pub logger: Arc<RecordingLogger>,
    pub tasks: Arc<RecordingTasks>,
    pub settlements: Arc<RecordingSettlements>,
    _dir: TempDir,
}

/// A delegate for every approval kind in every phase, plus a billing-center
/// specific one for DRC re-assignment.
pub fn delegations() -> Vec<DelegationRule> {
    let mut rules = Vec::new();
    for phase in CasePhase::ALL {
        for kind in ApprovalKind::ALL {
            rules.push(DelegationRule {
                phase,
                approver_type: kind,
                billing_center: None,
                user_id: DELEGATE.to_string(),
            });
        }
    }
    rules.push(DelegationRule {
        phase: CasePhase::Distribution,
        approver_type: ApprovalKind::DrcReassign,
        billing_center: Some("BC-7".to_string()),
        user_id: BC_DELEGATE.to_string(),
    });
    rules
}

pub fn harness() -> anyhow::Result<Harness> {
    harness_with(delegations())
}

pub fn harness_with(delegations: Vec<DelegationRule>) -> anyhow::Result<Harness> {
    // sled locks its directory, so every test gets its own database
    let dir = tempdir()?;
    let config = WorkflowConfig {
        storage: StorageConfig {
            path: dir.path().join("cases.db"),
            temporary: false,
        },
        delegations,
        ..WorkflowConfig::default()
    };

    let logger = Arc::new(RecordingLogger::default());
    let tasks = Arc::new(RecordingTasks::default());
    let settlements = Arc::new(RecordingSettlements::default());
    let collaborators =
        Collaborators::with_config(&config, settlements.clone(), logger.clone(), tasks.clone());
    let service = CaseWorkflowService::open(&config, collaborators)?;

    Ok(Harness {
        service,
        logger,
        tasks,
        settlements,
        _dir: dir,
    })
}

pub fn new_case(account_no: &str) -> NewCase {
    NewCase {
        account_no: account_no.to_string(),
        arrears_amount: 12_500,
        drc_commission_rule: RULE.to_string(),
        arrears_band: BAND.to_string(),
        billing_center: None,
    }
}

/// A case sitting at "Open assign agent" under `drc_id`.
pub fn assigned_case(service: &CaseWorkflowService, drc_id: u64) -> anyhow::Result<Case> {
    let case = service.create_case(new_case(&format!("ACC-{drc_id}")), "intake")?;
    let case = service.apply_transition(
        case.case_id,
        TransitionRequest {
            status: status::OPEN_ASSIGN_AGENT.to_string(),
            reason: "manual assignment".to_string(),
            actor: "ops".to_string(),
            effects: vec![SideEffect::AssignDrc {
                drc_id,
                drc_name: format!("DRC {drc_id}"),
                batch_id: None,
            }],
            ..TransitionRequest::default()
        },
    )?;
    Ok(case)
}

/// A case in "RO Negotiation" with DRC `drc_id` and officer `ro_id`.
pub fn negotiating_case(
    service: &CaseWorkflowService,
    drc_id: u64,
    ro_id: u64,
) -> anyhow::Result<Case> {
    let case = assigned_case(service, drc_id)?;
    Ok(service.assign_recovery_officer(case.case_id, ro_id, "drc_user")?)
}

pub fn statuses(case: &Case) -> Vec<String> {
    case.case_status.iter().map(|e| e.status.clone()).collect()
}
