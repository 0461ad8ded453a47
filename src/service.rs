//! Service layer API for case workflow operations.
//!
//! Every state-changing call follows the same shape: validate the input,
//! resolve whatever the external collaborators must supply (phases,
//! delegates, settlement ids), then run a single store transaction that
//! re-reads the documents, re-checks preconditions against what it read and
//! commits all writes together. The operations are split across the
//! `approval`, `batch` and `recovery` modules.
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{Span, info, info_span};

use crate::case::{Case, CaseStatusEntry, NewCase};
use crate::collaborators::{
    CasePhaseResolver, DelegateResolver, DelegationTable, InteractionEntry, InteractionLogger,
    SettlementPlanCreator, StatusTable, TaskCreator,
};
use crate::config::{Limits, TaskSettings, WorkflowConfig};
use crate::error::{ValidationError, WorkflowError};
use crate::sequence::CounterName;
use crate::status::{self, CasePhase};
use crate::store::{Store, StoreTx, TxResult};
use crate::transition::{CaseUpdate, SideEffect};
use crate::types::{CaseId, TimeStamp, UserId};
use crate::utils::new_request_id;

#[derive(Clone)]
pub struct Collaborators {
    pub phase_resolver: Arc<dyn CasePhaseResolver>,
    pub delegate_resolver: Arc<dyn DelegateResolver>,
    pub settlement_creator: Arc<dyn SettlementPlanCreator>,
    pub interaction_logger: Arc<dyn InteractionLogger>,
    pub task_creator: Arc<dyn TaskCreator>,
}

impl Collaborators {
    /// Local phase and delegate resolution, remote everything else.
    pub fn with_config(
        config: &WorkflowConfig,
        settlement_creator: Arc<dyn SettlementPlanCreator>,
        interaction_logger: Arc<dyn InteractionLogger>,
        task_creator: Arc<dyn TaskCreator>,
    ) -> Self {
        Self {
            phase_resolver: Arc::new(StatusTable),
            delegate_resolver: Arc::new(DelegationTable::new(config.delegations.clone())),
            settlement_creator,
            interaction_logger,
            task_creator,
        }
    }
}

/// Caller input for a direct status change.
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
    pub status: String,
    /// When given it must agree with the phase the resolver reports.
    pub phase: Option<CasePhase>,
    pub reason: String,
    pub actor: UserId,
    /// Refuse unless the case is still in this status.
    pub expected_status: Option<String>,
    pub effects: Vec<SideEffect>,
}

pub struct CaseWorkflowService {
    store: Arc<Store>,
    pub(crate) limits: Limits,
    pub(crate) tasks: TaskSettings,
    pub(crate) collaborators: Collaborators,
}

pub(crate) fn request_span(op: &'static str) -> Span {
    info_span!("case_workflow", op, request_id = %new_request_id())
}

pub(crate) fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

impl CaseWorkflowService {
    pub fn new(store: Arc<Store>, config: &WorkflowConfig, collaborators: Collaborators) -> Self {
        Self {
            store,
            limits: config.limits,
            tasks: config.tasks,
            collaborators,
        }
    }

    pub fn open(
        config: &WorkflowConfig,
        collaborators: Collaborators,
    ) -> Result<Self, WorkflowError> {
        let store = Arc::new(Store::open(&config.storage)?);
        Ok(Self::new(store, config, collaborators))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn case(&self, case_id: CaseId) -> Result<Case, WorkflowError> {
        self.store.case(case_id)
    }

    /// All cases, optionally only those whose current status is `status`.
    pub fn list_cases(&self, status: Option<&str>) -> Result<Vec<Case>, WorkflowError> {
        let mut cases = self.store.cases()?;
        if let Some(status) = status {
            cases.retain(|c| c.case_current_status == status);
        }
        Ok(cases)
    }

    pub(crate) fn resolve_phase(&self, case_status: &str) -> Result<CasePhase, WorkflowError> {
        self.collaborators
            .phase_resolver
            .resolve_phase(case_status)
            .map_err(|e| WorkflowError::collaborator("case phase resolver", e))
    }

    /// Allocate an interaction id and hand the entry to the interaction
    /// logger. Runs inside the caller's transaction so a logger failure
    /// aborts everything the caller wrote.
    pub(crate) fn log_interaction(
        &self,
        tx: &StoreTx<'_>,
        interaction_type: &str,
        delegate_user_id: &str,
        created_by: &str,
        status: &str,
        parameters: BTreeMap<String, String>,
    ) -> TxResult<u64> {
        let interaction_id = tx.next_id(CounterName::UserInteractionId)?;
        let entry = InteractionEntry {
            interaction_id,
            interaction_type: interaction_type.to_string(),
            delegate_user_id: delegate_user_id.to_string(),
            created_by: created_by.to_string(),
            status: status.to_string(),
            parameters,
        };

        match self.collaborators.interaction_logger.log(&entry) {
            Ok(Some(log_id)) => Ok(log_id),
            Ok(None) => Err(WorkflowError::collaborator(
                "interaction logger",
                anyhow::anyhow!("no interaction log id returned for {interaction_id}"),
            )
            .into()),
            Err(e) => Err(WorkflowError::collaborator("interaction logger", e).into()),
        }
    }

    /// Enter a new case into the lifecycle at "Open No Agent".
    pub fn create_case(&self, details: NewCase, actor: &str) -> Result<Case, WorkflowError> {
        let span = request_span("create_case");
        let _guard = span.enter();

        require(&details.account_no, "account_no")?;
        require(&details.drc_commission_rule, "drc_commission_rule")?;
        require(&details.arrears_band, "arrears_band")?;
        require(actor, "actor")?;
        if details.arrears_amount == 0 {
            return Err(ValidationError::ZeroAmount.into());
        }
        let phase = self.resolve_phase(status::OPEN_NO_AGENT)?;

        let case = self.store.transaction(|tx| {
            let case_id = tx.next_id(CounterName::CaseId)?;
            let first = CaseStatusEntry {
                status: status::OPEN_NO_AGENT.to_string(),
                reason: "Case registered".to_string(),
                created_dtm: TimeStamp::now(),
                created_by: actor.to_string(),
                phase,
                notified_dtm: None,
                expire_dtm: None,
            };
            let case = Case::new(case_id, details.clone(), first, actor);
            tx.put_case(&case)?;
            Ok(case)
        })?;

        info!(case_id = case.case_id, account_no = %case.account_no, "case created");
        Ok(case)
    }

    /// Apply a status change, with optional extra appends, to one case.
    pub fn apply_transition(
        &self,
        case_id: CaseId,
        request: TransitionRequest,
    ) -> Result<Case, WorkflowError> {
        let span = request_span("apply_transition");
        let _guard = span.enter();

        require(&request.status, "status")?;
        require(&request.reason, "reason")?;
        require(&request.actor, "actor")?;
        if status::phase_of(&request.status).is_none() {
            return Err(ValidationError::UnknownStatus(request.status.clone()).into());
        }

        let phase = self.resolve_phase(&request.status)?;
        if let Some(given) = request.phase {
            if given != phase {
                return Err(ValidationError::PhaseMismatch {
                    status: request.status.clone(),
                    expected: phase.to_string(),
                    given: given.to_string(),
                }
                .into());
            }
        }

        let mut update = CaseUpdate::transition(
            request.actor.clone(),
            request.status.clone(),
            phase,
            request.reason.clone(),
        );
        update.effects = request.effects.clone();
        update.expected_status = request.expected_status.clone();

        let case = self.update_case(case_id, &update)?;
        info!(
            case_id,
            status = %case.case_current_status,
            phase = %case.case_current_phase,
            "case transitioned"
        );
        Ok(case)
    }

    /// Load, apply and store one case update in its own transaction.
    pub(crate) fn update_case(
        &self,
        case_id: CaseId,
        update: &CaseUpdate,
    ) -> Result<Case, WorkflowError> {
        self.store.transaction(|tx| {
            let mut case = tx.case(case_id)?;
            update.apply(&mut case, &self.limits, TimeStamp::now())?;
            tx.put_case(&case)?;
            Ok(case)
        })
    }
}
