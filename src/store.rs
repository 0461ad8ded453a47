//! sled-backed document store.
//!
//! Documents are CBOR-encoded and keyed by their big-endian numeric id. All
//! writes go through [`Store::transaction`], which spans every tree so a
//! single unit of work can touch cases, approvals, batches and counters and
//! commit or abort as one.
use sled::transaction::{ConflictableTransactionResult, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use tracing::warn;

use crate::approval::{ApprovalKind, ApproverReference, PendingApproval};
use crate::batch::DistributionBatch;
use crate::case::Case;
use crate::config::StorageConfig;
use crate::error::{IntegrityError, WorkflowError};
use crate::sequence::{self, CounterName, SequenceAllocator};
use crate::types::{ApproverId, BatchId, CaseId};
use crate::utils::{id_key, key_id};

pub type TxResult<T> = ConflictableTransactionResult<T, WorkflowError>;

const CASES: &str = "cases";
const APPROVALS: &str = "approvals";
const APPROVAL_INDEX: &str = "approval_index";
const BATCHES: &str = "batches";
const BATCH_COHORTS: &str = "batch_cohorts";
const COUNTERS: &str = "counters";

pub struct Store {
    db: Db,
    cases: Tree,
    approvals: Tree,
    approval_index: Tree,
    batches: Tree,
    batch_cohorts: Tree,
    counters: Tree,
}

/// The view of every tree inside one transaction body.
pub struct StoreTx<'a> {
    cases: &'a TransactionalTree,
    approvals: &'a TransactionalTree,
    approval_index: &'a TransactionalTree,
    batches: &'a TransactionalTree,
    batch_cohorts: &'a TransactionalTree,
    counters: &'a TransactionalTree,
}

fn encode<T: minicbor::Encode<()>>(
    kind: &'static str,
    id: u64,
    doc: &T,
) -> Result<Vec<u8>, IntegrityError> {
    minicbor::to_vec(doc).map_err(|e| IntegrityError::Encode {
        kind,
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T>(kind: &'static str, id: u64, raw: &[u8]) -> Result<T, IntegrityError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    minicbor::decode(raw).map_err(|e| IntegrityError::CorruptDocument {
        kind,
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn approval_index_key(reference: ApproverReference, kind: ApprovalKind) -> Vec<u8> {
    format!("{reference}/{}", kind.as_str()).into_bytes()
}

fn cohort_key(rule: &str, band: &str) -> Vec<u8> {
    format!("{rule}\u{1f}{band}").into_bytes()
}

impl Store {
    pub fn open(config: &StorageConfig) -> Result<Self, WorkflowError> {
        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .open()?;
        Self::from_db(db)
    }

    pub fn from_db(db: Db) -> Result<Self, WorkflowError> {
        Ok(Self {
            cases: db.open_tree(CASES)?,
            approvals: db.open_tree(APPROVALS)?,
            approval_index: db.open_tree(APPROVAL_INDEX)?,
            batches: db.open_tree(BATCHES)?,
            batch_cohorts: db.open_tree(BATCH_COHORTS)?,
            counters: db.open_tree(COUNTERS)?,
            db,
        })
    }

    pub fn sequences(&self) -> SequenceAllocator {
        SequenceAllocator::new(self.counters.clone())
    }

    pub fn flush(&self) -> Result<(), WorkflowError> {
        self.db.flush()?;
        Ok(())
    }

    /// Run `body` as one atomic unit across all trees.
    ///
    /// sled re-runs `body` when a concurrent commit touched the same keys, so
    /// the body must not assume it runs once. Aborting with a domain error
    /// discards every write made by the body.
    pub fn transaction<T, F>(&self, body: F) -> Result<T, WorkflowError>
    where
        F: Fn(&StoreTx<'_>) -> TxResult<T>,
    {
        let trees = (
            &self.cases,
            &self.approvals,
            &self.approval_index,
            &self.batches,
            &self.batch_cohorts,
            &self.counters,
        );
        trees
            .transaction(
                |(cases, approvals, approval_index, batches, batch_cohorts, counters)| {
                    let tx = StoreTx {
                        cases,
                        approvals,
                        approval_index,
                        batches,
                        batch_cohorts,
                        counters,
                    };
                    body(&tx)
                },
            )
            .map_err(|e| match e {
                TransactionError::Abort(e) => {
                    warn!(error = %e, category = %e.category(), "transaction aborted");
                    e
                }
                TransactionError::Storage(e) => WorkflowError::Storage(e),
            })
    }

    pub fn case(&self, case_id: CaseId) -> Result<Case, WorkflowError> {
        match self.cases.get(id_key(case_id))? {
            Some(raw) => Ok(decode("case", case_id, &raw)?),
            None => Err(WorkflowError::not_found("case", case_id)),
        }
    }

    pub fn approval(&self, approver_id: ApproverId) -> Result<PendingApproval, WorkflowError> {
        match self.approvals.get(id_key(approver_id))? {
            Some(raw) => Ok(decode("approval", approver_id, &raw)?),
            None => Err(WorkflowError::not_found("approval", approver_id)),
        }
    }

    pub fn batch(&self, batch_id: BatchId) -> Result<DistributionBatch, WorkflowError> {
        match self.batches.get(id_key(batch_id))? {
            Some(raw) => Ok(decode("batch", batch_id, &raw)?),
            None => Err(WorkflowError::not_found("batch", batch_id)),
        }
    }

    /// Id of the most recent approval filed for `(reference, kind)`.
    pub fn approval_for(
        &self,
        reference: ApproverReference,
        kind: ApprovalKind,
    ) -> Result<Option<ApproverId>, WorkflowError> {
        Ok(self
            .approval_index
            .get(approval_index_key(reference, kind))?
            .and_then(|raw| key_id(&raw)))
    }

    pub fn cases(&self) -> Result<Vec<Case>, WorkflowError> {
        scan(&self.cases, "case")
    }

    pub fn approvals(&self) -> Result<Vec<PendingApproval>, WorkflowError> {
        scan(&self.approvals, "approval")
    }

    pub fn batches(&self) -> Result<Vec<DistributionBatch>, WorkflowError> {
        scan(&self.batches, "batch")
    }
}

fn scan<T>(tree: &Tree, kind: &'static str) -> Result<Vec<T>, WorkflowError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    let mut out = Vec::new();
    for item in tree.iter() {
        let (key, raw) = item?;
        let id = key_id(&key).unwrap_or_default();
        out.push(decode(kind, id, &raw)?);
    }
    Ok(out)
}

impl StoreTx<'_> {
    pub fn next_id(&self, name: CounterName) -> TxResult<u64> {
        sequence::next_in(self.counters, name)
    }

    pub fn case(&self, case_id: CaseId) -> TxResult<Case> {
        match self.cases.get(id_key(case_id))? {
            Some(raw) => Ok(decode("case", case_id, &raw)?),
            None => Err(WorkflowError::not_found("case", case_id).into()),
        }
    }

    pub fn put_case(&self, case: &Case) -> TxResult<()> {
        let raw = encode("case", case.case_id, case)?;
        self.cases.insert(id_key(case.case_id), raw)?;
        Ok(())
    }

    pub fn approval(&self, approver_id: ApproverId) -> TxResult<PendingApproval> {
        match self.approvals.get(id_key(approver_id))? {
            Some(raw) => Ok(decode("approval", approver_id, &raw)?),
            None => Err(WorkflowError::not_found("approval", approver_id).into()),
        }
    }

    pub fn put_approval(&self, approval: &PendingApproval) -> TxResult<()> {
        let raw = encode("approval", approval.approver_id, approval)?;
        self.approvals.insert(id_key(approval.approver_id), raw)?;
        Ok(())
    }

    pub fn approval_for(
        &self,
        reference: ApproverReference,
        kind: ApprovalKind,
    ) -> TxResult<Option<ApproverId>> {
        Ok(self
            .approval_index
            .get(approval_index_key(reference, kind))?
            .and_then(|raw| key_id(&raw)))
    }

    pub fn index_approval(&self, approval: &PendingApproval) -> TxResult<()> {
        let key = approval_index_key(approval.approver_reference, approval.approver_type.kind());
        self.approval_index
            .insert(key, id_key(approval.approver_id))?;
        Ok(())
    }

    pub fn batch(&self, batch_id: BatchId) -> TxResult<DistributionBatch> {
        match self.batches.get(id_key(batch_id))? {
            Some(raw) => Ok(decode("batch", batch_id, &raw)?),
            None => Err(WorkflowError::not_found("batch", batch_id).into()),
        }
    }

    pub fn put_batch(&self, batch: &DistributionBatch) -> TxResult<()> {
        let raw = encode("batch", batch.case_distribution_batch_id, batch)?;
        self.batches
            .insert(id_key(batch.case_distribution_batch_id), raw)?;
        Ok(())
    }

    /// Latest batch opened for a `(rule, band)` cohort.
    pub fn cohort_batch(&self, rule: &str, band: &str) -> TxResult<Option<BatchId>> {
        Ok(self
            .batch_cohorts
            .get(cohort_key(rule, band))?
            .and_then(|raw| key_id(&raw)))
    }

    pub fn set_cohort_batch(&self, rule: &str, band: &str, batch_id: BatchId) -> TxResult<()> {
        self.batch_cohorts
            .insert(cohort_key(rule, band), id_key(batch_id))?;
        Ok(())
    }
}
