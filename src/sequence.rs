//! Named monotonic counters.
//!
//! Every id the engine hands out (case, transaction, interaction, batch, ...)
//! comes from here. A counter is a u64 stored big-endian under its name in the
//! `counters` tree and is only ever read-modify-written inside a sled
//! transaction, so two callers can never observe the same value: a racing
//! writer makes sled re-run one of the bodies against the committed value.
use std::fmt;

use sled::Tree;
use sled::transaction::{ConflictableTransactionResult, TransactionError, TransactionalTree};
use tracing::debug;

use crate::error::{IntegrityError, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterName {
    CaseId,
    TransactionId,
    UserInteractionId,
    CaseDistributionBatchId,
    RoCpeCollectId,
    ApproverId,
    SettlementRequestId,
}

impl CounterName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterName::CaseId => "case_id",
            CounterName::TransactionId => "transaction_id",
            CounterName::UserInteractionId => "User_Interaction_Id",
            CounterName::CaseDistributionBatchId => "case_distribution_batch_id",
            CounterName::RoCpeCollectId => "ro_cpe_collect_id",
            CounterName::ApproverId => "approver_id",
            CounterName::SettlementRequestId => "settlement_request_id",
        }
    }
}

impl fmt::Display for CounterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Increment `name` by one inside an open transaction and return the new value.
///
/// A missing counter starts at zero, so the first id handed out is 1.
pub(crate) fn next_in(
    counters: &TransactionalTree,
    name: CounterName,
) -> ConflictableTransactionResult<u64, WorkflowError> {
    let current = match counters.get(name.as_str())? {
        Some(raw) => decode_counter(name, &raw)?,
        None => 0,
    };
    let next = current
        .checked_add(1)
        .ok_or_else(|| IntegrityError::CounterOverflow(name.to_string()))?;
    counters.insert(name.as_str(), next.to_be_bytes().to_vec())?;
    debug!(counter = %name, value = next, "allocated sequence value");
    Ok(next)
}

fn decode_counter(name: CounterName, raw: &[u8]) -> Result<u64, IntegrityError> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| IntegrityError::CorruptCounter(name.to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Standalone allocator for callers that need an id outside a larger unit
/// of work. Inside a unit of work use [`crate::store::StoreTx::next_id`].
#[derive(Clone)]
pub struct SequenceAllocator {
    counters: Tree,
}

impl SequenceAllocator {
    pub fn new(counters: Tree) -> Self {
        Self { counters }
    }

    pub fn next(&self, name: CounterName) -> Result<u64, WorkflowError> {
        self.counters
            .transaction(|counters| next_in(counters, name))
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => WorkflowError::Storage(e),
            })
    }

    /// Last value handed out for `name`, zero if it was never used.
    pub fn peek(&self, name: CounterName) -> Result<u64, WorkflowError> {
        match self.counters.get(name.as_str())? {
            Some(raw) => Ok(decode_counter(name, &raw)?),
            None => Ok(0),
        }
    }
}
