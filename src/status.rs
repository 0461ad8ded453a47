//! Case phases, the known status names and which transitions are legal.
//!
//! Status names are part of the stored documents and are kept verbatim,
//! including the historical spellings ("Case Withdrawed", "Abandaned").
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    minicbor::Encode,
    minicbor::Decode,
    serde::Deserialize,
)]
#[serde(try_from = "String")]
pub enum CasePhase {
    #[n(0)]
    Distribution,
    #[n(1)]
    Negotiation,
    #[n(2)]
    MediationBoard,
    #[n(3)]
    Litigation,
    #[n(4)]
    WriteOff,
    #[n(5)]
    Abnormal,
    #[n(6)]
    Closed,
}

impl CasePhase {
    pub const ALL: [CasePhase; 7] = [
        CasePhase::Distribution,
        CasePhase::Negotiation,
        CasePhase::MediationBoard,
        CasePhase::Litigation,
        CasePhase::WriteOff,
        CasePhase::Abnormal,
        CasePhase::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CasePhase::Distribution => "Distribution",
            CasePhase::Negotiation => "Negotiation",
            CasePhase::MediationBoard => "Mediation Board",
            CasePhase::Litigation => "Litigation",
            CasePhase::WriteOff => "Write Off",
            CasePhase::Abnormal => "Abnormal",
            CasePhase::Closed => "Closed",
        }
    }

    /// Phases a case may move into from this one.
    pub fn successors(&self) -> &'static [CasePhase] {
        use CasePhase::*;
        match self {
            Distribution => &[Distribution, Negotiation, Abnormal, WriteOff],
            Negotiation => &[
                Negotiation,
                MediationBoard,
                Distribution,
                Litigation,
                Abnormal,
                WriteOff,
                Closed,
            ],
            MediationBoard => &[
                MediationBoard,
                Negotiation,
                Distribution,
                Litigation,
                Abnormal,
                WriteOff,
                Closed,
            ],
            Litigation => &[Litigation, Distribution, Abnormal, WriteOff, Closed],
            WriteOff => &[WriteOff, Closed],
            Abnormal => &[Abnormal, Closed],
            Closed => &[],
        }
    }

    pub fn allows(&self, next: CasePhase) -> bool {
        self.successors().contains(&next)
    }
}

impl fmt::Display for CasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CasePhase {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CasePhase::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownPhase(s.to_string()))
    }
}

impl TryFrom<String> for CasePhase {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// Distribution
pub const OPEN_NO_AGENT: &str = "Open No Agent";
pub const OPEN_ASSIGN_AGENT: &str = "Open assign agent";
pub const PENDING_DRC_REASSIGN: &str = "Pending DRC Re-Assign";

// Negotiation
pub const RO_NEGOTIATION: &str = "RO Negotiation";
pub const NEGOTIATION_SETTLE_PENDING: &str = "Negotiation Settle pending";
pub const NEGOTIATION_SETTLE_OPEN_PENDING: &str = "Negotiation Settle Open-Pending";
pub const NEGOTIATION_SETTLE_ACTIVE: &str = "Negotiation Settle Active";
pub const RO_NEGOTIATION_FMB_PENDING: &str = "RO Negotiation FMB Pending";

// Mediation board
pub const FORWARD_TO_MEDIATION_BOARD: &str = "Forward to Mediation Board";
pub const MB_NEGOTIATION: &str = "MB Negotiation";
pub const MB_REQUEST_CUSTOMER_INFO: &str = "MB Request Customer-Info";
pub const MB_HANDOVER_CUSTOMER_INFO: &str = "MB Handover Customer-Info";
pub const MB_SETTLE_PENDING: &str = "MB Settle Pending";
pub const MB_SETTLE_OPEN_PENDING: &str = "MB Settle Open-Pending";
pub const MB_SETTLE_ACTIVE: &str = "MB Settle Active";
pub const MB_FAIL_WITH_PENDING_NON_SETTLEMENT: &str = "MB Fail with Pending Non-Settlement";

// Litigation
pub const PENDING_FTL: &str = "Pending FTL";
pub const LITIGATION: &str = "Litigation";

// Write off
pub const PENDING_WRITE_OFF: &str = "Pending Write Off";
pub const WRITE_OFF: &str = "Write Off";

// Abnormal
pub const PENDING_CASE_WITHDRAWAL: &str = "Pending Case Withdrawal";
pub const CASE_WITHDRAWED: &str = "Case Withdrawed";
pub const ABANDANED: &str = "Abandaned";
pub const CASE_ABANDONED: &str = "Case Abandoned";

// Closed
pub const COMMISSIONED: &str = "Commissioned";
pub const CASE_CLOSE: &str = "Case Close";

pub const NEGOTIATION_STATUSES: &[&str] = &[
    RO_NEGOTIATION,
    NEGOTIATION_SETTLE_PENDING,
    NEGOTIATION_SETTLE_OPEN_PENDING,
    NEGOTIATION_SETTLE_ACTIVE,
    RO_NEGOTIATION_FMB_PENDING,
];

pub const MEDIATION_BOARD_STATUSES: &[&str] = &[
    FORWARD_TO_MEDIATION_BOARD,
    MB_NEGOTIATION,
    MB_REQUEST_CUSTOMER_INFO,
    MB_HANDOVER_CUSTOMER_INFO,
    MB_SETTLE_PENDING,
    MB_SETTLE_OPEN_PENDING,
    MB_SETTLE_ACTIVE,
    MB_FAIL_WITH_PENDING_NON_SETTLEMENT,
];

/// Phase a known status belongs to.
pub fn phase_of(status: &str) -> Option<CasePhase> {
    use CasePhase::*;
    let phase = match status {
        OPEN_NO_AGENT | OPEN_ASSIGN_AGENT | PENDING_DRC_REASSIGN => Distribution,
        PENDING_FTL | LITIGATION => Litigation,
        PENDING_WRITE_OFF | WRITE_OFF => WriteOff,
        PENDING_CASE_WITHDRAWAL | CASE_WITHDRAWED | ABANDANED | CASE_ABANDONED => Abnormal,
        COMMISSIONED | CASE_CLOSE => Closed,
        s if NEGOTIATION_STATUSES.contains(&s) => Negotiation,
        s if MEDIATION_BOARD_STATUSES.contains(&s) => MediationBoard,
        _ => return None,
    };
    Some(phase)
}

/// Fails unless `status` is one of `allowed`.
pub fn require_whitelisted(
    status: &str,
    allowed: &[&str],
    workflow: &'static str,
) -> Result<(), ValidationError> {
    if allowed.contains(&status) {
        return Ok(());
    }
    Err(ValidationError::NotInWhitelist {
        status: status.to_string(),
        workflow,
    })
}

/// The "settle pending" status a settlement moves a case into, per phase.
pub fn settle_pending_status(phase: CasePhase) -> Option<&'static str> {
    match phase {
        CasePhase::Negotiation => Some(NEGOTIATION_SETTLE_PENDING),
        CasePhase::MediationBoard => Some(MB_SETTLE_PENDING),
        _ => None,
    }
}
