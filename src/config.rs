//! Engine configuration, read from TOML.
//!
//! ```toml
//! [storage]
//! path = "/var/lib/case-lifecycle/db"
//!
//! [limits]
//! max_drc_assignments = 3
//! max_monitor_months = 5
//!
//! [[delegations]]
//! phase = "Distribution"
//! approver_type = "DRC Re-Assign Approval"
//! user_id = "ops_manager"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::approval::ApprovalKind;
use crate::status::CasePhase;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub tasks: TaskSettings,
    /// Who approves what, per phase and approver type.
    #[serde(default)]
    pub delegations: Vec<DelegationRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// Open a throwaway database that is removed on drop.
    #[serde(default)]
    pub temporary: bool,
}

/// Domain caps re-checked whenever a DRC assignment is approved.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Limits {
    #[serde(default = "default_max_drc_assignments")]
    pub max_drc_assignments: usize,
    #[serde(default = "default_max_monitor_months")]
    pub max_monitor_months: u32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TaskSettings {
    #[serde(default = "default_distribution_summary_template")]
    pub distribution_summary_template_id: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelegationRule {
    pub phase: CasePhase,
    pub approver_type: ApprovalKind,
    #[serde(default)]
    pub billing_center: Option<String>,
    pub user_id: String,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("case_lifecycle.db")
}

fn default_max_drc_assignments() -> usize {
    3
}

fn default_max_monitor_months() -> u32 {
    5
}

fn default_distribution_summary_template() -> u32 {
    23
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            temporary: false,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_drc_assignments: default_max_drc_assignments(),
            max_monitor_months: default_max_monitor_months(),
        }
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            distribution_summary_template_id: default_distribution_summary_template(),
        }
    }
}

impl WorkflowConfig {
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let config: WorkflowConfig = toml::from_str(raw).context("invalid workflow config")?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Config for a temporary database at `path`.
    pub fn temporary(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                path: path.into(),
                temporary: true,
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_empty_document() {
        let config = WorkflowConfig::from_toml_str("").unwrap();
        assert_eq!(config.limits.max_drc_assignments, 3);
        assert_eq!(config.limits.max_monitor_months, 5);
        assert_eq!(config.tasks.distribution_summary_template_id, 23);
        assert!(config.delegations.is_empty());
    }

    #[test]
    fn delegations_parse_phase_names() {
        let raw = r#"
            [limits]
            max_monitor_months = 6

            [[delegations]]
            phase = "Mediation Board"
            approver_type = "Case Write-Off Approval"
            billing_center = "BC-01"
            user_id = "mb_lead"
        "#;
        let config = WorkflowConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.limits.max_monitor_months, 6);
        assert_eq!(config.limits.max_drc_assignments, 3);
        assert_eq!(config.delegations[0].phase, CasePhase::MediationBoard);
        assert_eq!(config.delegations[0].approver_type, ApprovalKind::WriteOff);
        assert_eq!(config.delegations[0].billing_center.as_deref(), Some("BC-01"));
    }

    #[test]
    fn misspelled_approver_type_fails_at_load() {
        let raw = r#"
            [[delegations]]
            phase = "Negotiation"
            approver_type = "Comission Approval"
            user_id = "finance_lead"
        "#;
        let err = WorkflowConfig::from_toml_str(raw).unwrap_err();
        assert!(format!("{err:#}").contains("Comission Approval"));
    }

    #[test]
    fn unknown_phase_is_rejected() {
        let raw = r#"
            [[delegations]]
            phase = "Somewhere"
            approver_type = "Commission Approval"
            user_id = "x"
        "#;
        assert!(WorkflowConfig::from_toml_str(raw).is_err());
    }
}
