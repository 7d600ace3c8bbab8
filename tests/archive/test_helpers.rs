//! Shared fixtures and helpers for archive BDD scenarios.

use ami_vault::test_support::{ManualClock, ScriptedBackend, ScriptedBackendError};
use ami_vault::{
    ArchiveError, ArchiveOrchestrator, ArchiveTarget, BackupResult, EligibilityPolicy,
    OrchestratorSettings, RestoreResult, RetentionPolicy, SweepSummary,
};
use rstest::fixture;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailureKind {
    NotFound,
    Provider,
    TaskFailed,
    Timeout,
    Cancelled,
    Metadata,
}

impl FailureKind {
    pub fn of(err: &ArchiveError<ScriptedBackendError>) -> Self {
        match err {
            ArchiveError::NotFound { .. } => Self::NotFound,
            ArchiveError::Provider(_) => Self::Provider,
            ArchiveError::TaskFailed { .. } => Self::TaskFailed,
            ArchiveError::TaskTimeout { .. } => Self::Timeout,
            ArchiveError::Cancelled { .. } => Self::Cancelled,
            ArchiveError::Metadata { .. } => Self::Metadata,
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim() {
            "not found" => Some(Self::NotFound),
            "provider" => Some(Self::Provider),
            "task failed" => Some(Self::TaskFailed),
            "timeout" => Some(Self::Timeout),
            "cancelled" => Some(Self::Cancelled),
            "metadata" => Some(Self::Metadata),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ArchiveOutcome {
    Backups(Vec<BackupResult>),
    Restored(RestoreResult),
    Swept(SweepSummary),
    Failure { kind: FailureKind, message: String },
}

#[derive(Clone, Debug)]
pub struct ArchiveContext {
    pub backend: ScriptedBackend,
    pub clock: ManualClock,
    pub outcome: Option<ArchiveOutcome>,
}

impl ArchiveContext {
    pub fn orchestrator(&self) -> ArchiveOrchestrator<ScriptedBackend, ManualClock> {
        ArchiveOrchestrator::new(self.backend.clone(), self.clock.clone(), settings())
    }

    pub fn record<T>(
        &mut self,
        result: Result<T, ArchiveError<ScriptedBackendError>>,
        wrap: impl FnOnce(T) -> ArchiveOutcome,
    ) {
        self.outcome = Some(match result {
            Ok(value) => wrap(value),
            Err(err) => ArchiveOutcome::Failure {
                kind: FailureKind::of(&err),
                message: err.to_string(),
            },
        });
    }
}

#[fixture]
pub fn archive_context() -> ArchiveContext {
    ArchiveContext {
        backend: ScriptedBackend::new(),
        clock: ManualClock::default(),
        outcome: None,
    }
}

pub fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        eligibility: EligibilityPolicy::new(["RHEL-7", "RHEL-8", "RHEL-9"], 180),
        target: ArchiveTarget {
            bucket: String::from("vault"),
            prefix: String::new(),
        },
        metadata_prefix: String::from("ami-metadata"),
        retention: RetentionPolicy::new(180),
        write_metadata: true,
    }
}

pub fn split_ids(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}
