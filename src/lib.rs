//! Core library for the `ami-vault` image archival tool.
//!
//! The crate selects machine images by name and age, exports them to object
//! storage through provider-side tasks, records a metadata document next to
//! each archive, restores archived images on demand, and deletes archives
//! past a retention window. Provider access sits behind the
//! [`ImageBackend`] and [`ArchiveStorage`] traits; [`AwsBackend`] implements
//! both with EC2 and S3.

pub mod aws;
pub mod backend;
pub mod clock;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod image;
pub mod launcher;
pub mod logging;
pub mod metadata;
pub mod monitor;
pub mod orchestrator;
pub mod retention;
pub mod tags;
pub mod task;
pub mod test_support;

pub use aws::{AwsBackend, AwsBackendError};
pub use backend::{
    ArchiveStorage, BackendFuture, ExportRequest, ImageBackend, ImportRequest, PutObject,
    StoredObject,
};
pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, ConfigOverrides, VaultConfig};
pub use eligibility::EligibilityPolicy;
pub use error::ArchiveError;
pub use image::{BlockDeviceMapping, ImageRecord, ImageState, ImageTag};
pub use launcher::{ArchiveTarget, TaskLauncher};
pub use metadata::{ArchiveMetadata, MetadataStore};
pub use monitor::{POLL_INTERVAL, TASK_TIMEOUT, TaskCompletion, TaskMonitor};
pub use orchestrator::{ArchiveOrchestrator, BackupResult, OrchestratorSettings, RestoreResult};
pub use retention::{ARCHIVE_SUFFIX, RetentionPolicy, RetentionSweeper, SweepScope, SweepSummary};
pub use tags::{ArchiveTagKey, ArchiveTags, build_archive_tags};
pub use task::{ArchiveLocation, ArchiveTask, TaskDirection, TaskSnapshot, TaskState};
