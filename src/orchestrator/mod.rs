//! End-to-end archive workflows: backup, restore, and retention cleanup.
//!
//! The orchestrator owns a backend and a clock and drives the smaller
//! components in order. Images are processed strictly one after another; a
//! batch backup logs and skips per-image failures but stops as soon as
//! monitoring is cancelled.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::ArchiveStorage;
use crate::clock::Clock;
use crate::eligibility::EligibilityPolicy;
use crate::error::ArchiveError;
use crate::image::ImageRecord;
use crate::launcher::{ArchiveTarget, TaskLauncher};
use crate::metadata::{ArchiveMetadata, MetadataStore};
use crate::monitor::{POLL_INTERVAL, TASK_TIMEOUT, TaskMonitor};
use crate::retention::{RetentionPolicy, RetentionSweeper, SweepScope, SweepSummary};
use crate::tags::build_archive_tags;
use crate::task::ArchiveLocation;

const RESTORED_NAME_SUFFIX: &str = "-restored";

/// Policy and destinations shared by every workflow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrchestratorSettings {
    /// Which images are archived.
    pub eligibility: EligibilityPolicy,
    /// Where archives are written.
    pub target: ArchiveTarget,
    /// Key prefix for metadata documents.
    pub metadata_prefix: String,
    /// How long archives are kept.
    pub retention: RetentionPolicy,
    /// Whether a metadata document is written after each backup.
    pub write_metadata: bool,
}

/// Successful backup of one image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackupResult {
    /// Source image identifier.
    pub image_id: String,
    /// Export task identifier.
    pub task_id: String,
    /// Source image name.
    pub name: Option<String>,
    /// Source image creation instant.
    pub created_at: Option<DateTime<Utc>>,
    /// Instant the export completed.
    pub backed_up_at: DateTime<Utc>,
    /// Archive object.
    pub location: ArchiveLocation,
    /// Key of the metadata document, when one was written.
    pub metadata_key: Option<String>,
}

/// Successful restore of one image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RestoreResult {
    /// Image the archive was taken from.
    pub source_image_id: String,
    /// Import task identifier.
    pub task_id: String,
    /// Newly registered image.
    pub restored_image_id: String,
    /// Number of original tags re-applied.
    pub tags_applied: usize,
}

/// Drives backup, restore, and cleanup against one backend.
#[derive(Debug)]
pub struct ArchiveOrchestrator<B, C> {
    backend: B,
    clock: C,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
    poll_interval: Duration,
    task_timeout: Duration,
}

impl<B, C> ArchiveOrchestrator<B, C>
where
    B: ArchiveStorage,
    C: Clock,
{
    /// Creates an orchestrator with the default monitoring cadence.
    #[must_use]
    pub fn new(backend: B, clock: C, settings: OrchestratorSettings) -> Self {
        Self {
            backend,
            clock,
            settings,
            cancel: CancellationToken::new(),
            poll_interval: POLL_INTERVAL,
            task_timeout: TASK_TIMEOUT,
        }
    }

    /// Uses `cancel` to abandon task monitoring.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Overrides the task poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the task timeout budget.
    #[must_use]
    pub const fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Lists images that the eligibility policy selects right now.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Provider`] when the catalog query fails.
    pub async fn find_eligible(&self) -> Result<Vec<ImageRecord>, ArchiveError<B::Error>> {
        let now = self.clock.now();
        let images = self
            .backend
            .list_images()
            .await
            .map_err(ArchiveError::Provider)?;
        let total = images.len();
        let eligible: Vec<ImageRecord> = images
            .into_iter()
            .filter(|image| self.settings.eligibility.is_eligible(image, now))
            .collect();
        info!(
            total,
            eligible = eligible.len(),
            max_age_days = self.settings.eligibility.max_age_days(),
            "eligible images selected"
        );
        Ok(eligible)
    }

    /// Backs up every eligible image, one at a time.
    ///
    /// Failures of individual images are logged and left out of the result.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Provider`] when the catalog query fails and
    /// [`ArchiveError::Cancelled`] when monitoring is cancelled mid-batch.
    pub async fn backup_all(&self) -> Result<Vec<BackupResult>, ArchiveError<B::Error>> {
        let eligible = self.find_eligible().await?;
        let mut results = Vec::with_capacity(eligible.len());
        for image in &eligible {
            match self.archive(image).await {
                Ok(result) => results.push(result),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => error!(image_id = %image.id, error = %err, "backup failed"),
            }
        }
        info!(
            attempted = eligible.len(),
            succeeded = results.len(),
            "backup batch finished"
        );
        Ok(results)
    }

    /// Backs up a single image regardless of eligibility.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotFound`] when the image does not exist, and
    /// the monitor's errors when the export does not complete.
    pub async fn backup_one(&self, image_id: &str) -> Result<BackupResult, ArchiveError<B::Error>> {
        let image = self
            .backend
            .describe_image(image_id)
            .await
            .map_err(ArchiveError::Provider)?
            .ok_or_else(|| ArchiveError::not_found("image", image_id))?;
        self.archive(&image).await
    }

    /// Restores the most recently archived copy of `image_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotFound`] when no metadata exists for the
    /// image (no import is attempted), the monitor's errors when the import
    /// does not complete, and [`ArchiveError::Provider`] when re-tagging
    /// fails.
    pub async fn restore_one(
        &self,
        image_id: &str,
    ) -> Result<RestoreResult, ArchiveError<B::Error>> {
        let metadata = self
            .metadata_store()
            .read_latest(image_id)
            .await?
            .ok_or_else(|| ArchiveError::not_found("metadata", image_id))?;
        let source = metadata.archive_location();

        let name = restored_name(&metadata);
        let mut task = self
            .launcher()
            .launch_import(&source, image_id, &name)
            .await?;
        let completion = self.monitor().wait(&mut task).await?;
        let restored_image_id = completion.resource_id.ok_or_else(|| ArchiveError::TaskFailed {
            task_id: task.id.clone(),
            message: String::from("import completed without reporting an image"),
        })?;

        if !metadata.tags.is_empty() {
            self.backend
                .tag_resource(&restored_image_id, &metadata.tags)
                .await
                .map_err(ArchiveError::Provider)?;
            info!(image_id = %restored_image_id, count = metadata.tags.len(), "original tags re-applied");
        }

        info!(source_image_id = %image_id, %restored_image_id, "restore finished");
        Ok(RestoreResult {
            source_image_id: image_id.to_owned(),
            task_id: task.id,
            restored_image_id,
            tags_applied: metadata.tags.len(),
        })
    }

    /// Deletes archive objects and metadata documents past the retention
    /// window. Other objects in the bucket are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Provider`] when a listing fails.
    pub async fn cleanup(&self) -> Result<SweepSummary, ArchiveError<B::Error>> {
        let now = self.clock.now();
        let mut summary =
            RetentionSweeper::new(&self.backend, SweepScope::archives(&self.settings.target.prefix))
                .sweep(self.settings.retention, now)
                .await?;
        let documents = RetentionSweeper::new(
            &self.backend,
            SweepScope::metadata_documents(&self.settings.metadata_prefix),
        )
        .sweep(self.settings.retention, now)
        .await?;
        summary.absorb(documents);
        Ok(summary)
    }

    async fn archive(&self, image: &ImageRecord) -> Result<BackupResult, ArchiveError<B::Error>> {
        let tags = build_archive_tags(image, self.clock.now());
        let mut task = self.launcher().launch_export(image, &tags).await?;
        let completion = self.monitor().wait(&mut task).await?;
        let backed_up_at = self.clock.now();

        let metadata_key = if self.settings.write_metadata {
            let metadata = ArchiveMetadata::from_image(
                image,
                &completion.task_id,
                &task.location,
                backed_up_at,
            );
            let key = self
                .metadata_store()
                .write(&metadata, backed_up_at)
                .await
                .inspect_err(|err| {
                    warn!(image_id = %image.id, error = %err, "archive stored but metadata write failed");
                })?;
            Some(key)
        } else {
            None
        };

        info!(image_id = %image.id, location = %task.location, "backup finished");
        Ok(BackupResult {
            image_id: image.id.clone(),
            task_id: completion.task_id,
            name: image.name.clone(),
            created_at: image.created_at,
            backed_up_at,
            location: task.location,
            metadata_key,
        })
    }

    fn launcher(&self) -> TaskLauncher<'_, B, C> {
        TaskLauncher::new(&self.backend, &self.clock, &self.settings.target)
    }

    fn monitor(&self) -> TaskMonitor<'_, B, C> {
        TaskMonitor::new(&self.backend, &self.clock, self.cancel.clone())
            .with_poll_interval(self.poll_interval)
            .with_timeout(self.task_timeout)
    }

    fn metadata_store(&self) -> MetadataStore<'_, B> {
        MetadataStore::new(&self.backend, &self.settings.metadata_prefix)
    }
}

/// Restored images take the archived name with a `-restored` suffix.
fn restored_name(metadata: &ArchiveMetadata) -> String {
    let base = metadata
        .ami_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(&metadata.ami_id);
    format!("{base}{RESTORED_NAME_SUFFIX}")
}

#[cfg(test)]
mod tests;
