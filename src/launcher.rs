//! Starts export and import tasks and stamps their launch instant.

use tracing::info;

use crate::backend::{ExportRequest, ImageBackend, ImportRequest};
use crate::clock::Clock;
use crate::error::ArchiveError;
use crate::image::ImageRecord;
use crate::tags::ArchiveTags;
use crate::task::{ArchiveLocation, ArchiveTask, LaunchedTask, TaskDirection, TaskState};

/// Destination of exported archives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiveTarget {
    /// Archive bucket.
    pub bucket: String,
    /// Key prefix for archive objects.
    pub prefix: String,
}

/// Launches provider tasks against the configured archive target.
#[derive(Debug)]
pub struct TaskLauncher<'a, B, C> {
    backend: &'a B,
    clock: &'a C,
    target: &'a ArchiveTarget,
}

impl<'a, B, C> TaskLauncher<'a, B, C>
where
    B: ImageBackend,
    C: Clock,
{
    /// Creates a launcher borrowing the backend, clock, and target.
    #[must_use]
    pub const fn new(backend: &'a B, clock: &'a C, target: &'a ArchiveTarget) -> Self {
        Self {
            backend,
            clock,
            target,
        }
    }

    /// Starts exporting `image` with `tags` attached to the archive object.
    ///
    /// The caller is responsible for having resolved `image` through the
    /// provider; this method does not re-check that it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Provider`] when the provider rejects the task.
    pub async fn launch_export(
        &self,
        image: &ImageRecord,
        tags: &ArchiveTags,
    ) -> Result<ArchiveTask, ArchiveError<B::Error>> {
        info!(
            image_id = %image.id,
            bucket = %self.target.bucket,
            tag_count = tags.len(),
            "starting export task"
        );
        let launched = self
            .backend
            .start_export(ExportRequest {
                image_id: &image.id,
                bucket: &self.target.bucket,
                prefix: &self.target.prefix,
                tags,
            })
            .await
            .map_err(ArchiveError::Provider)?;
        Ok(self.pending(launched, TaskDirection::Export, &image.id))
    }

    /// Starts restoring the archive at `source` as a new image called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Provider`] when the provider rejects the task.
    pub async fn launch_import(
        &self,
        source: &ArchiveLocation,
        image_id: &str,
        name: &str,
    ) -> Result<ArchiveTask, ArchiveError<B::Error>> {
        info!(%image_id, %source, %name, "starting import task");
        let launched = self
            .backend
            .start_import(ImportRequest { source, name })
            .await
            .map_err(ArchiveError::Provider)?;
        Ok(self.pending(launched, TaskDirection::Import, image_id))
    }

    fn pending(
        &self,
        launched: LaunchedTask,
        direction: TaskDirection,
        image_id: &str,
    ) -> ArchiveTask {
        info!(
            task_id = %launched.task_id,
            %direction,
            location = %launched.location,
            "task launched"
        );
        ArchiveTask {
            id: launched.task_id,
            direction,
            image_id: image_id.to_owned(),
            state: TaskState::Pending,
            progress: None,
            status_message: None,
            started_at: self.clock.now(),
            location: launched.location,
        }
    }
}
