//! Provider-side export and import tasks.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of an archive task.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskDirection {
    /// Image copied into object storage.
    Export,
    /// Image reconstructed from object storage.
    Import,
}

impl fmt::Display for TaskDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Export => f.write_str("export"),
            Self::Import => f.write_str("import"),
        }
    }
}

/// Normalized task state. Provider vocabularies differ; backends map theirs
/// onto these four.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    /// Accepted but not yet running.
    Pending,
    /// Running.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully.
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Bucket and key of an archive object.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArchiveLocation {
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
}

impl fmt::Display for ArchiveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Identifier and location returned by a provider when a task starts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchedTask {
    /// Provider-assigned task identifier.
    pub task_id: String,
    /// Object the task reads or writes.
    pub location: ArchiveLocation,
}

/// A launched export or import task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiveTask {
    /// Provider-assigned task identifier.
    pub id: String,
    /// Export or import.
    pub direction: TaskDirection,
    /// Image exported, or the image whose archive is imported.
    pub image_id: String,
    /// Last known state.
    pub state: TaskState,
    /// Last known progress percentage.
    pub progress: Option<u8>,
    /// Provider message, present on failure.
    pub status_message: Option<String>,
    /// Local instant the task was launched.
    pub started_at: DateTime<Utc>,
    /// Object the task reads or writes.
    pub location: ArchiveLocation,
}

/// State observed by a single poll.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskSnapshot {
    /// Normalized state.
    pub state: TaskState,
    /// Progress percentage, when reported.
    pub progress: Option<u8>,
    /// Provider status or failure message.
    pub status_message: Option<String>,
    /// Resource produced by the task (the new image for imports).
    pub resource_id: Option<String>,
}

impl TaskSnapshot {
    /// Snapshot with only a state.
    #[must_use]
    pub const fn new(state: TaskState) -> Self {
        Self {
            state,
            progress: None,
            status_message: None,
            resource_id: None,
        }
    }

    /// Sets the progress percentage, clamped to 100.
    #[must_use]
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Sets the produced resource identifier.
    #[must_use]
    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

/// Converts a provider progress value into a percentage, discarding values
/// outside `0..=100`.
#[must_use]
pub fn clamp_progress(raw: i64) -> Option<u8> {
    u8::try_from(raw).ok().filter(|value| *value <= 100)
}
