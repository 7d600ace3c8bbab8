//! Errors surfaced by the archive engine.

use thiserror::Error;

/// Failure of an archive, restore, or cleanup operation.
///
/// `BackendError` is the provider error type of the backend in use.
#[derive(Debug, Error)]
pub enum ArchiveError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when an image, metadata document, or archive object is absent.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of resource that was looked up.
        resource: &'static str,
        /// Identifier used for the lookup.
        id: String,
    },
    /// Raised when a provider call fails.
    #[error("provider error: {0}")]
    Provider(#[source] BackendError),
    /// Raised when the provider reports a terminal task failure.
    #[error("task {task_id} failed: {message}")]
    TaskFailed {
        /// Provider task identifier.
        task_id: String,
        /// Message reported by the provider.
        message: String,
    },
    /// Raised when a task does not finish within the monitoring budget.
    #[error("task {task_id} timed out after {timeout_secs} seconds")]
    TaskTimeout {
        /// Provider task identifier.
        task_id: String,
        /// Budget that was exceeded.
        timeout_secs: u64,
    },
    /// Raised when monitoring is abandoned through the cancellation token.
    #[error("monitoring of task {task_id} was cancelled")]
    Cancelled {
        /// Provider task identifier.
        task_id: String,
    },
    /// Raised when a metadata document cannot be encoded or decoded.
    #[error("metadata document {key} is invalid: {message}")]
    Metadata {
        /// Storage key of the document.
        key: String,
        /// Serializer message.
        message: String,
    },
}

impl<BackendError> ArchiveError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    pub(crate) fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Returns `true` when the error came from the cancellation token.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
