//! Polls a provider task until it reaches a terminal state.
//!
//! The monitor is a small state machine. Each poll normalizes the provider's
//! answer into a [`TaskState`]; `completed` ends monitoring successfully,
//! `failed` ends it with the provider's message, and anything else either
//! times out (when the budget measured from the task's launch instant is
//! spent) or sleeps for one poll interval. Both the poll and the sleep race a
//! cancellation token so callers can abandon monitoring at any time, even
//! while the provider is slow to answer.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::ImageBackend;
use crate::clock::Clock;
use crate::error::ArchiveError;
use crate::task::{ArchiveTask, TaskSnapshot, TaskState};

/// Interval between two polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Budget for a task to reach a terminal state.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(5400);

/// Successful end of monitoring.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskCompletion {
    /// Provider task identifier.
    pub task_id: String,
    /// Resource produced by the task, when the provider reports one.
    pub resource_id: Option<String>,
    /// Number of polls performed.
    pub polls: u32,
}

/// Where the monitor stands after a poll.
#[derive(Clone, Debug, Eq, PartialEq)]
enum Transition {
    Completed(TaskSnapshot),
    Failed(String),
    TimedOut,
    KeepPolling,
}

/// Polls tasks on a fixed cadence under a fixed timeout.
#[derive(Debug)]
pub struct TaskMonitor<'a, B, C> {
    backend: &'a B,
    clock: &'a C,
    cancel: CancellationToken,
    poll_interval: Duration,
    timeout: Duration,
}

impl<'a, B, C> TaskMonitor<'a, B, C>
where
    B: ImageBackend,
    C: Clock,
{
    /// Creates a monitor with the default cadence and budget.
    #[must_use]
    pub const fn new(backend: &'a B, clock: &'a C, cancel: CancellationToken) -> Self {
        Self {
            backend,
            clock,
            cancel,
            poll_interval: POLL_INTERVAL,
            timeout: TASK_TIMEOUT,
        }
    }

    /// Overrides the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the timeout budget.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Polls `task` until it completes, fails, times out, or is cancelled.
    ///
    /// `task` is updated with the last observed state, progress, and message,
    /// so after a terminal outcome it reflects what the provider reported.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::TaskFailed`] when the provider reports
    /// failure, [`ArchiveError::TaskTimeout`] when the budget is exceeded,
    /// [`ArchiveError::Cancelled`] when the token fires, and
    /// [`ArchiveError::Provider`] when a poll itself fails.
    pub async fn wait(
        &self,
        task: &mut ArchiveTask,
    ) -> Result<TaskCompletion, ArchiveError<B::Error>> {
        info!(task_id = %task.id, direction = %task.direction, image_id = %task.image_id, "monitoring task");
        let mut polls = 0_u32;

        loop {
            let snapshot = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(self.cancelled(task)),
                polled = self.backend.describe_task(task) => polled.map_err(ArchiveError::Provider)?,
            };
            polls = polls.saturating_add(1);
            task.state = snapshot.state;
            task.progress = snapshot.progress.or(task.progress);
            task.status_message.clone_from(&snapshot.status_message);

            info!(
                task_id = %task.id,
                state = %snapshot.state,
                progress = task.progress.unwrap_or(0),
                poll = polls,
                "task status"
            );

            match self.transition(task, snapshot) {
                Transition::Completed(snapshot) => {
                    info!(task_id = %task.id, polls, "task completed");
                    return Ok(TaskCompletion {
                        task_id: task.id.clone(),
                        resource_id: snapshot.resource_id,
                        polls,
                    });
                }
                Transition::Failed(message) => {
                    error!(task_id = %task.id, %message, "task failed");
                    return Err(ArchiveError::TaskFailed {
                        task_id: task.id.clone(),
                        message,
                    });
                }
                Transition::TimedOut => {
                    task.state = TaskState::Failed;
                    error!(task_id = %task.id, timeout_secs = self.timeout.as_secs(), "task timed out");
                    return Err(ArchiveError::TaskTimeout {
                        task_id: task.id.clone(),
                        timeout_secs: self.timeout.as_secs(),
                    });
                }
                Transition::KeepPolling => {}
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(self.cancelled(task)),
                () = self.clock.sleep(self.poll_interval) => {}
            }
        }
    }

    fn transition(&self, task: &ArchiveTask, snapshot: TaskSnapshot) -> Transition {
        match snapshot.state {
            TaskState::Completed => Transition::Completed(snapshot),
            TaskState::Failed => Transition::Failed(
                snapshot
                    .status_message
                    .unwrap_or_else(|| String::from("no status message reported")),
            ),
            TaskState::Pending | TaskState::InProgress => {
                let elapsed = self.clock.now().signed_duration_since(task.started_at);
                let budget = chrono::Duration::from_std(self.timeout)
                    .unwrap_or(chrono::Duration::MAX);
                if elapsed > budget {
                    Transition::TimedOut
                } else {
                    Transition::KeepPolling
                }
            }
        }
    }

    fn cancelled(&self, task: &ArchiveTask) -> ArchiveError<B::Error> {
        warn!(task_id = %task.id, "task monitoring cancelled");
        ArchiveError::Cancelled {
            task_id: task.id.clone(),
        }
    }
}
