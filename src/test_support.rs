//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use crate::backend::{
    ArchiveStorage, BackendFuture, ExportRequest, ImageBackend, ImportRequest, PutObject,
    StoredObject,
};
use crate::clock::{Clock, SleepFuture};
use crate::image::{ImageRecord, ImageTag};
use crate::retention::ARCHIVE_SUFFIX;
use crate::task::{
    ArchiveLocation, ArchiveTask, LaunchedTask, TaskDirection, TaskSnapshot, TaskState,
};

/// Fixed instant used as the default "now" in tests: 2026-10-16T12:00:00Z.
#[must_use]
pub fn reference_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Clock that only moves when slept on or advanced explicitly.
#[derive(Clone, Debug)]
pub struct ManualClock {
    state: Arc<Mutex<ClockState>>,
}

#[derive(Debug)]
struct ClockState {
    now: DateTime<Utc>,
    sleeps: u32,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState { now, sleeps: 0 })),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut state = lock(&self.state);
        state.now = add_std(state.now, by);
    }

    /// Number of completed sleeps.
    #[must_use]
    pub fn sleeps(&self) -> u32 {
        lock(&self.state).sleeps
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(reference_now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        lock(&self.state).now
    }

    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        let mut state = lock(&self.state);
        state.now = add_std(state.now, duration);
        state.sleeps = state.sleeps.saturating_add(1);
        Box::pin(std::future::ready(()))
    }
}

/// Errors raised by [`ScriptedBackend`] to model provider failures.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScriptedBackendError {
    /// Export rejected for the image.
    #[error("export rejected for {0}")]
    Export(String),
    /// Import rejected for the object.
    #[error("import rejected for {0}")]
    Import(String),
    /// Image lookup failed.
    #[error("describe images failed")]
    Describe,
    /// Task poll failed.
    #[error("describe task {0} failed")]
    Poll(String),
    /// Tagging failed.
    #[error("tagging {0} failed")]
    Tag(String),
    /// Listing objects failed.
    #[error("list objects failed for prefix {0}")]
    List(String),
    /// Writing an object failed.
    #[error("put object {0} failed")]
    Put(String),
    /// Deleting an object failed.
    #[error("delete object {0} failed")]
    Delete(String),
}

/// Object held by the scripted store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptedObject {
    /// Object body.
    pub body: Vec<u8>,
    /// Last modification instant.
    pub last_modified: Option<DateTime<Utc>>,
    /// Tags written with the object.
    pub tags: Vec<(String, String)>,
    /// Content type written with the object.
    pub content_type: String,
}

#[derive(Debug)]
struct TaskScript {
    steps: VecDeque<TaskSnapshot>,
    last: TaskSnapshot,
}

#[derive(Debug)]
struct BackendState {
    images: Vec<ImageRecord>,
    scripts: HashMap<String, TaskScript>,
    objects: BTreeMap<String, ScriptedObject>,
    write_time: DateTime<Utc>,
    failing_exports: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
    fail_describe: bool,
    fail_tagging: bool,
    fail_listing: bool,
    fail_puts: bool,
    stall_polls: bool,
    exports: Vec<String>,
    imports: Vec<ArchiveLocation>,
    restore_names: Vec<String>,
    tagged: Vec<(String, Vec<ImageTag>)>,
    deletes: Vec<String>,
    polls: u32,
    task_counter: u32,
}

/// In-memory compute provider and object store with scripted task outcomes.
///
/// Tasks without a script complete on their first poll; imports report a
/// restored image named `ami-restored-<image id>`.
#[derive(Clone, Debug)]
pub struct ScriptedBackend {
    state: Arc<Mutex<BackendState>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                images: Vec::new(),
                scripts: HashMap::new(),
                objects: BTreeMap::new(),
                write_time: reference_now(),
                failing_exports: BTreeSet::new(),
                failing_deletes: BTreeSet::new(),
                fail_describe: false,
                fail_tagging: false,
                fail_listing: false,
                fail_puts: false,
                stall_polls: false,
                exports: Vec::new(),
                imports: Vec::new(),
                restore_names: Vec::new(),
                tagged: Vec::new(),
                deletes: Vec::new(),
                polls: 0,
                task_counter: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        lock(&self.state)
    }

    /// Adds an image to the catalog.
    pub fn add_image(&self, image: ImageRecord) {
        self.state().images.push(image);
    }

    /// Scripts the poll answers for tasks of `image_id`. The final answer is
    /// repeated once the script is exhausted.
    pub fn script_task(&self, image_id: &str, steps: impl IntoIterator<Item = TaskSnapshot>) {
        let mut steps: VecDeque<TaskSnapshot> = steps.into_iter().collect();
        let last = steps
            .back()
            .cloned()
            .unwrap_or_else(|| TaskSnapshot::new(TaskState::Completed));
        if steps.len() == 1 {
            steps.clear();
        }
        self.state()
            .scripts
            .insert(image_id.to_owned(), TaskScript { steps, last });
    }

    /// Seeds an object in the store.
    pub fn seed_object(&self, key: &str, last_modified: DateTime<Utc>, body: impl Into<Vec<u8>>) {
        self.state().objects.insert(
            key.to_owned(),
            ScriptedObject {
                body: body.into(),
                last_modified: Some(last_modified),
                tags: Vec::new(),
                content_type: String::from("application/octet-stream"),
            },
        );
    }

    /// Sets the modification instant stamped on the next write; each write
    /// advances it by one second.
    pub fn set_write_time(&self, at: DateTime<Utc>) {
        self.state().write_time = at;
    }

    /// Makes exports of `image_id` fail.
    pub fn fail_export(&self, image_id: &str) {
        self.state().failing_exports.insert(image_id.to_owned());
    }

    /// Makes deletion of `key` fail.
    pub fn fail_delete(&self, key: &str) {
        self.state().failing_deletes.insert(key.to_owned());
    }

    /// Makes image lookups fail.
    pub fn fail_describe(&self) {
        self.state().fail_describe = true;
    }

    /// Makes tagging fail.
    pub fn fail_tagging(&self) {
        self.state().fail_tagging = true;
    }

    /// Makes object listings fail.
    pub fn fail_listing(&self) {
        self.state().fail_listing = true;
    }

    /// Makes object writes fail.
    pub fn fail_puts(&self) {
        self.state().fail_puts = true;
    }

    /// Makes task polls hang until the caller gives up on them.
    pub fn stall_polls(&self) {
        self.state().stall_polls = true;
    }

    /// Image identifiers passed to export, in call order.
    #[must_use]
    pub fn exports(&self) -> Vec<String> {
        self.state().exports.clone()
    }

    /// Archive objects passed to import, in call order.
    #[must_use]
    pub fn imports(&self) -> Vec<ArchiveLocation> {
        self.state().imports.clone()
    }

    /// Names requested for restored images, in call order.
    #[must_use]
    pub fn restore_names(&self) -> Vec<String> {
        self.state().restore_names.clone()
    }

    /// Tagging calls, in call order.
    #[must_use]
    pub fn tagged(&self) -> Vec<(String, Vec<ImageTag>)> {
        self.state().tagged.clone()
    }

    /// Keys passed to delete, in call order (failed deletes included).
    #[must_use]
    pub fn deletes(&self) -> Vec<String> {
        self.state().deletes.clone()
    }

    /// Number of task polls served.
    #[must_use]
    pub fn polls(&self) -> u32 {
        self.state().polls
    }

    /// Current keys in the store.
    #[must_use]
    pub fn object_keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    /// Returns a stored object.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<ScriptedObject> {
        self.state().objects.get(key).cloned()
    }

    fn next_task_id(&self, direction: TaskDirection) -> String {
        let mut state = self.state();
        state.task_counter = state.task_counter.saturating_add(1);
        format!("{direction}-{}", state.task_counter)
    }
}

impl ImageBackend for ScriptedBackend {
    type Error = ScriptedBackendError;

    fn list_images(&self) -> BackendFuture<'_, Vec<ImageRecord>, Self::Error> {
        Box::pin(async move {
            let state = self.state();
            if state.fail_describe {
                return Err(ScriptedBackendError::Describe);
            }
            Ok(state.images.clone())
        })
    }

    fn describe_image<'a>(
        &'a self,
        image_id: &'a str,
    ) -> BackendFuture<'a, Option<ImageRecord>, Self::Error> {
        Box::pin(async move {
            let state = self.state();
            if state.fail_describe {
                return Err(ScriptedBackendError::Describe);
            }
            Ok(state
                .images
                .iter()
                .find(|image| image.id == image_id)
                .cloned())
        })
    }

    fn start_export<'a>(
        &'a self,
        request: ExportRequest<'a>,
    ) -> BackendFuture<'a, LaunchedTask, Self::Error> {
        Box::pin(async move {
            let task_id = self.next_task_id(TaskDirection::Export);
            let mut state = self.state();
            state.exports.push(request.image_id.to_owned());
            if state.failing_exports.contains(request.image_id) {
                return Err(ScriptedBackendError::Export(request.image_id.to_owned()));
            }
            let key = format!("{}{}{ARCHIVE_SUFFIX}", request.prefix, request.image_id);
            let write_time = state.write_time;
            state.objects.insert(
                key.clone(),
                ScriptedObject {
                    body: Vec::new(),
                    last_modified: Some(write_time),
                    tags: request.tags.to_pairs(),
                    content_type: String::from("application/octet-stream"),
                },
            );
            Ok(LaunchedTask {
                task_id,
                location: ArchiveLocation {
                    bucket: request.bucket.to_owned(),
                    key,
                },
            })
        })
    }

    fn start_import<'a>(
        &'a self,
        request: ImportRequest<'a>,
    ) -> BackendFuture<'a, LaunchedTask, Self::Error> {
        Box::pin(async move {
            let task_id = self.next_task_id(TaskDirection::Import);
            let mut state = self.state();
            state.imports.push(request.source.clone());
            state.restore_names.push(request.name.to_owned());
            if !state.objects.contains_key(&request.source.key) {
                return Err(ScriptedBackendError::Import(request.source.to_string()));
            }
            Ok(LaunchedTask {
                task_id,
                location: request.source.clone(),
            })
        })
    }

    fn describe_task<'a>(
        &'a self,
        task: &'a ArchiveTask,
    ) -> BackendFuture<'a, TaskSnapshot, Self::Error> {
        Box::pin(async move {
            let stalled = self.state().stall_polls;
            if stalled {
                std::future::pending::<()>().await;
            }
            let mut state = self.state();
            state.polls = state.polls.saturating_add(1);
            let scripted = state.scripts.get_mut(&task.image_id).map(|script| {
                script
                    .steps
                    .pop_front()
                    .unwrap_or_else(|| script.last.clone())
            });
            let snapshot = scripted.unwrap_or_else(|| TaskSnapshot::new(TaskState::Completed));
            if task.direction == TaskDirection::Import
                && snapshot.state == TaskState::Completed
                && snapshot.resource_id.is_none()
            {
                return Ok(snapshot.with_resource(format!("ami-restored-{}", task.image_id)));
            }
            Ok(snapshot)
        })
    }

    fn tag_resource<'a>(
        &'a self,
        resource_id: &'a str,
        tags: &'a [ImageTag],
    ) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            if state.fail_tagging {
                return Err(ScriptedBackendError::Tag(resource_id.to_owned()));
            }
            state.tagged.push((resource_id.to_owned(), tags.to_vec()));
            Ok(())
        })
    }
}

impl ArchiveStorage for ScriptedBackend {
    fn list_objects<'a>(
        &'a self,
        prefix: &'a str,
    ) -> BackendFuture<'a, Vec<StoredObject>, Self::Error> {
        Box::pin(async move {
            let state = self.state();
            if state.fail_listing {
                return Err(ScriptedBackendError::List(prefix.to_owned()));
            }
            Ok(state
                .objects
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, object)| StoredObject {
                    key: key.clone(),
                    last_modified: object.last_modified,
                })
                .collect())
        })
    }

    fn get_object<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Vec<u8>>, Self::Error> {
        Box::pin(async move { Ok(self.state().objects.get(key).map(|object| object.body.clone())) })
    }

    fn put_object<'a>(&'a self, object: PutObject<'a>) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            if state.fail_puts {
                return Err(ScriptedBackendError::Put(object.key.to_owned()));
            }
            let written_at = state.write_time;
            state.write_time = add_std(written_at, Duration::from_secs(1));
            state.objects.insert(
                object.key.to_owned(),
                ScriptedObject {
                    body: object.body,
                    last_modified: Some(written_at),
                    tags: object.tags.to_vec(),
                    content_type: object.content_type.to_owned(),
                },
            );
            Ok(())
        })
    }

    fn delete_object<'a>(&'a self, key: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.state();
            state.deletes.push(key.to_owned());
            if state.failing_deletes.contains(key) {
                return Err(ScriptedBackendError::Delete(key.to_owned()));
            }
            state.objects.remove(key);
            Ok(())
        })
    }
}

/// Convenience snapshot for a running task.
#[must_use]
pub fn running() -> TaskSnapshot {
    TaskSnapshot::new(TaskState::InProgress)
}

/// Convenience snapshot for a completed task.
#[must_use]
pub fn completed() -> TaskSnapshot {
    TaskSnapshot::new(TaskState::Completed).with_progress(100)
}

/// Convenience snapshot for a failed task.
#[must_use]
pub fn failed(message: &str) -> TaskSnapshot {
    TaskSnapshot::new(TaskState::Failed).with_message(message)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn add_std(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
