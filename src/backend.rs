//! Backend abstraction over the compute provider and archive object storage.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::image::{ImageRecord, ImageTag};
use crate::tags::ArchiveTags;
use crate::task::{ArchiveLocation, ArchiveTask, LaunchedTask, TaskSnapshot};

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Parameters for an export (store) task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExportRequest<'a> {
    /// Image to export.
    pub image_id: &'a str,
    /// Destination bucket.
    pub bucket: &'a str,
    /// Key prefix under which the provider should place the object, when it
    /// supports one.
    pub prefix: &'a str,
    /// Tags applied to the archive object.
    pub tags: &'a ArchiveTags,
}

/// Parameters for an import (restore) task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImportRequest<'a> {
    /// Archive object to import.
    pub source: &'a ArchiveLocation,
    /// Name given to the restored image.
    pub name: &'a str,
}

/// Compute provider operations: image catalog, archive tasks, tagging.
pub trait ImageBackend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every available image owned by the caller.
    fn list_images(&self) -> BackendFuture<'_, Vec<ImageRecord>, Self::Error>;

    /// Describes a single image; `None` when the identifier does not resolve.
    fn describe_image<'a>(
        &'a self,
        image_id: &'a str,
    ) -> BackendFuture<'a, Option<ImageRecord>, Self::Error>;

    /// Starts an export task.
    fn start_export<'a>(
        &'a self,
        request: ExportRequest<'a>,
    ) -> BackendFuture<'a, LaunchedTask, Self::Error>;

    /// Starts an import task.
    fn start_import<'a>(
        &'a self,
        request: ImportRequest<'a>,
    ) -> BackendFuture<'a, LaunchedTask, Self::Error>;

    /// Reads the current state of a launched task.
    fn describe_task<'a>(
        &'a self,
        task: &'a ArchiveTask,
    ) -> BackendFuture<'a, TaskSnapshot, Self::Error>;

    /// Applies tags to a provider resource.
    fn tag_resource<'a>(
        &'a self,
        resource_id: &'a str,
        tags: &'a [ImageTag],
    ) -> BackendFuture<'a, (), Self::Error>;
}

/// Object listed from archive storage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredObject {
    /// Object key.
    pub key: String,
    /// Last modification instant, when reported.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Payload written to archive storage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PutObject<'a> {
    /// Destination key.
    pub key: &'a str,
    /// Object body.
    pub body: Vec<u8>,
    /// MIME content type.
    pub content_type: &'a str,
    /// Object tags.
    pub tags: &'a [(String, String)],
}

/// Object storage operations on the archive bucket.
pub trait ArchiveStorage: ImageBackend {
    /// Lists every object whose key starts with `prefix`.
    fn list_objects<'a>(
        &'a self,
        prefix: &'a str,
    ) -> BackendFuture<'a, Vec<StoredObject>, Self::Error>;

    /// Reads an object body; `None` when the key does not exist.
    fn get_object<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Vec<u8>>, Self::Error>;

    /// Writes an object.
    fn put_object<'a>(&'a self, object: PutObject<'a>) -> BackendFuture<'a, (), Self::Error>;

    /// Deletes an object.
    fn delete_object<'a>(&'a self, key: &'a str) -> BackendFuture<'a, (), Self::Error>;
}
