//! Archive descriptor documents kept next to each archive.
//!
//! One JSON document is written per successful export under
//! `<prefix>/<image id>/<write timestamp>.json`. Earlier documents are never
//! overwritten; lookups pick the most recently modified one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{ArchiveStorage, PutObject};
use crate::error::ArchiveError;
use crate::image::{BlockDeviceMapping, ImageRecord, ImageTag};
use crate::task::ArchiveLocation;

/// Default key prefix for metadata documents.
pub const DEFAULT_METADATA_PREFIX: &str = "ami-metadata";

const CONTENT_TYPE: &str = "application/json";
const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Descriptor of one archived image.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ArchiveMetadata {
    /// Instant the archive was produced.
    #[serde(rename = "creation_date")]
    pub created_at: DateTime<Utc>,
    /// Source image identifier.
    pub ami_id: String,
    /// Source image name.
    pub ami_name: Option<String>,
    /// Source image description.
    pub description: Option<String>,
    /// Owner tags of the source image.
    #[serde(default)]
    pub tags: Vec<ImageTag>,
    /// Root device type.
    pub root_device_type: Option<String>,
    /// Root device name.
    pub root_device_name: Option<String>,
    /// Block device mappings.
    #[serde(default)]
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    /// Virtualization type.
    pub virtualization_type: Option<String>,
    /// CPU architecture.
    pub architecture: Option<String>,
    /// Platform.
    pub platform: Option<String>,
    /// Image state when archived.
    pub state: String,
    /// Export task that produced the archive.
    pub task_id: String,
    /// Bucket holding the archive object.
    pub archive_bucket: String,
    /// Key of the archive object.
    pub archive_key: String,
}

impl ArchiveMetadata {
    /// Snapshots `image` together with the archive produced by `task_id`.
    #[must_use]
    pub fn from_image(
        image: &ImageRecord,
        task_id: &str,
        location: &ArchiveLocation,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            created_at,
            ami_id: image.id.clone(),
            ami_name: image.name.clone(),
            description: image.description.clone(),
            tags: image.tags.clone(),
            root_device_type: image.root_device_type.clone(),
            root_device_name: image.root_device_name.clone(),
            block_device_mappings: image.block_device_mappings.clone(),
            virtualization_type: image.virtualization_type.clone(),
            architecture: image.architecture.clone(),
            platform: image.platform.clone(),
            state: image.state.as_str().to_owned(),
            task_id: task_id.to_owned(),
            archive_bucket: location.bucket.clone(),
            archive_key: location.key.clone(),
        }
    }

    /// Location of the archive object this document describes.
    #[must_use]
    pub fn archive_location(&self) -> ArchiveLocation {
        ArchiveLocation {
            bucket: self.archive_bucket.clone(),
            key: self.archive_key.clone(),
        }
    }
}

/// Reads and writes [`ArchiveMetadata`] documents in archive storage.
#[derive(Debug)]
pub struct MetadataStore<'a, S> {
    storage: &'a S,
    prefix: String,
}

impl<'a, S> MetadataStore<'a, S>
where
    S: ArchiveStorage,
{
    /// Creates a store rooted at `prefix` (trailing slashes are ignored).
    #[must_use]
    pub fn new(storage: &'a S, prefix: &str) -> Self {
        Self {
            storage,
            prefix: prefix.trim_end_matches('/').to_owned(),
        }
    }

    /// Key prefix shared by every document of `image_id`.
    #[must_use]
    pub fn image_prefix(&self, image_id: &str) -> String {
        if self.prefix.is_empty() {
            format!("{image_id}/")
        } else {
            format!("{}/{image_id}/", self.prefix)
        }
    }

    /// Key of the document written for `image_id` at `written_at`.
    #[must_use]
    pub fn document_key(&self, image_id: &str, written_at: DateTime<Utc>) -> String {
        format!(
            "{}{}.json",
            self.image_prefix(image_id),
            written_at.format(KEY_TIMESTAMP_FORMAT)
        )
    }

    /// Stores `metadata` as a new document and returns its key.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Metadata`] when serialization fails and
    /// [`ArchiveError::Provider`] when the write fails.
    pub async fn write(
        &self,
        metadata: &ArchiveMetadata,
        written_at: DateTime<Utc>,
    ) -> Result<String, ArchiveError<S::Error>> {
        let key = self.document_key(&metadata.ami_id, written_at);
        let body = serde_json::to_vec_pretty(metadata).map_err(|err| ArchiveError::Metadata {
            key: key.clone(),
            message: err.to_string(),
        })?;
        let tags = [
            (String::from("AMI_ID"), metadata.ami_id.clone()),
            (String::from("TaskId"), metadata.task_id.clone()),
        ];
        self.storage
            .put_object(PutObject {
                key: &key,
                body,
                content_type: CONTENT_TYPE,
                tags: &tags,
            })
            .await
            .map_err(ArchiveError::Provider)?;
        info!(image_id = %metadata.ami_id, %key, "metadata document written");
        Ok(key)
    }

    /// Returns the most recently written document for `image_id`, or `None`
    /// when the image was never archived.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Provider`] when listing or reading fails and
    /// [`ArchiveError::Metadata`] when the document does not parse.
    pub async fn read_latest(
        &self,
        image_id: &str,
    ) -> Result<Option<ArchiveMetadata>, ArchiveError<S::Error>> {
        let prefix = self.image_prefix(image_id);
        let objects = self
            .storage
            .list_objects(&prefix)
            .await
            .map_err(ArchiveError::Provider)?;
        debug!(%image_id, %prefix, documents = objects.len(), "listed metadata documents");

        let Some(latest) = objects
            .into_iter()
            .max_by(|left, right| {
                left.last_modified
                    .cmp(&right.last_modified)
                    .then_with(|| left.key.cmp(&right.key))
            })
        else {
            warn!(%image_id, "no metadata found");
            return Ok(None);
        };

        let Some(body) = self
            .storage
            .get_object(&latest.key)
            .await
            .map_err(ArchiveError::Provider)?
        else {
            warn!(%image_id, key = %latest.key, "metadata document vanished before read");
            return Ok(None);
        };

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|err| ArchiveError::Metadata {
                key: latest.key,
                message: err.to_string(),
            })
    }
}
