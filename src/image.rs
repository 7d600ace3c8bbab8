//! Provider-neutral view of a machine image.
//!
//! Records are created and destroyed by the compute provider; this crate only
//! reads them. Backends translate their own response shapes into
//! [`ImageRecord`] so the filter, tag builder, and metadata snapshot never see
//! SDK types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key/value tag attached to an image by its owner.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImageTag {
    /// Tag key.
    pub key: String,
    /// Tag value (may be empty).
    pub value: String,
}

impl ImageTag {
    /// Creates a tag from any string-like key and value.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Lifecycle state reported for an image.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    /// Image is still being created.
    Pending,
    /// Image is usable.
    Available,
    /// Image creation failed.
    Failed,
    /// Any other provider state, kept verbatim.
    #[serde(untagged)]
    Other(String),
}

impl ImageState {
    /// Normalizes a provider state string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Self::Pending,
            "available" => Self::Available,
            "failed" => Self::Failed,
            _ => Self::Other(raw.trim().to_owned()),
        }
    }

    /// Returns the state as a lowercase string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Available => "available",
            Self::Failed => "failed",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

/// Block device mapping captured for the archive descriptor.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct BlockDeviceMapping {
    /// Device name (for example `/dev/xvda`).
    pub device_name: Option<String>,
    /// Snapshot backing the device, when EBS backed.
    pub snapshot_id: Option<String>,
    /// Volume size in GiB.
    pub volume_size: Option<i32>,
    /// Volume type (for example `gp3`).
    pub volume_type: Option<String>,
    /// Whether the volume is removed with the instance.
    pub delete_on_termination: Option<bool>,
}

/// Read-only snapshot of a provider image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageRecord {
    /// Provider-assigned identifier.
    pub id: String,
    /// Image name; `None` when the provider omits it.
    pub name: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Creation instant, `None` when absent or unparseable.
    pub created_at: Option<DateTime<Utc>>,
    /// Creation timestamp exactly as the provider reported it.
    pub creation_date_raw: Option<String>,
    /// CPU architecture.
    pub architecture: Option<String>,
    /// Platform (for example `windows`); Linux images usually omit it.
    pub platform: Option<String>,
    /// Virtualization type.
    pub virtualization_type: Option<String>,
    /// Root device type (`ebs` or `instance-store`).
    pub root_device_type: Option<String>,
    /// Root device name.
    pub root_device_name: Option<String>,
    /// Block device mappings.
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    /// Owner tags in provider order.
    pub tags: Vec<ImageTag>,
    /// Lifecycle state.
    pub state: ImageState,
}

impl ImageRecord {
    /// Starts a record with only the identifier set.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            created_at: None,
            creation_date_raw: None,
            architecture: None,
            platform: None,
            virtualization_type: None,
            root_device_type: None,
            root_device_name: None,
            block_device_mappings: Vec::new(),
            tags: Vec::new(),
            state: ImageState::Available,
        }
    }

    /// Sets the image name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the creation instant and its raw provider rendering.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.creation_date_raw = Some(created_at.to_rfc3339());
        self.created_at = Some(created_at);
        self
    }

    /// Sets the creation timestamp from a provider string, keeping the raw
    /// value even when it does not parse.
    #[must_use]
    pub fn with_creation_date(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        self.created_at = parse_timestamp(&raw);
        self.creation_date_raw = Some(raw);
        self
    }

    /// Appends an owner tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(ImageTag::new(key, value));
        self
    }

    /// Returns the name when it is present and not blank.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.trim().is_empty())
    }
}

/// Parses an RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
