//! Descriptive tags attached to an archive object.
//!
//! The descriptive keys are fixed and enumerated; owner tags from the source
//! image are carried in a separate map and re-keyed with
//! [`PASSTHROUGH_PREFIX`] so they cannot shadow a descriptive key.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::image::ImageRecord;

/// Placeholder recorded when an image field is absent.
pub const PLACEHOLDER: &str = "N/A";

/// Prefix applied to owner tags copied from the source image.
pub const PASSTHROUGH_PREFIX: &str = "AMI_Tag_";

/// Descriptive keys written on every archive, in emission order.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ArchiveTagKey {
    /// Instant the archive was produced.
    BackupDate,
    /// Source image identifier.
    AmiId,
    /// Source image name.
    AmiName,
    /// Source image creation timestamp.
    AmiCreationDate,
    /// Source image platform.
    Platform,
    /// Source image architecture.
    Architecture,
    /// Source image root device type.
    RootDeviceType,
    /// Source image virtualization type.
    VirtualizationType,
}

impl ArchiveTagKey {
    /// Every descriptive key in emission order.
    pub const ALL: [Self; 8] = [
        Self::BackupDate,
        Self::AmiId,
        Self::AmiName,
        Self::AmiCreationDate,
        Self::Platform,
        Self::Architecture,
        Self::RootDeviceType,
        Self::VirtualizationType,
    ];

    /// Tag key as written to storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BackupDate => "BackupDate",
            Self::AmiId => "AMI_ID",
            Self::AmiName => "AMI_Name",
            Self::AmiCreationDate => "AMI_CreationDate",
            Self::Platform => "Platform",
            Self::Architecture => "Architecture",
            Self::RootDeviceType => "RootDeviceType",
            Self::VirtualizationType => "VirtualizationType",
        }
    }
}

/// Tag set for one archive object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiveTags {
    descriptive: Vec<(ArchiveTagKey, String)>,
    passthrough: BTreeMap<String, String>,
}

impl ArchiveTags {
    /// Value recorded for a descriptive key.
    #[must_use]
    pub fn get(&self, key: ArchiveTagKey) -> Option<&str> {
        self.descriptive
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, value)| value.as_str())
    }

    /// Owner tags keyed by their prefixed name.
    #[must_use]
    pub const fn passthrough(&self) -> &BTreeMap<String, String> {
        &self.passthrough
    }

    /// Flattens the set into ordered key/value strings: descriptive keys
    /// first, then owner tags.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.descriptive
            .iter()
            .map(|(key, value)| (key.as_str().to_owned(), value.clone()))
            .chain(
                self.passthrough
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone())),
            )
            .collect()
    }

    /// Number of tags in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptive.len() + self.passthrough.len()
    }

    /// Returns `true` when the set holds no tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derives the archive tag set for `image`, stamping `now` as the backup
/// date.
#[must_use]
pub fn build_archive_tags(image: &ImageRecord, now: DateTime<Utc>) -> ArchiveTags {
    let descriptive = ArchiveTagKey::ALL
        .into_iter()
        .map(|key| (key, descriptive_value(key, image, now)))
        .collect();

    let passthrough = image
        .tags
        .iter()
        .map(|tag| (format!("{PASSTHROUGH_PREFIX}{}", tag.key), tag.value.clone()))
        .collect();

    ArchiveTags {
        descriptive,
        passthrough,
    }
}

fn descriptive_value(key: ArchiveTagKey, image: &ImageRecord, now: DateTime<Utc>) -> String {
    let value = match key {
        ArchiveTagKey::BackupDate => Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ArchiveTagKey::AmiId => Some(image.id.clone()),
        ArchiveTagKey::AmiName => image.display_name().map(str::to_owned),
        ArchiveTagKey::AmiCreationDate => image.creation_date_raw.clone(),
        ArchiveTagKey::Platform => image.platform.clone(),
        ArchiveTagKey::Architecture => image.architecture.clone(),
        ArchiveTagKey::RootDeviceType => image.root_device_type.clone(),
        ArchiveTagKey::VirtualizationType => image.virtualization_type.clone(),
    };
    value
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| PLACEHOLDER.to_owned())
}
