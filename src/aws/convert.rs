//! Conversions between SDK shapes and the crate's domain types.

use aws_sdk_ec2::types::{Image, StoreImageTaskResult};
use chrono::{DateTime, Utc};

use crate::image::{BlockDeviceMapping, ImageRecord, ImageState, ImageTag};
use crate::task::{ArchiveLocation, TaskSnapshot, TaskState, clamp_progress};

/// Tolerated drift between the local clock and the provider's task start
/// times.
pub(crate) const TASK_START_SKEW_SECS: i64 = 300;
const MAX_TAG_KEY_CHARS: usize = 128;
const MAX_TAG_VALUE_CHARS: usize = 256;

/// Maps a store task state (`InProgress`, `Completed`, `Failed`).
pub(crate) fn store_task_state(raw: Option<&str>) -> TaskState {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("inprogress" | "in-progress" | "in_progress") => TaskState::InProgress,
        Some("completed") => TaskState::Completed,
        Some("failed") => TaskState::Failed,
        _ => TaskState::Pending,
    }
}

/// Maps the state of an image being restored. The restore task has no
/// status of its own; the new image moves from `pending` to `available`.
pub(crate) fn restored_image_state(raw: Option<&str>) -> TaskState {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("pending") => TaskState::InProgress,
        Some("available") => TaskState::Completed,
        Some("failed" | "error" | "invalid" | "deregistered" | "disabled") => TaskState::Failed,
        _ => TaskState::Pending,
    }
}

pub(crate) fn store_snapshot(result: &StoreImageTaskResult) -> TaskSnapshot {
    let state = store_task_state(result.store_task_state());
    let mut snapshot = TaskSnapshot::new(state);
    snapshot.progress = result
        .progress_percentage()
        .and_then(|percent| clamp_progress(i64::from(percent)));
    snapshot.status_message = result.store_task_failure_reason().map(str::to_owned);
    snapshot
}

/// Picks the store task started for this export among every task the
/// provider still reports for the image.
///
/// Re-exporting an image writes the same object key again, so older
/// results are told apart by their start time. Results started before
/// `started_at` (less [`TASK_START_SKEW_SECS`]) belong to earlier exports.
pub(crate) fn current_store_result<'a>(
    results: &'a [StoreImageTaskResult],
    location: &ArchiveLocation,
    started_at: DateTime<Utc>,
) -> Option<&'a StoreImageTaskResult> {
    let earliest = started_at - chrono::Duration::seconds(TASK_START_SKEW_SECS);
    results
        .iter()
        .filter(|result| {
            result.bucket() == Some(location.bucket.as_str())
                && result.s3object_key() == Some(location.key.as_str())
        })
        .filter_map(|result| {
            let started = result.task_start_time().and_then(smithy_instant)?;
            (started >= earliest).then_some((started, result))
        })
        .max_by_key(|(started, _)| *started)
        .map(|(_, result)| result)
}

pub(crate) fn restore_snapshot(image: &Image) -> TaskSnapshot {
    let state = restored_image_state(image.state().map(aws_sdk_ec2::types::ImageState::as_str));
    let mut snapshot = TaskSnapshot::new(state);
    snapshot.status_message = image
        .state_reason()
        .and_then(aws_sdk_ec2::types::StateReason::message)
        .map(str::to_owned);
    snapshot.resource_id = image.image_id().map(str::to_owned);
    snapshot
}

/// Replaces characters S3 rejects in object tags and truncates to `limit`
/// characters. Returns `None` when the text is already acceptable.
fn clean_tag_text(raw: &str, limit: usize) -> Option<String> {
    let acceptable = |c: char| {
        c.is_alphanumeric()
            || c == ' '
            || matches!(c, '+' | '-' | '=' | '.' | '_' | ':' | '/' | '@')
    };
    if raw.chars().count() <= limit && raw.chars().all(acceptable) {
        return None;
    }
    Some(
        raw.chars()
            .map(|c| if acceptable(c) { c } else { '_' })
            .take(limit)
            .collect(),
    )
}

/// Makes tag pairs acceptable as S3 object tags. The second value counts
/// the pairs that had to be rewritten.
pub(crate) fn object_tags(pairs: Vec<(String, String)>) -> (Vec<(String, String)>, usize) {
    let mut rewritten = 0_usize;
    let cleaned = pairs
        .into_iter()
        .map(|(key, value)| {
            let clean_key = clean_tag_text(&key, MAX_TAG_KEY_CHARS);
            let clean_value = clean_tag_text(&value, MAX_TAG_VALUE_CHARS);
            if clean_key.is_some() || clean_value.is_some() {
                rewritten = rewritten.saturating_add(1);
            }
            (clean_key.unwrap_or(key), clean_value.unwrap_or(value))
        })
        .collect();
    (cleaned, rewritten)
}

pub(crate) fn image_from_sdk(image: &Image) -> Option<ImageRecord> {
    let mut record = ImageRecord::new(image.image_id()?);
    if let Some(raw) = image.creation_date() {
        record = record.with_creation_date(raw);
    }
    record.name = image.name().map(str::to_owned);
    record.description = image.description().map(str::to_owned);
    record.architecture = image.architecture().map(|value| value.as_str().to_owned());
    record.platform = image
        .platform()
        .map(|value| value.as_str().to_owned())
        .or_else(|| image.platform_details().map(str::to_owned));
    record.virtualization_type = image
        .virtualization_type()
        .map(|value| value.as_str().to_owned());
    record.root_device_type = image
        .root_device_type()
        .map(|value| value.as_str().to_owned());
    record.root_device_name = image.root_device_name().map(str::to_owned);
    record.block_device_mappings = image
        .block_device_mappings()
        .iter()
        .map(|mapping| {
            let ebs = mapping.ebs();
            BlockDeviceMapping {
                device_name: mapping.device_name().map(str::to_owned),
                snapshot_id: ebs.and_then(|e| e.snapshot_id()).map(str::to_owned),
                volume_size: ebs.and_then(aws_sdk_ec2::types::EbsBlockDevice::volume_size),
                volume_type: ebs
                    .and_then(|e| e.volume_type())
                    .map(|value| value.as_str().to_owned()),
                delete_on_termination: ebs
                    .and_then(aws_sdk_ec2::types::EbsBlockDevice::delete_on_termination),
            }
        })
        .collect();
    record.tags = image
        .tags()
        .iter()
        .filter_map(|tag| Some(ImageTag::new(tag.key()?, tag.value().unwrap_or_default())))
        .collect();
    record.state = image
        .state()
        .map_or(ImageState::Other(String::new()), |state| {
            ImageState::parse(state.as_str())
        });
    Some(record)
}

pub(crate) fn smithy_instant(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos())
}

/// Renders tags as the URL query string accepted by `x-amz-tagging`.
pub(crate) fn tagging_query(tags: &[(String, String)]) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let rendered = tags
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    Some(rendered)
}
