//! BDD step definitions for the archive workflows.

use ami_vault::ImageRecord;
use ami_vault::test_support::{reference_now, running};
use chrono::Duration as Days;
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{ArchiveContext, ArchiveOutcome, FailureKind, split_ids};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("an image \"{id}\" named \"{name}\" created \"{days}\" days ago")]
fn image_exists(
    archive_context: ArchiveContext,
    id: String,
    name: String,
    days: i64,
) -> ArchiveContext {
    archive_context.backend.add_image(
        ImageRecord::new(id.trim())
            .with_name(name.trim())
            .with_created_at(reference_now() - Days::days(days))
            .with_tag("Owner", "platform"),
    );
    archive_context
}

#[given("the export of \"{id}\" is rejected")]
fn export_rejected(archive_context: ArchiveContext, id: String) -> ArchiveContext {
    archive_context.backend.fail_export(id.trim());
    archive_context
}

#[given("the export of \"{id}\" never finishes")]
fn export_never_finishes(archive_context: ArchiveContext, id: String) -> ArchiveContext {
    archive_context.backend.script_task(id.trim(), [running()]);
    archive_context
}

#[given("an object \"{key}\" written \"{days}\" days ago")]
fn archive_object(archive_context: ArchiveContext, key: String, days: i64) -> ArchiveContext {
    archive_context
        .backend
        .seed_object(key.trim(), reference_now() - Days::days(days), b"disk".to_vec());
    archive_context
}

#[when("I back up all eligible images")]
fn back_up_all(mut archive_context: ArchiveContext) -> Result<ArchiveContext, StepError> {
    let runtime = Runtime::new()?;
    let result = runtime.block_on(archive_context.orchestrator().backup_all());
    archive_context.record(result, ArchiveOutcome::Backups);
    Ok(archive_context)
}

#[when("I back up image \"{id}\"")]
fn back_up_one(
    mut archive_context: ArchiveContext,
    id: String,
) -> Result<ArchiveContext, StepError> {
    let runtime = Runtime::new()?;
    let result = runtime.block_on(archive_context.orchestrator().backup_one(id.trim()));
    archive_context.record(result, |backup| ArchiveOutcome::Backups(vec![backup]));
    Ok(archive_context)
}

#[when("I restore image \"{id}\"")]
fn restore(
    mut archive_context: ArchiveContext,
    id: String,
) -> Result<ArchiveContext, StepError> {
    let runtime = Runtime::new()?;
    let result = runtime.block_on(archive_context.orchestrator().restore_one(id.trim()));
    archive_context.record(result, ArchiveOutcome::Restored);
    Ok(archive_context)
}

#[when("I run the retention sweep")]
fn sweep(mut archive_context: ArchiveContext) -> Result<ArchiveContext, StepError> {
    let runtime = Runtime::new()?;
    let result = runtime.block_on(archive_context.orchestrator().cleanup());
    archive_context.record(result, ArchiveOutcome::Swept);
    Ok(archive_context)
}

#[then("the archived images are \"{ids}\"")]
fn archived_images(archive_context: &ArchiveContext, ids: String) -> Result<(), StepError> {
    let Some(ArchiveOutcome::Backups(results)) = archive_context.outcome.as_ref() else {
        return Err(StepError::Assertion(format!(
            "expected backups, got: {:?}",
            archive_context.outcome
        )));
    };
    let archived: Vec<String> = results.iter().map(|r| r.image_id.clone()).collect();
    let expected = split_ids(&ids);
    if archived == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, archived {archived:?}"
        )))
    }
}

#[then("a metadata document exists for \"{id}\"")]
fn metadata_exists(archive_context: &ArchiveContext, id: String) -> Result<(), StepError> {
    if has_metadata(archive_context, id.trim()) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "no metadata for {id} among {:?}",
            archive_context.backend.object_keys()
        )))
    }
}

#[then("no metadata document exists for \"{id}\"")]
fn metadata_absent(archive_context: &ArchiveContext, id: String) -> Result<(), StepError> {
    if has_metadata(archive_context, id.trim()) {
        Err(StepError::Assertion(format!(
            "unexpected metadata for {id}: {:?}",
            archive_context.backend.object_keys()
        )))
    } else {
        Ok(())
    }
}

fn has_metadata(archive_context: &ArchiveContext, id: &str) -> bool {
    let prefix = format!("ami-metadata/{id}/");
    archive_context
        .backend
        .object_keys()
        .iter()
        .any(|key| key.starts_with(&prefix))
}

#[then("the operation fails with a \"{kind}\" error")]
fn fails_with(archive_context: &ArchiveContext, kind: String) -> Result<(), StepError> {
    let expected = FailureKind::parse(&kind)
        .ok_or_else(|| StepError::Assertion(format!("unknown failure kind: {kind}")))?;
    match archive_context.outcome.as_ref() {
        Some(ArchiveOutcome::Failure { kind: actual, .. }) if *actual == expected => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected {expected:?} failure, got: {other:?}"
        ))),
    }
}

#[then("the provider was polled \"{count}\" times")]
fn polled(archive_context: &ArchiveContext, count: u32) -> Result<(), StepError> {
    let polls = archive_context.backend.polls();
    if polls == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} polls, got {polls}"
        )))
    }
}

#[then("the restored image is \"{id}\"")]
fn restored_image(archive_context: &ArchiveContext, id: String) -> Result<(), StepError> {
    match archive_context.outcome.as_ref() {
        Some(ArchiveOutcome::Restored(restored)) if restored.restored_image_id == id.trim() => {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected restored image {id}, got: {other:?}"
        ))),
    }
}

#[then("the restored image carries the tag \"{key}\"")]
fn restored_tag(archive_context: &ArchiveContext, key: String) -> Result<(), StepError> {
    let tagged = archive_context.backend.tagged();
    let applied = tagged
        .iter()
        .any(|(_, tags)| tags.iter().any(|tag| tag.key == key.trim()));
    if applied {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "tag {key} was not applied: {tagged:?}"
        )))
    }
}

#[then("no import was started")]
fn no_import(archive_context: &ArchiveContext) -> Result<(), StepError> {
    let imports = archive_context.backend.imports();
    if imports.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected imports: {imports:?}"
        )))
    }
}

#[then("the remaining objects are \"{keys}\"")]
fn remaining_objects(archive_context: &ArchiveContext, keys: String) -> Result<(), StepError> {
    if !matches!(archive_context.outcome, Some(ArchiveOutcome::Swept(_))) {
        return Err(StepError::Assertion(format!(
            "expected a sweep summary, got: {:?}",
            archive_context.outcome
        )));
    }
    let remaining = archive_context.backend.object_keys();
    let expected = split_ids(&keys);
    if remaining == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, found {remaining:?}"
        )))
    }
}
