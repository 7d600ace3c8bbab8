//! Tests for the archive workflows.

use chrono::Duration as Days;
use rstest::{fixture, rstest};

use super::*;
use crate::test_support::{
    ManualClock, ScriptedBackend, ScriptedBackendError, completed, failed, reference_now, running,
};

fn settings() -> OrchestratorSettings {
    OrchestratorSettings {
        eligibility: EligibilityPolicy::new(["RHEL-9", "RHEL-8"], 180),
        target: ArchiveTarget {
            bucket: String::from("vault"),
            prefix: String::new(),
        },
        metadata_prefix: String::from("ami-metadata"),
        retention: RetentionPolicy::new(180),
        write_metadata: true,
    }
}

fn image(id: &str, name: &str, age_days: i64) -> ImageRecord {
    ImageRecord::new(id)
        .with_name(name)
        .with_created_at(reference_now() - Days::days(age_days))
        .with_tag("Owner", "platform")
}

#[fixture]
fn catalog() -> ScriptedBackend {
    let backend = ScriptedBackend::new();
    backend.add_image(image("ami-a", "rhel-9-base", 10));
    backend.add_image(image("ami-b", "RHEL-8-web", 40));
    backend.add_image(image("ami-c", "ubuntu-22.04", 5));
    backend.add_image(image("ami-d", "RHEL-9-ancient", 400));
    backend
}

fn orchestrator(
    backend: &ScriptedBackend,
) -> ArchiveOrchestrator<ScriptedBackend, ManualClock> {
    ArchiveOrchestrator::new(backend.clone(), ManualClock::default(), settings())
}

#[rstest]
#[tokio::test]
async fn find_eligible_applies_name_and_age(catalog: ScriptedBackend) {
    let eligible = orchestrator(&catalog)
        .find_eligible()
        .await
        .expect("catalog query should succeed");
    let ids: Vec<&str> = eligible.iter().map(|image| image.id.as_str()).collect();
    assert_eq!(ids, ["ami-a", "ami-b"]);
    assert!(catalog.exports().is_empty());
}

#[rstest]
#[tokio::test]
async fn backup_all_archives_each_eligible_image(catalog: ScriptedBackend) {
    catalog.script_task("ami-a", [running(), completed()]);
    let results = orchestrator(&catalog)
        .backup_all()
        .await
        .expect("batch should succeed");

    assert_eq!(catalog.exports(), ["ami-a", "ami-b"]);
    assert_eq!(results.len(), 2);
    let first = &results[0];
    assert_eq!(first.location.key, "ami-a.bin");
    assert_eq!(first.name.as_deref(), Some("rhel-9-base"));
    assert_eq!(first.backed_up_at, reference_now() + Days::seconds(30));
    let key = first.metadata_key.as_deref().expect("metadata written");
    assert!(key.starts_with("ami-metadata/ami-a/"), "unexpected key {key}");
}

#[rstest]
#[tokio::test]
async fn backup_all_skips_failed_images(catalog: ScriptedBackend) {
    catalog.fail_export("ami-a");
    let results = orchestrator(&catalog)
        .backup_all()
        .await
        .expect("batch should succeed despite one failure");

    assert_eq!(catalog.exports(), ["ami-a", "ami-b"]);
    let ids: Vec<&str> = results.iter().map(|r| r.image_id.as_str()).collect();
    assert_eq!(ids, ["ami-b"]);
}

#[rstest]
#[tokio::test]
async fn backup_all_stops_on_cancellation(catalog: ScriptedBackend) {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = orchestrator(&catalog)
        .with_cancellation(cancel)
        .backup_all()
        .await
        .expect_err("cancellation should abort the batch");

    assert!(err.is_cancelled(), "unexpected error: {err}");
    assert_eq!(catalog.exports(), ["ami-a"]);
}

#[rstest]
#[tokio::test]
async fn backup_one_reports_missing_image(catalog: ScriptedBackend) {
    let err = orchestrator(&catalog)
        .backup_one("ami-missing")
        .await
        .expect_err("missing image should fail");

    assert!(
        matches!(err, ArchiveError::NotFound { resource: "image", ref id } if id == "ami-missing"),
        "unexpected error: {err}"
    );
    assert!(catalog.exports().is_empty());
}

#[rstest]
#[tokio::test]
async fn failed_export_writes_no_metadata(catalog: ScriptedBackend) {
    catalog.script_task("ami-c", [running(), failed("S3 bucket not writable")]);
    let err = orchestrator(&catalog)
        .backup_one("ami-c")
        .await
        .expect_err("export should fail");

    assert!(
        matches!(err, ArchiveError::TaskFailed { ref message, .. } if message == "S3 bucket not writable"),
        "unexpected error: {err}"
    );
    assert!(
        catalog
            .object_keys()
            .iter()
            .all(|key| !key.starts_with("ami-metadata/")),
        "no metadata document expected"
    );
}

#[rstest]
#[tokio::test]
async fn backup_without_metadata_when_disabled(catalog: ScriptedBackend) {
    let mut no_metadata = settings();
    no_metadata.write_metadata = false;
    let result = ArchiveOrchestrator::new(catalog.clone(), ManualClock::default(), no_metadata)
        .backup_one("ami-a")
        .await
        .expect("backup should succeed");

    assert!(result.metadata_key.is_none());
    assert_eq!(catalog.object_keys(), ["ami-a.bin"]);
}

#[rstest]
#[tokio::test]
async fn restore_imports_archive_and_reapplies_tags(catalog: ScriptedBackend) {
    let orchestrator = orchestrator(&catalog);
    orchestrator
        .backup_one("ami-a")
        .await
        .expect("backup should succeed");

    let restored = orchestrator
        .restore_one("ami-a")
        .await
        .expect("restore should succeed");

    assert_eq!(restored.restored_image_id, "ami-restored-ami-a");
    assert_eq!(catalog.restore_names(), ["rhel-9-base-restored"]);
    assert_eq!(restored.tags_applied, 1);
    let imports = catalog.imports();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].key, "ami-a.bin");
    assert_eq!(imports[0].bucket, "vault");
    let tagged = catalog.tagged();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].0, "ami-restored-ami-a");
    assert_eq!(tagged[0].1[0].key, "Owner");
}

#[rstest]
#[tokio::test]
async fn restore_without_metadata_never_imports(catalog: ScriptedBackend) {
    let err = orchestrator(&catalog)
        .restore_one("ami-a")
        .await
        .expect_err("restore should fail");

    assert!(
        matches!(err, ArchiveError::NotFound { resource: "metadata", .. }),
        "unexpected error: {err}"
    );
    assert!(catalog.imports().is_empty());
}

#[rstest]
#[tokio::test]
async fn restore_surfaces_tagging_failure(catalog: ScriptedBackend) {
    let orchestrator = orchestrator(&catalog);
    orchestrator
        .backup_one("ami-b")
        .await
        .expect("backup should succeed");
    catalog.fail_tagging();

    let err = orchestrator
        .restore_one("ami-b")
        .await
        .expect_err("tagging failure should surface");
    assert!(matches!(err, ArchiveError::Provider(_)), "unexpected error: {err}");
}

#[rstest]
#[tokio::test]
async fn cleanup_uses_configured_retention(catalog: ScriptedBackend) {
    catalog.seed_object("ami-old.bin", reference_now() - Days::days(365), Vec::new());
    catalog.seed_object("ami-new.bin", reference_now() - Days::days(3), Vec::new());

    let summary = orchestrator(&catalog)
        .cleanup()
        .await
        .expect("sweep should succeed");

    assert_eq!(summary.deleted, ["ami-old.bin"]);
    assert_eq!(catalog.object_keys(), ["ami-new.bin"]);
}

#[rstest]
#[tokio::test]
async fn cleanup_expires_archives_with_their_metadata_only(catalog: ScriptedBackend) {
    catalog.set_write_time(reference_now() - Days::days(200));
    let orchestrator = orchestrator(&catalog);
    let old = orchestrator
        .backup_one("ami-a")
        .await
        .expect("backup should succeed");
    catalog.seed_object(
        "reports/finance-2025.csv",
        reference_now() - Days::days(365),
        Vec::new(),
    );
    catalog.seed_object("README.txt", reference_now() - Days::days(365), Vec::new());

    let summary = orchestrator.cleanup().await.expect("sweep should succeed");

    let old_document = old.metadata_key.expect("metadata written");
    assert_eq!(summary.deleted, [String::from("ami-a.bin"), old_document]);
    assert_eq!(
        catalog.object_keys(),
        ["README.txt", "reports/finance-2025.csv"]
    );
}

#[rstest]
#[tokio::test]
async fn backup_one_fails_when_metadata_cannot_be_written(catalog: ScriptedBackend) {
    catalog.fail_puts();
    let err = orchestrator(&catalog)
        .backup_one("ami-a")
        .await
        .expect_err("metadata write failure should surface");

    assert!(
        matches!(err, ArchiveError::Provider(ScriptedBackendError::Put(ref key)) if key.starts_with("ami-metadata/ami-a/")),
        "unexpected error: {err}"
    );
    assert_eq!(catalog.exports(), ["ami-a"]);
    assert_eq!(catalog.object_keys(), ["ami-a.bin"]);
}

#[rstest]
#[tokio::test]
async fn backup_all_excludes_images_without_metadata(catalog: ScriptedBackend) {
    catalog.fail_puts();
    let results = orchestrator(&catalog)
        .backup_all()
        .await
        .expect("batch should finish despite metadata failures");

    assert!(results.is_empty(), "unexpected results: {results:?}");
    assert_eq!(catalog.exports(), ["ami-a", "ami-b"]);
}
