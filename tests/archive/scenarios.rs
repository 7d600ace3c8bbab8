//! BDD scenarios for the archive workflows.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ArchiveContext, archive_context};

#[scenario(
    path = "tests/features/archive.feature",
    name = "Archive eligible images and leave the rest alone"
)]
fn scenario_archive_eligible(archive_context: ArchiveContext) {
    let _ = archive_context;
}

#[scenario(
    path = "tests/features/archive.feature",
    name = "A rejected export does not stop the batch"
)]
fn scenario_rejected_export(archive_context: ArchiveContext) {
    let _ = archive_context;
}

#[scenario(
    path = "tests/features/archive.feature",
    name = "An export that never finishes times out"
)]
fn scenario_export_timeout(archive_context: ArchiveContext) {
    let _ = archive_context;
}

#[scenario(
    path = "tests/features/archive.feature",
    name = "Restore an archived image with its tags"
)]
fn scenario_restore(archive_context: ArchiveContext) {
    let _ = archive_context;
}

#[scenario(
    path = "tests/features/archive.feature",
    name = "Restoring an image that was never archived fails"
)]
fn scenario_restore_missing(archive_context: ArchiveContext) {
    let _ = archive_context;
}

#[scenario(
    path = "tests/features/archive.feature",
    name = "Cleanup removes archives past the retention window"
)]
fn scenario_cleanup(archive_context: ArchiveContext) {
    let _ = archive_context;
}
