//! Unit tests for the `ami-vault` CLI binary implementation.

use super::*;
use ami_vault::{ArchiveLocation, ImageRecord};
use chrono::{TimeZone, Utc};
use rstest::rstest;
use tempfile::TempDir;

fn render(write: impl FnOnce(&mut Vec<u8>)) -> String {
    let mut buf = Vec::new();
    write(&mut buf);
    String::from_utf8(buf).expect("utf8")
}

#[test]
fn write_error_includes_missing_field_guidance() {
    let err = CliError::Config(ConfigError::MissingField(String::from(
        "missing archive bucket: set AMI_VAULT_BUCKET or add bucket to ami-vault.toml",
    )));
    let rendered = render(|buf| write_error(buf, &err));
    assert!(
        rendered.starts_with("configuration error: missing configuration field"),
        "rendered: {rendered}"
    );
    assert!(rendered.contains("AMI_VAULT_BUCKET"), "rendered: {rendered}");
}

#[test]
fn archive_errors_render_verbatim() {
    let err = CliError::Archive(ArchiveError::TaskTimeout {
        task_id: String::from("ami-1.bin"),
        timeout_secs: 5400,
    });
    let rendered = render(|buf| write_error(buf, &err));
    assert_eq!(rendered, "task ami-1.bin timed out after 5400 seconds\n");
}

#[test]
fn images_are_listed_one_per_line() {
    let images = [
        ImageRecord::new("ami-1")
            .with_name("RHEL-9-base")
            .with_creation_date("2026-09-01T10:00:00.000Z"),
        ImageRecord::new("ami-2"),
    ];
    let rendered = render(|buf| write_images(buf, &images));
    assert_eq!(
        rendered,
        "ami-1\tRHEL-9-base\t2026-09-01T10:00:00.000Z\nami-2\t-\t-\n"
    );
}

#[test]
fn backups_show_archive_location() {
    let results = [BackupResult {
        image_id: String::from("ami-1"),
        task_id: String::from("ami-1.bin"),
        name: None,
        created_at: None,
        backed_up_at: Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
        location: ArchiveLocation {
            bucket: String::from("vault"),
            key: String::from("ami-1.bin"),
        },
        metadata_key: None,
    }];
    let rendered = render(|buf| write_backups(buf, &results));
    assert_eq!(rendered, "ami-1\tami-1.bin\ts3://vault/ami-1.bin\n");
}

#[test]
fn sweep_summary_is_counted() {
    let summary = SweepSummary {
        scanned: 3,
        deleted: vec![String::from("a"), String::from("b")],
        failed: vec![String::from("c")],
    };
    let rendered = render(|buf| write_sweep(buf, &summary));
    assert_eq!(rendered, "scanned 3, deleted 2, failed 1\n");
}

#[rstest]
#[case(Some("eu-west-2"), "eu-west-2")]
#[case(None, "eu-central-1")]
fn explicit_config_file_honours_region_override(
    #[case] region: Option<&str>,
    #[case] expected: &str,
) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("vault.toml");
    std::fs::write(&path, "bucket = \"vault\"\nregion = \"eu-central-1\"\n").expect("write");

    let global = GlobalArgs {
        config: Some(path.to_string_lossy().into_owned()),
        region: region.map(str::to_owned),
        log_dir: None,
    };
    let config = load_config(&global).expect("config should load");
    assert_eq!(config.region, expected);
    assert_eq!(config.bucket, "vault");
}

#[test]
fn unreadable_config_file_is_an_io_error() {
    let dir = TempDir::new().expect("tempdir");
    let global = GlobalArgs {
        config: Some(dir.path().join("absent.toml").to_string_lossy().into_owned()),
        region: None,
        log_dir: None,
    };
    let err = load_config(&global).expect_err("missing file should fail");
    assert!(matches!(err, ConfigError::Io { .. }), "unexpected error: {err}");
}
