//! Unit tests for file planning.

use rstest::{fixture, rstest};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use super::*;

#[fixture]
fn source_dir() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("app.conf"), b"listen 80\n").expect("write source");
    dir
}

fn source_path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn inline(destination: &str, content: &str) -> FileSpec {
    FileSpec {
        content: Some(content.to_owned()),
        destination: destination.to_owned(),
        ..FileSpec::default()
    }
}

#[rstest]
fn plans_inline_content_with_its_length() {
    let plan = plan_files(&[inline("/etc/motd", "hello")]).expect("plan should succeed");
    assert_eq!(plan.len(), 1);
    let entry = plan.first().expect("one entry");
    assert_eq!(entry.size, 5);
    assert_eq!(entry.payload, FilePayload::Content(String::from("hello")));
    assert_eq!(entry.destination, "/etc/motd");
}

#[rstest]
#[tokio::test]
async fn plans_source_and_captures_size(source_dir: TempDir) {
    let file = FileSpec {
        source: Some(source_path(&source_dir, "app.conf")),
        destination: String::from("/etc/app.conf"),
        ..FileSpec::default()
    };
    let plan = plan_files(&[file]).expect("plan should succeed");
    let entry = plan.first().expect("one entry");
    assert_eq!(entry.size, 10);

    let (mut reader, size) = entry.open().expect("source should reopen");
    let mut body = String::new();
    reader.read_to_string(&mut body).await.expect("read source");
    assert_eq!(size, 10);
    assert_eq!(body, "listen 80\n");
}

#[rstest]
#[case::both(Some("/tmp/a"), Some("x"))]
#[case::neither(None, None)]
#[case::empty_strings(Some(""), Some(""))]
fn rejects_invalid_payload_choice(#[case] source: Option<&str>, #[case] content: Option<&str>) {
    let file = FileSpec {
        source: source.map(str::to_owned),
        content: content.map(str::to_owned),
        destination: String::from("/etc/x"),
        ..FileSpec::default()
    };
    let errors = plan_files(&[file]).expect_err("plan should fail");
    assert_eq!(errors.errors().len(), 1, "errors: {errors}");
}

#[rstest]
fn accumulates_errors_across_entries(source_dir: TempDir) {
    let files = vec![
        FileSpec {
            destination: String::from("/a"),
            ..FileSpec::default()
        },
        inline("", "orphan"),
        FileSpec {
            source: Some(source_path(&source_dir, "missing.conf")),
            destination: String::from("/c"),
            ..FileSpec::default()
        },
        inline("/ok", "fine"),
    ];
    let errors = plan_files(&files).expect_err("plan should fail");
    let found = errors.errors();
    assert_eq!(found.len(), 3, "errors: {errors}");
    assert!(found.iter().any(|err| matches!(err, PlanError::NeitherSourceNorContent { .. })));
    assert!(found.iter().any(|err| matches!(err, PlanError::MissingDestination)));
    assert!(found.iter().any(|err| matches!(err, PlanError::Unreadable { .. })));
}

#[rstest]
fn rejects_directory_sources(source_dir: TempDir) {
    let file = FileSpec {
        source: Some(source_dir.path().to_string_lossy().into_owned()),
        destination: String::from("/d"),
        ..FileSpec::default()
    };
    let errors = plan_files(&[file]).expect_err("directories are not files");
    assert!(matches!(errors.errors(), [PlanError::Unreadable { .. }]));
}

#[rstest]
fn post_copy_commands_follow_chmod_chown_chgrp_order() {
    let file = PlannedFile {
        payload: FilePayload::Content(String::new()),
        size: 0,
        destination: String::from("/srv/my app.conf"),
        permissions: Some(String::from("0644")),
        owner: Some(String::from("core")),
        group: Some(String::from("docker")),
    };
    assert_eq!(
        file.post_copy_commands(),
        vec![
            String::from("chmod 0644 '/srv/my app.conf'"),
            String::from("chown core '/srv/my app.conf'"),
            String::from("chgrp docker '/srv/my app.conf'"),
        ]
    );
}

#[rstest]
fn post_copy_commands_skip_unset_directives() {
    let plan = plan_files(&[inline("/etc/motd", "hi")]).expect("plan should succeed");
    let entry = plan.first().expect("one entry");
    assert!(entry.post_copy_commands().is_empty());
}

#[rstest]
fn same_payload_ignores_mode_and_ownership() {
    let before = inline("/etc/motd", "hi");
    let after = FileSpec {
        permissions: Some(String::from("0600")),
        ..before.clone()
    };
    assert!(before.same_payload(&after));
    assert!(!before.same_payload(&inline("/etc/motd", "bye")));
}

#[rstest]
fn expand_tilde_leaves_absolute_paths() {
    assert_eq!(expand_tilde("/abs/path"), "/abs/path");
}
