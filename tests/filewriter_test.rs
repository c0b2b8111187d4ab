//! Integration tests for file creation semantics
//!
//! Destination confinement is the security-sensitive property here, so it
//! gets a property-based pass on top of the explicit cases.

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use chimg::core::actions::files::resolve_destination;
use chimg::core::config::Config;
use chimg::core::context::ExecutionContext;
use chimg::core::dispatcher::ActionDispatcher;
use chimg::error::FileError;
use chimg::infra::chroot::ChrootExecutor;
use common::TestChroot;
use proptest::prelude::*;

fn apply_yaml(chroot: &TestChroot, yaml: &str) -> chimg::core::dispatcher::RunReport {
    let config = Config::from_yaml(yaml).unwrap();
    let ctx = ExecutionContext::new(chroot.path(), Vec::new());
    let executor = ChrootExecutor::new();
    ActionDispatcher::new(&executor).run(&ctx, &config.actions)
}

#[test]
fn external_source_is_copied_in() {
    let chroot = TestChroot::new();
    let fixture = assert_fs::TempDir::new().unwrap();
    let source = fixture.path().join("motd");
    std::fs::write(&source, "welcome to the image\n").unwrap();

    let report = apply_yaml(
        &chroot,
        &format!(
            r"
actions:
  - create_file:
      destination: /etc/motd
      source: {}
",
            source.display()
        ),
    );

    assert!(report.succeeded());
    assert_eq!(chroot.read_file("etc/motd"), "welcome to the image\n");
}

#[test]
fn mode_is_applied_to_the_final_file() {
    let chroot = TestChroot::new();
    let report = apply_yaml(
        &chroot,
        r#"
actions:
  - create_file:
      destination: /etc/cron.d/nightly
      content: "0 3 * * * root /usr/local/bin/nightly"
      mode: "0640"
"#,
    );

    assert!(report.succeeded());
    let mode = std::fs::metadata(chroot.path().join("etc/cron.d/nightly"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o640);
}

#[test]
fn parent_directories_are_created_as_needed() {
    let chroot = TestChroot::new();
    let report = apply_yaml(
        &chroot,
        r"
actions:
  - create_file:
      destination: /etc/systemd/system/getty.target.wants/override.conf
      content: x
",
    );
    assert!(report.succeeded());
    assert!(chroot.file_exists("etc/systemd/system/getty.target.wants/override.conf"));
}

#[test]
fn overwrite_replaces_previous_content_exactly() {
    let chroot = TestChroot::new();
    chroot.create_file("etc/hostname", "previous-name-with-longer-content");

    let report = apply_yaml(
        &chroot,
        r"
actions:
  - create_file:
      destination: /etc/hostname
      content: example
",
    );
    assert!(report.succeeded());
    assert_eq!(chroot.read_file("etc/hostname"), "example");
}

proptest! {
    #[test]
    fn any_destination_with_leading_traversal_is_rejected(
        ups in 1usize..6,
        suffix in "[a-z]{1,12}(/[a-z]{1,12}){0,3}",
    ) {
        let destination = format!("{}{}", "../".repeat(ups), suffix);
        let result = resolve_destination(Path::new("/srv/chroot"), &destination);
        prop_assert!(matches!(result, Err(FileError::EscapesChroot { .. })), "expected EscapesChroot, got {:?}", result);
    }

    #[test]
    fn any_traversal_deeper_than_the_path_is_rejected(
        segments in prop::collection::vec("[a-z]{1,8}", 0..4),
    ) {
        let mut destination = format!("/{}", segments.join("/"));
        destination.push_str(&"/..".repeat(segments.len() + 1));
        destination.push_str("/escaped");
        let result = resolve_destination(Path::new("/srv/chroot"), &destination);
        prop_assert!(matches!(result, Err(FileError::EscapesChroot { .. })), "expected EscapesChroot, got {:?}", result);
    }

    #[test]
    fn any_clean_destination_resolves_under_the_root(
        segments in prop::collection::vec("[a-z]{1,10}", 1..5),
    ) {
        let destination = format!("/{}", segments.join("/"));
        let resolved = resolve_destination(Path::new("/srv/chroot"), &destination).unwrap();
        prop_assert!(resolved.starts_with("/srv/chroot"));
    }
}
