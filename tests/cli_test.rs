//! Integration tests for the CLI surface
//!
//! Spawns the built binary and checks the exit-code contract the calling
//! image pipeline depends on: 2 for configuration failures, 3 for
//! environment acquisition failures.

use std::process::{Command, Output};

use predicates::prelude::*;

fn run_chimg(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chimg"))
        .args(args)
        .output()
        .expect("Failed to execute chimg")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn no_subcommand_prints_help() {
    let output = run_chimg(&[]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(predicate::str::contains("chrootfs").eval(&stdout));
}

#[test]
fn missing_config_file_exits_2() {
    let chroot = assert_fs::TempDir::new().unwrap();
    let output = run_chimg(&[
        "chrootfs",
        "/nonexistent/config.yaml",
        &chroot.path().to_string_lossy(),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(predicate::str::contains("Failed to read config").eval(&stderr_of(&output)));
}

#[test]
fn malformed_config_exits_2() {
    let dir = assert_fs::TempDir::new().unwrap();
    let config = dir.path().join("bad.yaml");
    std::fs::write(&config, "actions: [ {not yaml").unwrap();
    let chroot = assert_fs::TempDir::new().unwrap();

    let output = run_chimg(&[
        "chrootfs",
        &config.to_string_lossy(),
        &chroot.path().to_string_lossy(),
    ]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn unknown_action_kind_exits_2() {
    let dir = assert_fs::TempDir::new().unwrap();
    let config = dir.path().join("unknown.yaml");
    std::fs::write(
        &config,
        "actions:\n  - format_disk:\n      device: /dev/sda\n",
    )
    .unwrap();
    let chroot = assert_fs::TempDir::new().unwrap();

    let output = run_chimg(&[
        "chrootfs",
        &config.to_string_lossy(),
        &chroot.path().to_string_lossy(),
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(predicate::str::contains("unknown variant").eval(&stderr_of(&output)));
}

#[test]
fn missing_chroot_directory_exits_3() {
    let dir = assert_fs::TempDir::new().unwrap();
    let config = dir.path().join("ok.yaml");
    std::fs::write(
        &config,
        "actions:\n  - create_file:\n      destination: /etc/hostname\n      content: example\n",
    )
    .unwrap();

    let output = run_chimg(&[
        "chrootfs",
        &config.to_string_lossy(),
        "/nonexistent_chroot_12345",
    ]);
    assert_eq!(output.status.code(), Some(3));
    assert!(predicate::str::contains("does not exist").eval(&stderr_of(&output)));
}

#[test]
fn invalid_chroot_tree_exits_3() {
    // An existing but empty directory is not a valid rootfs: mount
    // acquisition fails fast on the first missing target.
    let dir = assert_fs::TempDir::new().unwrap();
    let config = dir.path().join("ok.yaml");
    std::fs::write(
        &config,
        "actions:\n  - create_file:\n      destination: /etc/hostname\n      content: example\n",
    )
    .unwrap();
    let chroot = assert_fs::TempDir::new().unwrap();

    let output = run_chimg(&[
        "chrootfs",
        &config.to_string_lossy(),
        &chroot.path().to_string_lossy(),
    ]);
    assert_eq!(output.status.code(), Some(3));
}
