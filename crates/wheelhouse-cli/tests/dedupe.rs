use std::path::Path;

mod common;

use common::{names, parse_json, stderr, touch, wheel_name, wheelhouse};

fn seed(root: &Path) {
    let base = root.join("base");
    let all = root.join("all");
    for (package, version) in [
        ("torch", "2.9.0a0+git1c57644"),
        ("triton", "3.4.0"),
        ("torchvision", "0.24.0a0+git98f8b37"),
        ("amdsmi", "6.4.0"),
    ] {
        touch(&base, &wheel_name(package, version));
        touch(&all, &wheel_name(package, version));
    }
    touch(&all, &wheel_name("torch", "2.8.0"));
    touch(&all, &wheel_name("triton", "3.3.1"));
    touch(&all, &wheel_name("torchvision", "0.23.0"));
    touch(&all, &wheel_name("numpy", "2.1.0"));
}

#[test]
fn dedupe_keeps_only_custom_builds_and_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed(temp.path());

    let assert = wheelhouse(temp.path())
        .args(["--json", "dedupe", "base", "all"])
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["details"]["deleted_count"], 3);
    assert_eq!(payload["details"]["remaining_count"], 5);

    let expected = vec![
        wheel_name("amdsmi", "6.4.0"),
        wheel_name("numpy", "2.1.0"),
        wheel_name("torch", "2.9.0a0+git1c57644"),
        wheel_name("torchvision", "0.24.0a0+git98f8b37"),
        wheel_name("triton", "3.4.0"),
    ];
    assert_eq!(names(&temp.path().join("all")), expected);

    let again = wheelhouse(temp.path())
        .args(["--json", "dedupe", "base", "all"])
        .assert()
        .success();
    let payload = parse_json(&again);
    assert_eq!(payload["details"]["deleted_count"], 0);
    assert_eq!(payload["details"]["remaining_count"], 5);
    assert_eq!(names(&temp.path().join("all")), expected);
}

#[test]
fn strict_policy_fails_without_deleting_when_a_base_wheel_is_missing() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed(temp.path());
    std::fs::remove_file(temp.path().join("base").join(wheel_name("amdsmi", "6.4.0")))
        .expect("remove base amdsmi");
    let before = names(&temp.path().join("all"));

    let assert = wheelhouse(temp.path())
        .args(["dedupe", "base", "all"])
        .assert()
        .code(1);
    let err = stderr(&assert);
    assert!(err.contains("WH101"), "missing error code: {err}");
    assert!(err.contains("amdsmi"), "missing package name: {err}");
    assert!(err.contains("Fix:"), "missing fix section: {err}");
    assert_eq!(names(&temp.path().join("all")), before);
}

#[test]
fn lenient_policy_leaves_packages_without_base_untouched() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed(temp.path());
    let custom = wheel_name("torchvision", "0.24.0a0+git98f8b37");
    std::fs::remove_file(temp.path().join("base").join(&custom)).expect("remove base torchvision");

    let assert = wheelhouse(temp.path())
        .args(["--json", "dedupe", "base", "all", "--missing-base", "lenient"])
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["missing_base"], "lenient");

    let remaining = names(&temp.path().join("all"));
    assert!(remaining.contains(&wheel_name("torchvision", "0.23.0")));
    assert!(remaining.contains(&custom));
    assert!(!remaining.contains(&wheel_name("torch", "2.8.0")));
}

#[test]
fn missing_base_policy_comes_from_the_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed(temp.path());
    std::fs::remove_file(temp.path().join("base").join(wheel_name("amdsmi", "6.4.0")))
        .expect("remove base amdsmi");

    wheelhouse(temp.path())
        .env("WHEELHOUSE_MISSING_BASE", "lenient")
        .args(["dedupe", "base", "all"])
        .assert()
        .success();
}

#[test]
fn dry_run_reports_without_deleting() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed(temp.path());
    let before = names(&temp.path().join("all"));

    let assert = wheelhouse(temp.path())
        .args(["dedupe", "base", "all", "--dry-run", "--no-color"])
        .assert()
        .success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.contains("[dry-run] would remove 3 wheel(s)"), "unexpected output: {out}");
    assert_eq!(names(&temp.path().join("all")), before);
}

#[test]
fn missing_directory_is_a_user_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = wheelhouse(temp.path())
        .args(["--json", "dedupe", "nope", "also-nope"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["reason"], "missing_directory");
}

#[test]
fn config_file_selects_tracked_packages() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed(temp.path());
    std::fs::write(
        temp.path().join("wheelhouse.toml"),
        "[dedupe]\ntracked = [\"torch\"]\n",
    )
    .expect("write config");

    let assert = wheelhouse(temp.path())
        .args(["--json", "dedupe", "base", "all"])
        .assert()
        .success();
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["deleted_count"], 1);
    assert!(names(&temp.path().join("all")).contains(&wheel_name("triton", "3.3.1")));
}
