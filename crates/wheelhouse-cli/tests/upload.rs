use std::fs;

mod common;

use common::{parse_json, stderr, touch, wheel_name, wheelhouse};

fn seed(root: &std::path::Path) {
    touch(&root.join("wheels"), &wheel_name("torch", "2.9.0"));
    fs::create_dir_all(root.join("site").join("simple")).expect("index dir");
}

#[test]
fn missing_credentials_stop_before_the_aws_cli_runs() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed(temp.path());

    let assert = wheelhouse(temp.path())
        .env("WHEELHOUSE_AWS_CLI", temp.path().join("no-such-aws"))
        .args(["--json", "upload", "wheels", "site", "my-bucket"])
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["details"]["reason"], "missing_credentials");
    assert_eq!(
        payload["details"]["missing"],
        serde_json::json!(["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"])
    );
}

#[test]
fn missing_aws_cli_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    seed(temp.path());

    let assert = wheelhouse(temp.path())
        .env("AWS_ACCESS_KEY_ID", "AKIATEST")
        .env("AWS_SECRET_ACCESS_KEY", "secret")
        .env("WHEELHOUSE_AWS_CLI", "wheelhouse-test-no-such-aws")
        .args(["upload", "wheels", "site", "my-bucket", "us-west-2"])
        .assert()
        .code(1);
    let err = stderr(&assert);
    assert!(err.contains("WH402"), "missing error code: {err}");
    assert!(err.contains("AWS CLI"), "missing reason: {err}");
}

#[test]
fn missing_index_directory_is_a_user_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    touch(&temp.path().join("wheels"), &wheel_name("torch", "2.9.0"));

    let assert = wheelhouse(temp.path())
        .args(["--json", "upload", "wheels", "site", "my-bucket"])
        .assert()
        .code(1);
    assert_eq!(parse_json(&assert)["details"]["reason"], "missing_directory");
}
