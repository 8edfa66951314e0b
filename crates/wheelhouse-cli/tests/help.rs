mod common;

use common::wheelhouse;

#[test]
fn top_level_help_lists_every_command() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = wheelhouse(temp.path()).arg("--help").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    for command in [
        "dedupe",
        "disambiguate",
        "inspect",
        "normalize",
        "pin",
        "filter",
        "download",
        "index",
        "upload",
    ] {
        assert!(out.contains(command), "help is missing {command}: {out}");
    }
}

#[test]
fn subcommand_help_shows_usage_and_examples() {
    let temp = tempfile::tempdir().expect("tempdir");
    let assert = wheelhouse(temp.path())
        .args(["dedupe", "--help"])
        .assert()
        .success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.contains("BASE_DIR"), "usage missing: {out}");
    assert!(out.contains("--missing-base"), "flags missing: {out}");
    assert!(out.contains("wheelhouse dedupe"), "examples missing: {out}");
}

#[test]
fn bad_arguments_exit_with_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    wheelhouse(temp.path())
        .args(["download", "--requirements", "r.txt", "--output-dir", "out", "--max-versions", "0"])
        .assert()
        .code(1);
    wheelhouse(temp.path())
        .args(["dedupe", "--packages", "torch", "--extended", "base", "all"])
        .assert()
        .code(1);
}
