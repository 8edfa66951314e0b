#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use assert_cmd::assert::Assert;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use zip::write::FileOptions;

pub const TAGS: &str = "cp312-cp312-linux_x86_64.whl";

const SCRUBBED_ENV: [&str; 9] = [
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "WHEELHOUSE_AWS_CLI",
    "WHEELHOUSE_PYTHON",
    "WHEELHOUSE_TRACKED",
    "WHEELHOUSE_MISSING_BASE",
    "WHEELHOUSE_METADATA_COMMAND",
    "WHEELHOUSE_COMMAND_TIMEOUT",
    "NO_COLOR",
];

/// A `wheelhouse` invocation isolated from the caller's environment, run
/// from `cwd` so no stray `wheelhouse.toml` is picked up.
pub fn wheelhouse(cwd: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("wheelhouse");
    cmd.current_dir(cwd).env("WHEELHOUSE_PROGRESS", "0");
    for key in SCRUBBED_ENV {
        cmd.env_remove(key);
    }
    cmd
}

pub fn wheel_name(package: &str, version: &str) -> String {
    format!("{package}-{version}-{TAGS}")
}

pub fn touch(dir: &Path, name: &str) -> PathBuf {
    fs::create_dir_all(dir).expect("create dir");
    let path = dir.join(name);
    fs::write(&path, name.as_bytes()).expect("write wheel");
    path
}

/// Writes a wheel whose `*.dist-info/METADATA` holds `metadata`.
pub fn write_wheel(dir: &Path, name: &str, metadata: &str) -> PathBuf {
    fs::create_dir_all(dir).expect("create dir");
    let path = dir.join(name);
    let mut parts = name.split('-');
    let package = parts.next().expect("package");
    let version = parts.next().expect("version");
    let file = fs::File::create(&path).expect("create wheel");
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file(
        format!("{package}-{version}.dist-info/METADATA"),
        FileOptions::default(),
    )
    .expect("start METADATA");
    zip.write_all(metadata.as_bytes()).expect("write METADATA");
    zip.finish().expect("finish wheel");
    path
}

pub fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

pub fn stderr(assert: &Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stderr).into_owned()
}
