use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::diagnostics::reasons;
use crate::outcome::UserError;

/// Streams a file through SHA-256 and returns the lowercase hex digest.
pub(crate) fn compute_sha256(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .with_context(|| format!("reading {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Renders a byte count with binary units, e.g. `1.5 GiB`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Fails with a user error unless `path` is an existing directory.
pub(crate) fn ensure_directory(path: &Path, role: &str) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    Err(UserError::new(
        format!("{role} directory not found: {}", path.display()),
        json!({
            "reason": reasons::MISSING_DIRECTORY,
            "path": path.display().to_string(),
            "role": role,
        }),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_file_contents() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("empty.whl");
        std::fs::write(&path, b"")?;
        assert_eq!(
            compute_sha256(&path)?,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        std::fs::write(&path, b"abc")?;
        assert_eq!(
            compute_sha256(&path)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn missing_directory_is_a_user_error() {
        let err = ensure_directory(Path::new("/definitely/not/here"), "base wheels")
            .expect_err("missing");
        let user = err.downcast_ref::<UserError>().expect("user error");
        assert_eq!(user.details()["reason"], reasons::MISSING_DIRECTORY);
        assert!(user.message().starts_with("base wheels directory not found"));
    }
}
