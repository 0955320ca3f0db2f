//! Per-build salt generation and the persisted salt record

use crate::{GarbleError, Result};
use rand::distr::Alphanumeric;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the salt record written next to the build.
pub const SALT_RECORD: &str = "salt.txt";

const SALT_LENGTH: usize = 50;

/// Generate a fresh random salt.
pub fn generate() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

/// Persist `salt` to `dir/salt.txt` and return the record path.
pub fn write_record(dir: &Path, salt: &str) -> Result<PathBuf> {
    let path = dir.join(SALT_RECORD);
    info!(
        "Writing salt to {}. The salt is needed to ungarble stack traces in log files.",
        path.display()
    );
    fs::write(&path, salt)?;
    Ok(path)
}

/// Read a salt record back.
pub fn read_record(path: &Path) -> Result<String> {
    let salt = fs::read_to_string(path)?.trim().to_string();
    if salt.is_empty() {
        return Err(GarbleError::Configuration(format!(
            "salt record {} is empty",
            path.display()
        )));
    }
    Ok(salt)
}
