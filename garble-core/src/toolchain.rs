//! Queries answered by the Go toolchain

use crate::{GarbleError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// What the engines need to know from the host toolchain.
pub trait Toolchain {
    /// Short build identity of a compiled artifact.
    fn build_id(&self, artifact: &Path) -> Result<String>;

    /// Location of the export data of an import path.
    fn export_data(&self, import_path: &str) -> Result<PathBuf>;

    /// Import path of the package in `dir`.
    fn import_path(&self, dir: &Path) -> Result<String>;
}

/// The subset of `go list -json` output we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedPackage {
    import_path: String,
    #[serde(default)]
    export: Option<String>,
}

/// [`Toolchain`] backed by the `go` command.
#[derive(Debug, Clone)]
pub struct GoToolchain {
    go: PathBuf,
}

impl Default for GoToolchain {
    fn default() -> Self {
        Self {
            go: PathBuf::from("go"),
        }
    }
}

impl GoToolchain {
    pub fn new(go: impl Into<PathBuf>) -> Self {
        Self { go: go.into() }
    }

    fn run(&self, args: &[&str], dir: Option<&Path>) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.go);
        command.args(args);
        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        debug!("running {} {}", self.go.display(), args.join(" "));

        let output = command.output().map_err(|e| {
            GarbleError::Toolchain(format!("failed to run {}: {}", self.go.display(), e))
        })?;
        if !output.status.success() {
            return Err(GarbleError::Toolchain(format!(
                "{} {} failed: {}",
                self.go.display(),
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    fn list(&self, args: &[&str], dir: Option<&Path>) -> Result<ListedPackage> {
        let stdout = self.run(args, dir)?;
        Ok(serde_json::from_slice(&stdout)?)
    }
}

impl Toolchain for GoToolchain {
    fn build_id(&self, artifact: &Path) -> Result<String> {
        let artifact = artifact.to_string_lossy();
        let stdout = self.run(&["tool", "buildid", &artifact], None)?;
        Ok(trim_build_id(&String::from_utf8_lossy(&stdout)))
    }

    fn export_data(&self, import_path: &str) -> Result<PathBuf> {
        let package = self.list(&["list", "-json", "-export", import_path], None)?;
        package
            .export
            .filter(|e| !e.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| GarbleError::MissingImport(import_path.to_string()))
    }

    fn import_path(&self, dir: &Path) -> Result<String> {
        Ok(self.list(&["list", "-json", "."], Some(dir))?.import_path)
    }
}

/// The action part of a build ID: everything up to the first `/`.
pub fn trim_build_id(raw: &str) -> String {
    let raw = raw.trim();
    raw.split_once('/')
        .map_or(raw, |(action, _)| action)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_build_id() {
        assert_eq!(trim_build_id("abc/def\n"), "abc");
        assert_eq!(trim_build_id("  only-action  "), "only-action");
        assert_eq!(trim_build_id(""), "");
    }

    #[test]
    fn test_listed_package_decoding() {
        let listed: ListedPackage = serde_json::from_str(
            r#"{"Dir": "/src/app", "ImportPath": "example.com/app", "Export": "/cache/ab-d"}"#,
        )
        .unwrap();
        assert_eq!(listed.import_path, "example.com/app");
        assert_eq!(listed.export.as_deref(), Some("/cache/ab-d"));
    }

    #[test]
    fn test_missing_go_binary_is_a_toolchain_error() {
        let go = GoToolchain::new("/nonexistent/bin/go");
        assert!(matches!(
            go.build_id(Path::new("a.o")),
            Err(GarbleError::Toolchain(_))
        ));
    }
}
