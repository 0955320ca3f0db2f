//! Cross-invocation knowledge about imported packages
//!
//! Every compile invocation of a build is a separate process. What one invocation
//! needs from the packages it imports is their artifact, their build identity and
//! which of their public names survived renaming. The last part travels through an
//! [`ExportManifest`] written next to each rewritten package, in a directory named
//! after the build action that produced it.

use crate::toolchain::Toolchain;
use crate::{GarbleError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the export manifest inside a package's output directory.
pub const MANIFEST_NAME: &str = "garble-exports.json";

/// Output directory of one compile of `import_path` below `root`. Compiles that share
/// an import path (main packages, test variants) differ in their action ID.
pub fn package_dir(root: &Path, import_path: &str, action_id: Option<&str>) -> PathBuf {
    let dir = root.join(import_path);
    match action_id.filter(|id| !id.is_empty()) {
        Some(id) => dir.join(format!("_{}", id)),
        None => dir,
    }
}

/// Public names of a package as other packages see them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageScope {
    /// The package went through the rewriter; these are its public names afterwards.
    Renamed(BTreeSet<String>),
    /// The package was compiled as written.
    Verbatim,
}

impl PackageScope {
    /// Whether `name` is still a public name of the package.
    pub fn exposes(&self, name: &str) -> bool {
        match self {
            PackageScope::Renamed(names) => names.contains(name),
            PackageScope::Verbatim => true,
        }
    }
}

/// Record of one package written by the rewriter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub import_path: String,
    pub names: BTreeSet<String>,
}

impl ExportManifest {
    /// Write the manifest into a package output directory.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(MANIFEST_NAME);
        fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }

    /// Read the manifest of a package output directory, `None` when it was never written.
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_NAME);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// One import of the package being compiled.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub artifact: PathBuf,
    pub build_id: String,
    scope: Option<PackageScope>,
}

impl ImportRecord {
    pub fn new(artifact: PathBuf, build_id: String) -> Self {
        Self {
            artifact,
            build_id,
            scope: None,
        }
    }

    /// The scope, once it has been imported.
    pub fn scope(&self) -> Option<&PackageScope> {
        self.scope.as_ref()
    }
}

/// Loads the public scope of an imported package.
pub trait ExportImporter {
    fn import(&self, import_path: &str, record: &ImportRecord) -> Result<PackageScope>;
}

/// Reads the manifests the rewriter leaves under one output root. The build ID of an
/// import names the action that compiled it, and with it the manifest's directory.
#[derive(Debug, Clone)]
pub struct ManifestImporter {
    root: PathBuf,
}

impl ManifestImporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ExportImporter for ManifestImporter {
    fn import(&self, import_path: &str, record: &ImportRecord) -> Result<PackageScope> {
        let dir = package_dir(&self.root, import_path, Some(&record.build_id));
        Ok(match ExportManifest::read(&dir)? {
            Some(manifest) => PackageScope::Renamed(manifest.names),
            None => PackageScope::Verbatim,
        })
    }
}

/// Import path -> [`ImportRecord`] for one compile invocation.
pub struct ImportTable {
    records: HashMap<String, ImportRecord>,
    importer: Box<dyn ExportImporter>,
    toolchain: Option<Box<dyn Toolchain>>,
}

impl ImportTable {
    pub fn new(importer: Box<dyn ExportImporter>) -> Self {
        Self {
            records: HashMap::new(),
            importer,
            toolchain: None,
        }
    }

    /// Read the compiler's import config and record every `packagefile` entry with its
    /// build identity.
    pub fn from_importcfg(
        path: &Path,
        toolchain: Box<dyn Toolchain>,
        importer: Box<dyn ExportImporter>,
    ) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut table = Self::new(importer);
        for (import_path, artifact) in parse_importcfg(&contents) {
            let build_id = toolchain.build_id(&artifact)?;
            table.record_import(import_path, artifact, build_id);
        }
        debug!("{} imports recorded from {}", table.len(), path.display());
        table.toolchain = Some(toolchain);
        Ok(table)
    }

    pub fn record_import(&mut self, path: impl Into<String>, artifact: PathBuf, build_id: String) {
        self.records
            .insert(path.into(), ImportRecord::new(artifact, build_id));
    }

    pub fn get(&self, path: &str) -> Option<&ImportRecord> {
        self.records.get(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Public scope of `path`, imported on first use and cached afterwards.
    pub fn resolve_package(&mut self, path: &str) -> Result<&PackageScope> {
        if !self.records.contains_key(path) {
            self.discover(path)?;
        }
        let record = self
            .records
            .get_mut(path)
            .ok_or_else(|| GarbleError::MissingImport(path.to_string()))?;
        if record.scope.is_none() {
            let scope = self.importer.import(path, record)?;
            record.scope = Some(scope);
        }
        record
            .scope
            .as_ref()
            .ok_or_else(|| GarbleError::MissingImport(path.to_string()))
    }

    /// Whether `path` no longer exposes `name` after its own renaming.
    pub fn was_renamed(&mut self, path: &str, name: &str) -> Result<bool> {
        Ok(!self.resolve_package(path)?.exposes(name))
    }

    /// Ask the toolchain about an import the import config did not list.
    fn discover(&mut self, path: &str) -> Result<()> {
        let Some(toolchain) = &self.toolchain else {
            return Err(GarbleError::MissingImport(path.to_string()));
        };
        let artifact = toolchain.export_data(path)?;
        let build_id = toolchain.build_id(&artifact)?;
        debug!("discovered import {} at {}", path, artifact.display());
        self.record_import(path, artifact, build_id);
        Ok(())
    }
}

/// `packagefile <path>=<artifact>` entries of an import config.
pub fn parse_importcfg(contents: &str) -> Vec<(String, PathBuf)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.strip_prefix("packagefile "))
        .filter_map(|entry| entry.split_once('='))
        .map(|(path, artifact)| (path.trim().to_string(), PathBuf::from(artifact.trim())))
        .collect()
}
