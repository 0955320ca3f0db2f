//! Index of the original source tree by hashed file name

use crate::hashing::hash_file_name;
use crate::semantic::{DeclKind, SemanticInfo, TypeChecker};
use crate::syntax::{descendants_of_kind, SourceUnit};
use crate::toolchain::Toolchain;
use crate::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// A unit of the original tree together with the semantic info of its package.
#[derive(Debug, Clone)]
pub struct RegisteredUnit {
    pub unit: SourceUnit,
    pub package_path: String,
    index: usize,
    info: Arc<SemanticInfo>,
}

impl RegisteredUnit {
    /// Names of the functions and methods declared in this unit.
    pub fn function_names(&self) -> Vec<&str> {
        let root = self.unit.root();
        let mut names = Vec::new();
        for kind in ["function_declaration", "method_declaration"] {
            for decl in descendants_of_kind(root, kind) {
                let Some(name) = decl.child_by_field_name("name") else {
                    continue;
                };
                let is_function = self
                    .info
                    .object_of(self.index, name.start_byte())
                    .is_some_and(|d| matches!(d.kind, DeclKind::Function { .. }));
                if is_function {
                    names.push(self.unit.text(name));
                }
            }
        }
        names
    }
}

/// Hashed file name -> original unit.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    units: HashMap<String, RegisteredUnit>,
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name.starts_with('_') || name == "testdata" || name == "vendor"
}

impl SourceRegistry {
    /// Walk `root` once, check every package and index its units under the name the
    /// rewriter would have given them.
    pub fn build(root: &Path, salt: &str, checker: &dyn TypeChecker) -> Result<Self> {
        Self::build_with(root, salt, checker, None)
    }

    /// [`SourceRegistry::build`], asking `toolchain` for import paths when given.
    pub fn build_with(
        root: &Path,
        salt: &str,
        checker: &dyn TypeChecker,
        toolchain: Option<&dyn Toolchain>,
    ) -> Result<Self> {
        // (directory, package clause) -> units, so external test packages check apart
        let mut packages: BTreeMap<(PathBuf, String), Vec<SourceUnit>> = BTreeMap::new();
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
        {
            let entry = entry?;
            if !entry.file_type().is_file()
                || entry.path().extension().map_or(true, |ext| ext != "go")
            {
                continue;
            }
            let unit = SourceUnit::parse_file(entry.path())?;
            let dir = entry
                .path()
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default();
            let package = unit.package_name().unwrap_or_default().to_string();
            packages.entry((dir, package)).or_default().push(unit);
        }

        let mut registry = Self::default();
        for ((dir, _), units) in packages {
            let package_path = package_path(root, &dir, toolchain);
            registry.insert_package(&package_path, units, salt, checker)?;
        }
        info!(
            "indexed {} source units under {}",
            registry.len(),
            root.display()
        );
        Ok(registry)
    }

    /// Check one package and index its units.
    pub fn insert_package(
        &mut self,
        package_path: &str,
        units: Vec<SourceUnit>,
        salt: &str,
        checker: &dyn TypeChecker,
    ) -> Result<()> {
        let info = Arc::new(checker.check(package_path, &units)?);
        for (index, unit) in units.into_iter().enumerate() {
            let hashed = hash_file_name(salt, &unit.name, &unit);
            if let Some(existing) = self.units.get(&hashed) {
                warn!(
                    "{} and {} hash to the same name {}, keeping the first",
                    existing.unit.path.display(),
                    unit.path.display(),
                    hashed
                );
                continue;
            }
            self.units.insert(
                hashed,
                RegisteredUnit {
                    unit,
                    package_path: package_path.to_string(),
                    index,
                    info: Arc::clone(&info),
                },
            );
        }
        Ok(())
    }

    pub fn lookup(&self, hashed_name: &str) -> Option<&RegisteredUnit> {
        self.units.get(hashed_name)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

fn package_path(root: &Path, dir: &Path, toolchain: Option<&dyn Toolchain>) -> String {
    if let Some(toolchain) = toolchain {
        match toolchain.import_path(dir) {
            Ok(path) => return path,
            Err(e) => debug!("no import path for {}: {}", dir.display(), e),
        }
    }
    let relative = dir.strip_prefix(root).unwrap_or(dir);
    let path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if path.is_empty() {
        "main".to_string()
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::hash_file_name_in;
    use crate::semantic::SyntacticChecker;
    use std::fs;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_build_indexes_by_hashed_name() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "app/greet.go",
            "package app\n\nfunc Greet(name string) string { return name }\n\ntype T struct{}\n\nfunc (T) run() {}\n",
        );
        write(dir.path(), "app/util.go", "package app\n\nvar limit = 1\n");
        write(dir.path(), "lib/util.go", "package lib\n\nfunc Sum() {}\n");
        write(dir.path(), "app/testdata/broken.go", "package broken\nfunc {");
        write(dir.path(), ".git/hooks.go", "not go at all");

        let registry = SourceRegistry::build(dir.path(), "abc123", &SyntacticChecker).unwrap();
        assert_eq!(registry.len(), 3);

        let greet = registry
            .lookup(&hash_file_name_in("abc123", "app", "greet.go"))
            .unwrap();
        assert_eq!(greet.unit.name, "greet.go");
        assert_eq!(greet.package_path, "app");
        assert_eq!(greet.function_names(), vec!["Greet", "run"]);

        // same file name, different package
        assert!(registry
            .lookup(&hash_file_name_in("abc123", "lib", "util.go"))
            .is_some());
        assert!(registry
            .lookup(&hash_file_name_in("other", "app", "greet.go"))
            .is_none());
    }

    #[test]
    fn test_parse_errors_abort_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.go", "package bad\nfunc {");
        assert!(SourceRegistry::build(dir.path(), "s", &SyntacticChecker).is_err());
    }

    #[test]
    fn test_collision_keeps_first() {
        let mut registry = SourceRegistry::default();
        let unit = |path: &str| {
            SourceUnit::parse("a.go", PathBuf::from(path), "package p\n".to_string()).unwrap()
        };
        registry
            .insert_package("x/p", vec![unit("x/p/a.go")], "s", &SyntacticChecker)
            .unwrap();
        registry
            .insert_package("y/p", vec![unit("y/p/a.go")], "s", &SyntacticChecker)
            .unwrap();
        assert_eq!(registry.len(), 1);
        let kept = registry.lookup(&hash_file_name_in("s", "p", "a.go")).unwrap();
        assert_eq!(kept.unit.path, PathBuf::from("x/p/a.go"));
    }
}
