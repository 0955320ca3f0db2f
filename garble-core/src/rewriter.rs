//! Rewrites the units of one package with hashed identifiers

use crate::classifier::{Classifier, Verdict};
use crate::coordinator::{package_dir, ExportManifest};
use crate::hashing::{hash_file_name, hash_with};
use crate::semantic::{DeclId, DeclKind, SemanticInfo, TypeChecker};
use crate::syntax::{descendants_of_kind, SourceUnit, CGO_PREFIX};
use crate::Result;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Comment prefixes the Go toolchain gives meaning to.
const DIRECTIVE_PREFIXES: &[&str] = &["//go:", "//line ", "//export "];

/// Short tag derived from the salt, used to keep the output of different builds apart.
pub fn salt_tag(salt: &str) -> String {
    hash_with("", salt).chars().skip(1).collect()
}

/// Directory below `code_out_dir` that holds the output of the build salted with `salt`.
pub fn output_root(code_out_dir: &Path, salt: &str) -> PathBuf {
    code_out_dir.join(format!("garble-{}", salt_tag(salt)))
}

/// Whether a comment must survive rewriting.
pub fn is_directive(comment: &str) -> bool {
    DIRECTIVE_PREFIXES.iter().any(|p| comment.starts_with(p))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    range: Range<usize>,
    replacement: String,
}

fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| e.range.start);
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.range.start < cursor {
            continue;
        }
        out.push_str(&source[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

fn comment_edits(unit: &SourceUnit) -> Vec<Edit> {
    descendants_of_kind(unit.root(), "comment")
        .into_iter()
        .filter_map(|comment| {
            let text = unit.text(comment);
            if is_directive(text) {
                return None;
            }
            // Line numbers and semicolon insertion must not change.
            let newlines = text.matches('\n').count();
            let replacement = match (text.starts_with("/*"), newlines) {
                (true, 0) => " ".to_string(),
                (true, n) => "\n".repeat(n),
                (false, _) => String::new(),
            };
            Some(Edit {
                range: comment.byte_range(),
                replacement,
            })
        })
        .collect()
}

/// Verdicts of one package, computed once per declaration.
struct Verdicts<'c, 'a> {
    classifier: &'c mut Classifier<'a>,
    cache: HashMap<DeclId, Verdict>,
}

impl Verdicts<'_, '_> {
    fn get(&mut self, info: &SemanticInfo, id: DeclId) -> Result<Verdict> {
        if let Some(verdict) = self.cache.get(&id) {
            return Ok(*verdict);
        }
        let verdict = self.classifier.classify(info, id)?;
        if let Verdict::Preserve(reason) = verdict {
            debug!("preserving {}: {}", info.declaration(id).name, reason);
        }
        self.cache.insert(id, verdict);
        Ok(verdict)
    }

    fn renamed(&self) -> usize {
        self.cache.values().filter(|v| v.is_rename()).count()
    }
}

/// Writes rewritten units below a salt-qualified output root.
#[derive(Debug, Clone)]
pub struct Rewriter {
    salt: String,
    output_root: PathBuf,
    action_id: Option<String>,
}

impl Rewriter {
    pub fn new(salt: impl Into<String>, code_out_dir: &Path) -> Self {
        let salt = salt.into();
        let output_root = output_root(code_out_dir, &salt);
        Self {
            salt,
            output_root,
            action_id: None,
        }
    }

    /// Keep the output of this compile apart from others of the same import path.
    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = Some(action_id.into());
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn package_dir(&self, package_path: &str) -> PathBuf {
        package_dir(&self.output_root, package_path, self.action_id.as_deref())
    }

    /// File name a unit is written under.
    pub fn output_name(&self, unit: &SourceUnit) -> String {
        let hashed = hash_file_name(&self.salt, &unit.name, unit);
        if unit.is_cgo_generated() {
            format!("{}{}.go", CGO_PREFIX, hashed)
        } else {
            format!("{}.go", hashed)
        }
    }

    /// Rewrite every unit of a package, write them out together with the package's
    /// export manifest, and return the written paths in input order.
    pub fn rewrite_package(
        &self,
        package_path: &str,
        units: &[SourceUnit],
        checker: &dyn TypeChecker,
        classifier: &mut Classifier<'_>,
    ) -> Result<Vec<PathBuf>> {
        let info = checker.check(package_path, units)?;
        let mut verdicts = Verdicts {
            classifier,
            cache: HashMap::new(),
        };

        let dir = self.package_dir(package_path);
        fs::create_dir_all(&dir)?;

        let mut written = Vec::with_capacity(units.len());
        for (index, unit) in units.iter().enumerate() {
            let text = if unit.is_cgo_generated() {
                unit.source().to_string()
            } else {
                self.rewrite(&info, index, unit, &mut verdicts)?
            };
            let path = dir.join(self.output_name(unit));
            fs::write(&path, text)?;
            debug!("{} -> {}", unit.path.display(), path.display());
            written.push(path);
        }

        let manifest = self.manifest(package_path, &info, &mut verdicts)?;
        manifest.write(&dir)?;

        info!(
            "rewrote {} units of {} ({} declarations renamed)",
            units.len(),
            package_path,
            verdicts.renamed()
        );
        Ok(written)
    }

    /// Text of one unit with comments stripped and approved identifiers hashed.
    pub fn rewrite_unit(
        &self,
        info: &SemanticInfo,
        index: usize,
        unit: &SourceUnit,
        classifier: &mut Classifier<'_>,
    ) -> Result<String> {
        let mut verdicts = Verdicts {
            classifier,
            cache: HashMap::new(),
        };
        self.rewrite(info, index, unit, &mut verdicts)
    }

    fn rewrite(
        &self,
        info: &SemanticInfo,
        index: usize,
        unit: &SourceUnit,
        verdicts: &mut Verdicts<'_, '_>,
    ) -> Result<String> {
        let mut edits = comment_edits(unit);
        for (start, id) in info.occurrences(index) {
            let name = &info.declaration(id).name;
            let range = start..start + name.len();
            if unit.source().get(range.clone()) != Some(name.as_str()) {
                continue;
            }
            if verdicts.get(info, id)?.is_rename() {
                edits.push(Edit {
                    range,
                    replacement: hash_with(&self.salt, name),
                });
            }
        }
        Ok(apply_edits(unit.source(), edits))
    }

    /// Public package-level names as importers will see them.
    fn manifest(
        &self,
        package_path: &str,
        info: &SemanticInfo,
        verdicts: &mut Verdicts<'_, '_>,
    ) -> Result<ExportManifest> {
        let mut names = BTreeSet::new();
        for (id, decl) in info.declarations_with_ids() {
            let package_level = matches!(
                decl.kind,
                DeclKind::Variable
                    | DeclKind::Constant
                    | DeclKind::TypeName
                    | DeclKind::Function {
                        receiver: false,
                        ..
                    }
            );
            if !package_level
                || !decl.top_level
                || !decl.exported()
                || decl.package.as_deref() != Some(package_path)
            {
                continue;
            }
            let name = if verdicts.get(info, id)?.is_rename() {
                hash_with(&self.salt, &decl.name)
            } else {
                decl.name.clone()
            };
            names.insert(name);
        }
        Ok(ExportManifest {
            import_path: package_path.to_string(),
            names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::semantic::SyntacticChecker;

    fn unit(name: &str, source: &str) -> SourceUnit {
        SourceUnit::parse(name, PathBuf::from(name), source.to_string()).unwrap()
    }

    #[test]
    fn test_comment_filter() {
        let u = unit(
            "a.go",
            "package a\n\n// doc\n//go:noinline\nfunc f() { /* x */ }\n\n/* multi\nline\ncomment */\nvar v = 1\n//export g\n",
        );
        let out = apply_edits(u.source(), comment_edits(&u));
        assert!(!out.contains("doc"));
        assert!(out.contains("//go:noinline"));
        assert!(out.contains("//export g"));
        assert!(out.contains("func f() {   }"));
        assert!(!out.contains("multi"));
        assert_eq!(out.lines().count(), u.source().lines().count());
        assert_eq!(out.lines().nth(9), Some("var v = 1"));
    }

    #[test]
    fn test_apply_edits_in_order() {
        let edits = vec![
            Edit {
                range: 6..9,
                replacement: "XYZ".into(),
            },
            Edit {
                range: 0..3,
                replacement: "a".into(),
            },
        ];
        assert_eq!(apply_edits("abc   def ghi", edits), "a   XYZ ghi");
    }

    #[test]
    fn test_output_names() {
        let dir = tempfile::tempdir().unwrap();
        let rewriter = Rewriter::new("abc123", dir.path());
        let greet = unit("greet.go", "package app\n");
        let cgo = unit("_cgo_gotypes.go", "package app\n");

        assert_eq!(
            rewriter.output_name(&greet),
            format!("{}.go", hash_with("abc123", "appgreet.go"))
        );
        assert!(rewriter.output_name(&cgo).starts_with(CGO_PREFIX));
        assert!(rewriter
            .output_root()
            .starts_with(dir.path()));
        assert_ne!(
            output_root(dir.path(), "abc123"),
            output_root(dir.path(), "other")
        );

        let main = rewriter.clone().with_action_id("a1").package_dir("main");
        let other_main = rewriter.with_action_id("b2").package_dir("main");
        assert_ne!(main, other_main);
    }

    #[test]
    fn test_rewrite_package() {
        let dir = tempfile::tempdir().unwrap();
        let rewriter = Rewriter::new("abc123", dir.path());
        let units = vec![
            unit(
                "greet.go",
                "package app\n\n// Greet says hello.\nfunc Greet(name string) string {\n\treturn helper(name)\n}\n",
            ),
            unit(
                "helper.go",
                "package app\n\nimport \"strings\"\n\nfunc helper(s string) string { return strings.ToUpper(s) }\n",
            ),
            unit("_cgo_gotypes.go", "package app\n\n// generated\nfunc _Cfunc_x() {}\n"),
        ];
        let settings = Settings::default();
        let mut classifier = Classifier::new(&settings);

        let written = rewriter
            .rewrite_package("example.com/app", &units, &SyntacticChecker, &mut classifier)
            .unwrap();
        assert_eq!(written.len(), 3);

        let greet = fs::read_to_string(&written[0]).unwrap();
        let hashed_greet = hash_with("abc123", "Greet");
        let hashed_helper = hash_with("abc123", "helper");
        assert!(greet.contains(&format!("func {}(", hashed_greet)));
        assert!(greet.contains(&format!("return {}(", hashed_helper)));
        assert!(!greet.contains("says hello"));

        let helper = fs::read_to_string(&written[1]).unwrap();
        assert!(helper.contains(&format!("func {}(", hashed_helper)));
        assert!(helper.contains("strings.ToUpper"));

        // generated glue is copied verbatim
        let cgo = fs::read_to_string(&written[2]).unwrap();
        assert_eq!(cgo, units[2].source());

        let manifest = ExportManifest::read(&rewriter.package_dir("example.com/app"))
            .unwrap()
            .unwrap();
        assert!(manifest.names.contains(&hashed_greet));
        assert!(!manifest.names.contains("Greet"));
    }
}
